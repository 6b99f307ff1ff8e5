//! Unit tests for palisade-sync

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use palisade_config::{CodecKind, SyncSettings};
use palisade_rbac::{
    AccessError, AccessModel, ActionOutcome, PartitionKind, PrincipalRef, PrivilegeAction,
    PrivilegePath, RolePrivilegesPartition, UserInfoPartition, UserPrivilegesPartition,
};

use crate::{
    CoordinationStore, MemoryConnection, MemoryStore, PartitionCodec, SyncError, Synchronizer,
    Version,
};

// ============================================================================
// Helpers
// ============================================================================

fn settings() -> SyncSettings {
    SyncSettings {
        root_path: "/test/access".to_string(),
        ..SyncSettings::default()
    }
}

fn p(s: &str) -> PrivilegePath {
    s.parse().unwrap()
}

fn start(store: &MemoryStore, model: AccessModel) -> Synchronizer {
    Synchronizer::start(Arc::new(model), Arc::new(store.connect()), settings()).unwrap()
}

/// Polls `condition` until it holds or a generous deadline passes.
fn eventually(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

fn stored<S: palisade_rbac::PartitionState>(store: &MemoryStore) -> S {
    let path = settings().partition_path(S::KIND.as_str());
    PartitionCodec::default()
        .decode(&store.data(&path).unwrap())
        .unwrap()
}

fn grant_select(user: &str, path: &str) -> PrivilegeAction {
    PrivilegeAction::grant(PrincipalRef::user(user), "select", p(path))
}

// ============================================================================
// Bootstrap Tests
// ============================================================================

#[test]
fn bootstrap_seeds_store_from_local_model() {
    let store = MemoryStore::new();
    let model = AccessModel::new();
    model
        .do_action(&PrivilegeAction::create_role("auditor"))
        .unwrap();

    let sync = start(&store, model);

    let roles: RolePrivilegesPartition = stored(&store);
    assert!(roles.contains("auditor"));
    for kind in PartitionKind::ALL {
        assert_eq!(sync.known_version(kind).unwrap(), Version::INITIAL);
    }
}

#[test]
fn later_instance_adopts_existing_state() {
    let store = MemoryStore::new();
    let seeded = AccessModel::new();
    seeded
        .do_action(&PrivilegeAction::create_user("alice", "pw"))
        .unwrap();
    let _a = start(&store, seeded);

    let b = start(&store, AccessModel::new());

    assert_eq!(b.model().user_names().unwrap(), vec!["alice".to_string()]);
    assert_eq!(
        b.model().user_information("alice").unwrap().unwrap().password,
        "pw"
    );
}

// ============================================================================
// Commit and Watch Tests
// ============================================================================

#[test]
fn committed_actions_reach_other_instances() {
    let store = MemoryStore::new();
    let a = start(&store, AccessModel::new());
    let b = start(&store, AccessModel::new());

    a.execute(&PrivilegeAction::create_user("u", "pw")).unwrap();
    a.execute(&grant_select("u", "db.t")).unwrap();

    eventually(|| b.model().check("u", "select", &p("db.t")).unwrap_or(false));
    assert_eq!(
        b.known_version(PartitionKind::UserPrivileges).unwrap(),
        a.known_version(PartitionKind::UserPrivileges).unwrap()
    );
}

#[test]
fn checks_are_answered_locally() {
    let store = MemoryStore::new();
    let a = start(&store, AccessModel::new());
    a.execute(&PrivilegeAction::create_user("u", "pw")).unwrap();
    let before = store.version("/test/access/user-privileges");

    let outcome = a
        .execute(&PrivilegeAction::check("u", "select", p("db")))
        .unwrap();

    assert_eq!(outcome, ActionOutcome::Checked(false));
    assert_eq!(store.version("/test/access/user-privileges"), before);
}

#[test]
fn own_writes_are_not_reapplied() {
    let store = MemoryStore::new();
    let a = start(&store, AccessModel::new());

    a.execute(&PrivilegeAction::create_user("u", "pw")).unwrap();
    let known = a.known_version(PartitionKind::UserPrivileges).unwrap();

    assert_eq!(known, Version::new(2));
    assert_eq!(store.version("/test/access/user-privileges"), Some(known));
}

#[test]
fn concurrent_grants_converge_through_replay() {
    let store = MemoryStore::new();
    let a = start(&store, AccessModel::new());
    let b = Arc::new(start(&store, AccessModel::new()));

    a.execute(&PrivilegeAction::create_user("u", "pw")).unwrap();
    eventually(|| b.model().user_names().unwrap_or_default().len() == 1);
    let base = a.known_version(PartitionKind::UserPrivileges).unwrap();
    assert_eq!(b.known_version(PartitionKind::UserPrivileges).unwrap(), base);

    // B's grant lands between A staging its grant and A's write.
    let fired = Arc::new(AtomicBool::new(false));
    let hook_fired = Arc::clone(&fired);
    let racer = Arc::clone(&b);
    store.before_write(move |_| {
        if !hook_fired.swap(true, Ordering::SeqCst) {
            racer.execute(&grant_select("u", "db.t")).unwrap();
        }
    });

    a.execute(&grant_select("u", "db.t")).unwrap();
    store.clear_before_write();

    assert!(fired.load(Ordering::SeqCst));
    // B's first write, then A's replayed write.
    assert_eq!(
        store.version("/test/access/user-privileges"),
        Some(base.next().next())
    );

    let users: UserPrivilegesPartition = stored(&store);
    let grants = users
        .get("u")
        .unwrap()
        .model()
        .tree(palisade_rbac::ActionType::Select)
        .paths();
    assert_eq!(grants, vec![p("db.t.*")]);

    assert!(a.model().check("u", "select", &p("db.t.c")).unwrap());
    eventually(|| b.known_version(PartitionKind::UserPrivileges).ok() == Some(base.next().next()));
    assert!(b.model().check("u", "select", &p("db.t.c")).unwrap());
}

#[test]
fn replayed_membership_grant_sees_role_removed_meanwhile() {
    let store = MemoryStore::new();
    let a = start(&store, AccessModel::new());
    let b = Arc::new(start(&store, AccessModel::new()));

    a.execute(&PrivilegeAction::create_role("r")).unwrap();
    a.execute(&PrivilegeAction::create_user("u", "pw")).unwrap();
    eventually(|| b.model().role_names().unwrap_or_default().len() == 1);
    eventually(|| b.model().user_names().unwrap_or_default().len() == 1);

    // B drops the role while A's membership grant is on its way out.
    let fired = Arc::new(AtomicBool::new(false));
    let hook_fired = Arc::clone(&fired);
    let racer = Arc::clone(&b);
    store.before_write(move |_| {
        if !hook_fired.swap(true, Ordering::SeqCst) {
            racer.execute(&PrivilegeAction::remove_role("r")).unwrap();
        }
    });

    let result = a.execute(&PrivilegeAction::grant_role("u", "r"));
    store.clear_before_write();

    assert!(fired.load(Ordering::SeqCst));
    assert!(matches!(
        result,
        Err(SyncError::Access(AccessError::NoSuchPrincipal(PrincipalRef::Role(ref role))))
            if role == "r"
    ));

    let users: UserPrivilegesPartition = stored(&store);
    assert_eq!(users.get("u").unwrap().roles().count(), 0);
    let roles: RolePrivilegesPartition = stored(&store);
    assert!(!roles.contains("r"));

    eventually(|| a.model().role_names().map(|r| r.is_empty()).unwrap_or(false));
    assert_eq!(a.model().check("u", "select", &p("db")), Ok(false));
}

#[test]
fn replayed_grant_sees_user_disabled_meanwhile() {
    let store = MemoryStore::new();
    let a = start(&store, AccessModel::new());
    let b = Arc::new(start(&store, AccessModel::new()));

    a.execute(&PrivilegeAction::create_user("u", "pw")).unwrap();
    eventually(|| b.model().user_names().unwrap_or_default().len() == 1);

    // B moves user privileges past A's version, then disables the user.
    let fired = Arc::new(AtomicBool::new(false));
    let hook_fired = Arc::clone(&fired);
    let racer = Arc::clone(&b);
    store.before_write(move |_| {
        if !hook_fired.swap(true, Ordering::SeqCst) {
            racer.execute(&grant_select("u", "other")).unwrap();
            racer.execute(&PrivilegeAction::disable_user("u")).unwrap();
        }
    });

    let result = a.execute(&grant_select("u", "db.t"));
    store.clear_before_write();

    assert!(fired.load(Ordering::SeqCst));
    assert!(matches!(
        result,
        Err(SyncError::Access(AccessError::PrincipalDisabled(ref user))) if user == "u"
    ));
    let users: UserPrivilegesPartition = stored(&store);
    let grants = users
        .get("u")
        .unwrap()
        .model()
        .tree(palisade_rbac::ActionType::Select)
        .paths();
    assert_eq!(grants, vec![p("other")]);
}

#[test]
fn racing_creates_with_different_credentials_do_not_both_succeed() {
    let store = MemoryStore::new();
    let a = start(&store, AccessModel::new());
    let b = Arc::new(start(&store, AccessModel::new()));

    let fired = Arc::new(AtomicBool::new(false));
    let hook_fired = Arc::clone(&fired);
    let racer = Arc::clone(&b);
    store.before_write(move |_| {
        if !hook_fired.swap(true, Ordering::SeqCst) {
            racer
                .execute(&PrivilegeAction::create_user("u", "from-b"))
                .unwrap();
        }
    });

    let result = a.execute(&PrivilegeAction::create_user("u", "from-a"));
    store.clear_before_write();

    assert!(fired.load(Ordering::SeqCst));
    assert!(matches!(
        result,
        Err(SyncError::Access(AccessError::AlreadyExists(PrincipalRef::User(ref user))))
            if user == "u"
    ));

    let info: UserInfoPartition = stored(&store);
    assert_eq!(info.get("u").unwrap().password, "from-b");
    assert_eq!(
        a.model().user_information("u").unwrap().map(|i| i.password),
        Some("from-b".to_string())
    );
}

#[test]
fn exhausted_retries_fail_the_statement() {
    let store = MemoryStore::new();
    let settings = SyncSettings {
        max_retries: 2,
        ..settings()
    };
    let a = Synchronizer::start(
        Arc::new(AccessModel::new()),
        Arc::new(store.connect()),
        settings,
    )
    .unwrap();
    a.execute(&PrivilegeAction::create_user("u", "pw")).unwrap();

    // Every write is preceded by an unrelated bump of the same path.
    let rival = store.connect();
    let in_hook = Arc::new(AtomicBool::new(false));
    let bumps = Arc::new(AtomicU32::new(0));
    let hook_bumps = Arc::clone(&bumps);
    store.before_write(move |path| {
        if in_hook.swap(true, Ordering::SeqCst) {
            return;
        }
        let (data, version) = rival.read(path).unwrap();
        rival.write(path, data, version).unwrap();
        hook_bumps.fetch_add(1, Ordering::SeqCst);
        in_hook.store(false, Ordering::SeqCst);
    });

    let result = a.execute(&grant_select("u", "db.t"));
    store.clear_before_write();

    assert!(matches!(
        result,
        Err(SyncError::SyncConflictExhausted {
            partition: PartitionKind::UserPrivileges,
            attempts: 3,
        })
    ));
    assert_eq!(bumps.load(Ordering::SeqCst), 3);

    let users: UserPrivilegesPartition = stored(&store);
    assert!(users.get("u").unwrap().model().is_empty());

    // The last rival bump wins locally once its watch event arrives; the
    // statement can then be retried from scratch.
    eventually(|| !a.model().check("u", "select", &p("db.t")).unwrap_or(true));
    a.execute(&grant_select("u", "db.t")).unwrap();
    assert!(a.model().check("u", "select", &p("db.t")).unwrap());
}

#[test]
fn unavailable_store_is_not_retried() {
    let store = MemoryStore::new();
    let a = start(&store, AccessModel::new());

    let writes = Arc::new(AtomicU32::new(0));
    let hook_writes = Arc::clone(&writes);
    store.before_write(move |_| {
        hook_writes.fetch_add(1, Ordering::SeqCst);
    });
    store.set_available(false);

    let result = a.execute(&PrivilegeAction::create_user("u", "pw"));
    assert!(matches!(result, Err(SyncError::StoreUnavailable(_))));
    assert_eq!(writes.load(Ordering::SeqCst), 0);
    assert!(a.model().user_names().unwrap().is_empty());

    store.set_available(true);
    store.clear_before_write();
    a.execute(&PrivilegeAction::create_user("u", "pw")).unwrap();
    assert_eq!(a.model().user_names().unwrap(), vec!["u".to_string()]);
}

#[test]
fn invalid_actions_never_reach_the_store() {
    let store = MemoryStore::new();
    let a = start(&store, AccessModel::new());
    let before = store.version("/test/access/user-privileges");

    assert!(matches!(
        a.execute(&grant_select("ghost", "db")),
        Err(SyncError::Access(AccessError::NoSuchPrincipal(_)))
    ));
    assert!(matches!(
        a.execute(&PrivilegeAction::grant_role("ghost", "nobody")),
        Err(SyncError::Access(AccessError::NoSuchPrincipal(_)))
    ));

    assert_eq!(store.version("/test/access/user-privileges"), before);
}

#[test]
fn multi_partition_actions_are_dry_run_first() {
    let store = MemoryStore::new();
    let a = start(&store, AccessModel::new());
    a.execute(&PrivilegeAction::create_user("u", "pw")).unwrap();

    // Remove a user that exists in the credential partition only: the
    // user-privileges dry run fails before credentials are touched.
    let info_path = "/test/access/user-info";
    let info_before = store.version(info_path);
    a.model()
        .install(UserPrivilegesPartition::default())
        .unwrap();

    assert!(matches!(
        a.execute(&PrivilegeAction::remove_user("u")),
        Err(SyncError::Access(AccessError::NoSuchPrincipal(_)))
    ));
    assert_eq!(store.version(info_path), info_before);
    assert!(a.model().user_information("u").unwrap().is_some());
}

#[test]
fn role_removal_and_disable_propagate() {
    let store = MemoryStore::new();
    let a = start(&store, AccessModel::new());
    let b = start(&store, AccessModel::new());

    a.execute(&PrivilegeAction::create_role("r")).unwrap();
    a.execute(&PrivilegeAction::create_user("u", "pw")).unwrap();
    a.execute(&PrivilegeAction::grant_role("u", "r")).unwrap();
    eventually(|| b.model().roles_of("u").map(|r| r.len() == 1).unwrap_or(false));
    eventually(|| b.model().role_names().map(|r| r.len() == 1).unwrap_or(false));

    b.execute(&PrivilegeAction::remove_role("r")).unwrap();
    eventually(|| a.model().role_names().map(|r| r.is_empty()).unwrap_or(false));
    eventually(|| a.model().roles_of("u").map(|r| r.is_empty()).unwrap_or(false));

    b.execute(&PrivilegeAction::disable_user("u")).unwrap();
    eventually(|| a.model().is_disabled("u").unwrap_or(false));
    assert_eq!(
        a.model().check("u", "select", &p("db")),
        Err(AccessError::PrincipalDisabled("u".to_string()))
    );
}

#[test]
fn json_codec_stores_readable_payloads() {
    let store = MemoryStore::new();
    let settings = SyncSettings {
        codec: CodecKind::Json,
        ..settings()
    };
    let a = Synchronizer::start(
        Arc::new(AccessModel::new()),
        Arc::new(store.connect()),
        settings,
    )
    .unwrap();
    a.execute(&PrivilegeAction::create_user("u", "pw")).unwrap();
    a.execute(&PrivilegeAction::disable_user("u")).unwrap();

    let data = store.data("/test/access/disabled-users").unwrap();
    let value: serde_json::Value = serde_json::from_slice(&data).unwrap();
    assert_eq!(value, serde_json::json!(["u"]));
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[test]
fn close_is_idempotent_and_closes_the_connection() {
    let store = MemoryStore::new();
    let connection: Arc<MemoryConnection> = Arc::new(store.connect());
    let a = Synchronizer::start(
        Arc::new(AccessModel::new()),
        Arc::clone(&connection) as Arc<dyn CoordinationStore>,
        settings(),
    )
    .unwrap();

    a.close();
    a.close();

    assert!(a.is_closed());
    assert!(connection.is_closed());
    assert!(matches!(
        a.execute(&PrivilegeAction::create_role("r")),
        Err(SyncError::Closed)
    ));
}

#[test]
fn failed_start_is_reported() {
    let store = MemoryStore::new();
    store.set_available(false);

    let result = Synchronizer::start(
        Arc::new(AccessModel::new()),
        Arc::new(store.connect()),
        settings(),
    );
    assert!(matches!(result, Err(SyncError::StoreUnavailable(_))));
}
