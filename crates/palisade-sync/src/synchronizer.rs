//! Keeps an [`AccessModel`] consistent with a shared coordination store.
//!
//! Each partition is synchronized on its own:
//!
//! ```text
//!  execute(action)
//!     │ validate + dry run every touched partition
//!     ▼
//!  commit(partition) ── lock version ─┐
//!     │                               │
//!     ├─ encode staged state          │
//!     ├─ write(path, bytes, known) ───┼── ok ──────► install, known = new
//!     │                               │
//!     └─ VersionConflict ─────────────┼── read, install remote,
//!                                     │   revalidate, replay, retry
//!  watch thread ── event(v > known) ──┴─► install, known = v
//! ```
//!
//! The per-partition version lock is held across encode, write and install,
//! so two commits never race on the same version and a watch refresh never
//! interleaves with a commit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use palisade_config::SyncSettings;
use palisade_rbac::{
    AccessError, AccessModel, ActionOutcome, DisabledUsersPartition, PartitionKind,
    PartitionState, PrivilegeAction, RolePrivilegesPartition, UserInfoPartition,
    UserPrivilegesPartition,
};
use tracing::{debug, info, trace, warn};

use crate::codec::PartitionCodec;
use crate::error::{Result, SyncError};
use crate::store::{CoordinationStore, StoreError, Version, WatchNext, WatchSubscription};

/// Last store version seen per partition.
#[derive(Debug, Default)]
struct KnownVersions {
    user_info: Mutex<Version>,
    disabled_users: Mutex<Version>,
    user_privileges: Mutex<Version>,
    role_privileges: Mutex<Version>,
}

impl KnownVersions {
    fn slot(&self, kind: PartitionKind) -> &Mutex<Version> {
        match kind {
            PartitionKind::UserInfo => &self.user_info,
            PartitionKind::DisabledUsers => &self.disabled_users,
            PartitionKind::UserPrivileges => &self.user_privileges,
            PartitionKind::RolePrivileges => &self.role_privileges,
        }
    }

    fn lock(&self, kind: PartitionKind) -> Result<MutexGuard<'_, Version>> {
        self.slot(kind)
            .lock()
            .map_err(|_| AccessError::LockPoisoned(kind.as_str()).into())
    }
}

/// State shared with the watch threads.
#[derive(Debug)]
struct Shared {
    model: Arc<AccessModel>,
    store: Arc<dyn CoordinationStore>,
    codec: PartitionCodec,
    settings: SyncSettings,
    known: KnownVersions,
}

impl Shared {
    fn path(&self, kind: PartitionKind) -> String {
        self.settings.partition_path(kind.as_str())
    }

    /// Creates the partition path if needed, then adopts whatever the store
    /// holds. Another instance may have created it first.
    fn bootstrap<S: PartitionState>(&self) -> Result<()> {
        let path = self.path(S::KIND);
        let mut known = self.known.lock(S::KIND)?;

        let seed = self.codec.encode(&self.model.snapshot::<S>()?)?;
        let created = self.store.create(&path, seed)?;
        let (data, version) = self.store.read(&path)?;
        self.model.install(self.codec.decode::<S>(&data)?)?;
        *known = version;

        debug!(partition = %S::KIND, %path, %version, created, "bootstrapped partition");
        Ok(())
    }

    /// Adopts a remote state if it is newer than the last one seen.
    fn refresh<S: PartitionState>(&self, data: &Bytes, version: Version) -> Result<()> {
        let mut known = self.known.lock(S::KIND)?;
        if version <= *known {
            debug!(partition = %S::KIND, %version, known = %*known, "ignoring stale watch event");
            return Ok(());
        }

        self.model.install(self.codec.decode::<S>(data)?)?;
        *known = version;
        debug!(partition = %S::KIND, %version, "refreshed partition from store");
        Ok(())
    }

    /// Commits `action` to partition `S` with compare-and-swap and replay.
    ///
    /// The first attempt applies the action strictly to the local state. On
    /// each version conflict the local partition is overwritten with the
    /// store's current state, the action is checked again against the
    /// store's other partitions, and it is replayed leniently on top.
    /// After `max_retries` replays the last replayed state is installed
    /// locally and [`SyncError::SyncConflictExhausted`] is returned.
    fn commit<S: PartitionState>(&self, action: &PrivilegeAction) -> Result<()> {
        let path = self.path(S::KIND);
        let mut known = self.known.lock(S::KIND)?;

        let mut staged = self.model.stage::<S>(action, false)?;
        let mut retries = 0u32;
        loop {
            let data = self.codec.encode(&staged)?;
            trace!(partition = %S::KIND, expected = %*known, retries, "attempting conditional write");

            match self.store.write(&path, data, *known) {
                Ok(version) => {
                    self.model.install(staged)?;
                    *known = version;
                    info!(
                        partition = %S::KIND,
                        %version,
                        retries,
                        %action,
                        "committed action"
                    );
                    return Ok(());
                }
                Err(StoreError::VersionConflict { current, .. }) => {
                    warn!(
                        partition = %S::KIND,
                        expected = %*known,
                        %current,
                        retries,
                        "version conflict, replaying on refreshed state"
                    );
                    if retries >= self.settings.max_retries {
                        self.model.install(staged)?;
                        warn!(partition = %S::KIND, %action, attempts = retries + 1, "conflict retries exhausted");
                        return Err(SyncError::SyncConflictExhausted {
                            partition: S::KIND,
                            attempts: retries + 1,
                        });
                    }
                    retries += 1;

                    let (remote, version) = self.store.read(&path)?;
                    self.model.install(self.codec.decode::<S>(&remote)?)?;
                    *known = version;
                    self.revalidate(action)?;
                    staged = self.model.stage::<S>(action, true)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Decodes partition `S` as the store holds it now, without installing
    /// it. Takes no version lock, so it is safe while another partition's
    /// commit is in progress.
    fn fetch<S: PartitionState>(&self) -> Result<S> {
        let (data, _) = self.store.read(&self.path(S::KIND))?;
        self.codec.decode::<S>(&data)
    }

    /// Re-runs the cross-partition checks of `action` against the store's
    /// current state. A replay must not commit a membership in a role, or a
    /// grant to a user, that another instance removed or disabled meanwhile;
    /// the local copies of those partitions may still lag behind.
    fn revalidate(&self, action: &PrivilegeAction) -> Result<()> {
        let disabled = self.fetch::<DisabledUsersPartition>()?;
        let users = self.fetch::<UserPrivilegesPartition>()?;
        let roles = self.fetch::<RolePrivilegesPartition>()?;
        AccessModel::validate_against(action, &disabled, &users, &roles).inspect_err(|e| {
            warn!(%action, error = %e, "replay rejected by refreshed state");
        })?;
        Ok(())
    }

    fn commit_kind(&self, kind: PartitionKind, action: &PrivilegeAction) -> Result<()> {
        match kind {
            PartitionKind::UserInfo => self.commit::<UserInfoPartition>(action),
            PartitionKind::DisabledUsers => self.commit::<DisabledUsersPartition>(action),
            PartitionKind::UserPrivileges => self.commit::<UserPrivilegesPartition>(action),
            PartitionKind::RolePrivileges => self.commit::<RolePrivilegesPartition>(action),
        }
    }

    fn dry_run(&self, kind: PartitionKind, action: &PrivilegeAction) -> Result<()> {
        let staged = match kind {
            PartitionKind::UserInfo => self.model.stage::<UserInfoPartition>(action, false).map(drop),
            PartitionKind::DisabledUsers => self
                .model
                .stage::<DisabledUsersPartition>(action, false)
                .map(drop),
            PartitionKind::UserPrivileges => self
                .model
                .stage::<UserPrivilegesPartition>(action, false)
                .map(drop),
            PartitionKind::RolePrivileges => self
                .model
                .stage::<RolePrivilegesPartition>(action, false)
                .map(drop),
        };
        staged.map_err(SyncError::from)
    }

    fn watch_loop<S: PartitionState>(&self, mut subscription: WatchSubscription) {
        let path = self.path(S::KIND);
        loop {
            let outcome = match subscription.recv() {
                WatchNext::Event(event) if event.path == path => {
                    self.refresh::<S>(&event.data, event.version)
                }
                WatchNext::Event(_) => Ok(()),
                WatchNext::Lagged(skipped) => {
                    warn!(partition = %S::KIND, skipped, "watch lagged, re-reading partition");
                    self.store
                        .read(&path)
                        .map_err(SyncError::from)
                        .and_then(|(data, version)| self.refresh::<S>(&data, version))
                }
                WatchNext::Closed => break,
            };

            if let Err(e) = outcome {
                warn!(partition = %S::KIND, error = %e, "failed to apply watch event");
            }
        }
        debug!(partition = %S::KIND, "watch ended");
    }
}

/// Synchronizes one instance's [`AccessModel`] with the coordination store.
///
/// Dropping the synchronizer closes it.
#[derive(Debug)]
pub struct Synchronizer {
    shared: Arc<Shared>,
    watchers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Synchronizer {
    /// Bootstraps every partition and starts watching the store.
    ///
    /// Watches are subscribed before each partition is read so no change
    /// between the read and the subscription is missed.
    pub fn start(
        model: Arc<AccessModel>,
        store: Arc<dyn CoordinationStore>,
        settings: SyncSettings,
    ) -> Result<Self> {
        let codec = PartitionCodec::new(settings.codec);
        let synchronizer = Self {
            shared: Arc::new(Shared {
                model,
                store,
                codec,
                settings,
                known: KnownVersions::default(),
            }),
            watchers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        };

        // On error `synchronizer` is dropped, which closes whatever started.
        synchronizer.start_partition::<UserInfoPartition>()?;
        synchronizer.start_partition::<DisabledUsersPartition>()?;
        synchronizer.start_partition::<UserPrivilegesPartition>()?;
        synchronizer.start_partition::<RolePrivilegesPartition>()?;

        info!(
            root = %synchronizer.shared.settings.root_path,
            codec = ?synchronizer.shared.settings.codec,
            "synchronizer started"
        );
        Ok(synchronizer)
    }

    fn start_partition<S: PartitionState>(&self) -> Result<()> {
        let subscription = self.shared.store.watch(&self.shared.path(S::KIND))?;
        self.shared.bootstrap::<S>()?;

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(format!("palisade-watch-{}", S::KIND))
            .spawn(move || shared.watch_loop::<S>(subscription))
            .map_err(|source| SyncError::WatcherSpawn {
                partition: S::KIND,
                source,
            })?;

        self.watchers
            .lock()
            .map_err(|_| AccessError::LockPoisoned("watchers"))?
            .push(handle);
        Ok(())
    }

    pub fn model(&self) -> &Arc<AccessModel> {
        &self.shared.model
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.shared.settings
    }

    /// Last store version this instance has seen for `kind`.
    pub fn known_version(&self, kind: PartitionKind) -> Result<Version> {
        Ok(*self.shared.known.lock(kind)?)
    }

    /// Runs `action` against the model and, if it mutates, commits every
    /// partition it touches to the store.
    ///
    /// Checks are answered locally. A mutating action is validated and
    /// dry-run against all its partitions before the first write; the
    /// partitions are then committed one after another. A failure part way
    /// leaves earlier partitions committed.
    pub fn execute(&self, action: &PrivilegeAction) -> Result<ActionOutcome> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        if !action.verb().is_mutating() {
            return Ok(self.shared.model.do_action(action)?);
        }

        self.shared.model.validate(action)?;
        let partitions = action.partitions();
        for kind in partitions {
            self.shared.dry_run(*kind, action)?;
        }
        for kind in partitions {
            self.shared.commit_kind(*kind, action)?;
        }
        Ok(ActionOutcome::Applied)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Closes the store connection and waits for the watch threads to end.
    /// Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shared.store.close();
        let handles = match self.watchers.lock() {
            Ok(mut watchers) => std::mem::take(&mut *watchers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            if handle.join().is_err() {
                warn!("watch thread panicked");
            }
        }
        info!("synchronizer closed");
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        self.close();
    }
}
