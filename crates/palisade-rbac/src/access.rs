//! The access model: four partitions behind per-partition locks.
//!
//! Reads take shared locks and never block each other. A mutating action is
//! validated against the whole model, dry-run on copies of every partition
//! it touches, and only then installed, so a failing action leaves no trace.

use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use palisade_config::PalisadeConfig;
use tracing::{debug, info, warn};

use crate::action::{ActionScope, PrincipalRef, PrivilegeAction, Verb};
use crate::error::{AccessError, Result};
use crate::model::{ActionType, PrivilegeModel};
use crate::partition::{
    DisabledUsersPartition, PartitionKind, PartitionState, RolePrivilegesPartition,
    UserInfoPartition, UserPrivilegesPartition,
};
use crate::path::PrivilegePath;
use crate::principal::UserInformation;

/// Result of a successful [`AccessModel::do_action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// A check ran; the flag says whether it was granted.
    Checked(bool),
    /// A mutating action was applied.
    Applied,
}

impl ActionOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, ActionOutcome::Checked(true))
    }
}

/// In-memory access-control state of one instance.
#[derive(Debug, Default)]
pub struct AccessModel {
    pub(crate) user_info: RwLock<UserInfoPartition>,
    pub(crate) disabled_users: RwLock<DisabledUsersPartition>,
    pub(crate) user_privileges: RwLock<UserPrivilegesPartition>,
    pub(crate) role_privileges: RwLock<RolePrivilegesPartition>,
    local_writes: Mutex<()>,
}

impl AccessModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a model seeded with the roles and users of `config`.
    ///
    /// Roles are created first so users can reference them. A user naming a
    /// role that is not defined fails with [`AccessError::NoSuchPrincipal`].
    pub fn from_config(config: &PalisadeConfig) -> Result<Self> {
        let model = Self::new();

        for (name, role) in &config.roles {
            model.do_action(&PrivilegeAction::create_role(name))?;
            for (action_type, path) in role.grants().entries() {
                model.do_action(&PrivilegeAction::grant(
                    PrincipalRef::role(name.as_str()),
                    action_type,
                    path.parse()?,
                ))?;
            }
        }

        for (name, user) in &config.users {
            model.do_action(&PrivilegeAction::create_user(name, &user.password))?;
            for role in &user.roles {
                model.do_action(&PrivilegeAction::grant_role(name, role))?;
            }
            for (action_type, path) in user.grants().entries() {
                model.do_action(&PrivilegeAction::grant(
                    PrincipalRef::user(name.as_str()),
                    action_type,
                    path.parse()?,
                ))?;
            }
        }

        info!(
            roles = config.roles.len(),
            users = config.users.len(),
            "seeded access model from configuration"
        );
        Ok(model)
    }

    /// Evaluates `action` against this model.
    ///
    /// Checks return [`ActionOutcome::Checked`]. Mutating actions are applied
    /// to every partition they touch or to none of them.
    pub fn do_action(&self, action: &PrivilegeAction) -> Result<ActionOutcome> {
        if let ActionScope::Privilege { action_type, path } = action.scope() {
            if action.verb() == Verb::Check {
                return self
                    .check(action.target().name(), action_type, path)
                    .map(ActionOutcome::Checked);
            }
        }

        let _guard = self
            .local_writes
            .lock()
            .map_err(|_| AccessError::LockPoisoned("local writes"))?;

        self.validate(action)?;

        let kinds = action.partitions();
        let user_info = self.stage_if::<UserInfoPartition>(action, kinds)?;
        let disabled = self.stage_if::<DisabledUsersPartition>(action, kinds)?;
        let users = self.stage_if::<UserPrivilegesPartition>(action, kinds)?;
        let roles = self.stage_if::<RolePrivilegesPartition>(action, kinds)?;

        if let Some(state) = user_info {
            self.install(state)?;
        }
        if let Some(state) = disabled {
            self.install(state)?;
        }
        if let Some(state) = users {
            self.install(state)?;
        }
        if let Some(state) = roles {
            self.install(state)?;
        }

        debug!(%action, "applied action");
        Ok(ActionOutcome::Applied)
    }

    fn stage_if<S: PartitionState>(
        &self,
        action: &PrivilegeAction,
        kinds: &[PartitionKind],
    ) -> Result<Option<S>> {
        if kinds.contains(&S::KIND) {
            self.stage::<S>(action, false).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Returns whether `user` holds `action_type` on `path`, directly or
    /// through any of its roles.
    pub fn check(&self, user: &str, action_type: &str, path: &PrivilegePath) -> Result<bool> {
        let user = user.trim();
        if read(&self.disabled_users)?.contains(user) {
            warn!(user, action_type, %path, "denied check for disabled user");
            return Err(AccessError::PrincipalDisabled(user.to_string()));
        }

        let users = read(&self.user_privileges)?;
        let principal = users
            .get(user)
            .ok_or_else(|| AccessError::NoSuchPrincipal(PrincipalRef::user(user)))?;

        let roles = read(&self.role_privileges)?;
        principal.check_privilege(action_type, path, |name| roles.get(name))
    }

    /// Checks the cross-partition preconditions of a mutating action.
    ///
    /// A disabled acting user may not mutate anything. A disabled target may
    /// not be granted to. Granting a role membership requires the role to
    /// exist, and disabling requires the user to exist. Everything local to a
    /// single partition is left to the dry run.
    pub fn validate(&self, action: &PrivilegeAction) -> Result<()> {
        let disabled = read(&self.disabled_users)?;
        let users = read(&self.user_privileges)?;
        let roles = read(&self.role_privileges)?;
        Self::validate_against(action, &disabled, &users, &roles)
    }

    /// Same checks as [`validate`](Self::validate), against partitions the
    /// caller supplies, such as copies freshly read from a store.
    pub fn validate_against(
        action: &PrivilegeAction,
        disabled: &DisabledUsersPartition,
        users: &UserPrivilegesPartition,
        roles: &RolePrivilegesPartition,
    ) -> Result<()> {
        if let ActionScope::Privilege { action_type, .. } = action.scope() {
            action_type.parse::<ActionType>()?;
        }
        if !action.verb().is_mutating() {
            return Ok(());
        }

        if let Some(acting) = action.acting_user() {
            if disabled.contains(acting) {
                warn!(acting, %action, "rejected action from disabled user");
                return Err(AccessError::PrincipalDisabled(acting.to_string()));
            }
        }

        let target = action.target();
        match (action.verb(), target, action.scope()) {
            (Verb::Grant, PrincipalRef::User(name), _) if disabled.contains(name) => {
                Err(AccessError::PrincipalDisabled(name.clone()))
            }
            (Verb::Grant, PrincipalRef::User(_), ActionScope::Membership { role })
                if !roles.contains(role) =>
            {
                Err(AccessError::NoSuchPrincipal(PrincipalRef::role(role.as_str())))
            }
            (Verb::Disable, PrincipalRef::User(name), _) if !users.contains(name) => {
                Err(AccessError::NoSuchPrincipal(target.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Returns a copy of partition `S`.
    pub fn snapshot<S: PartitionState>(&self) -> Result<S> {
        Ok(read(S::slot(self))?.clone())
    }

    /// Replaces partition `S` wholesale.
    pub fn install<S: PartitionState>(&self, state: S) -> Result<()> {
        *write(S::slot(self))? = state;
        Ok(())
    }

    /// Applies `action` to a copy of partition `S` and returns the copy.
    ///
    /// With `replay` set, an outcome that only says the effect is already
    /// present yields the unchanged copy instead of an error. For CREATE
    /// that means the existing principal matches the action's payload;
    /// otherwise see [`AccessError::is_satisfied_by`].
    pub fn stage<S: PartitionState>(&self, action: &PrivilegeAction, replay: bool) -> Result<S> {
        let current = self.snapshot::<S>()?;
        let mut next = current.clone();
        match next.apply(action) {
            Ok(()) => Ok(next),
            Err(e) if replay && already_applied(&current, action, &e) => {
                debug!(partition = %S::KIND, %action, error = %e, "replay found effect already present");
                Ok(current)
            }
            Err(e) => Err(e),
        }
    }

    pub fn user_names(&self) -> Result<Vec<String>> {
        Ok(read(&self.user_privileges)?.names().map(str::to_string).collect())
    }

    pub fn role_names(&self) -> Result<Vec<String>> {
        Ok(read(&self.role_privileges)?.names().map(str::to_string).collect())
    }

    /// Roles `user` is a member of.
    pub fn roles_of(&self, user: &str) -> Result<Vec<String>> {
        let users = read(&self.user_privileges)?;
        let principal = users
            .get(user.trim())
            .ok_or_else(|| AccessError::NoSuchPrincipal(PrincipalRef::user(user)))?;
        Ok(principal.roles().map(str::to_string).collect())
    }

    /// Grants held directly by a principal, as `(action type, path)` pairs.
    pub fn grants_of(&self, principal: &PrincipalRef) -> Result<Vec<(ActionType, PrivilegePath)>> {
        let collect = |model: &PrivilegeModel| -> Vec<(ActionType, PrivilegePath)> {
            ActionType::ALL
                .iter()
                .flat_map(|t| model.tree(*t).paths().into_iter().map(move |p| (*t, p)))
                .collect()
        };

        match principal {
            PrincipalRef::User(name) => read(&self.user_privileges)?
                .get(name)
                .map(|u| collect(u.model()))
                .ok_or_else(|| AccessError::NoSuchPrincipal(principal.clone())),
            PrincipalRef::Role(name) => read(&self.role_privileges)?
                .get(name)
                .map(|r| collect(r.model()))
                .ok_or_else(|| AccessError::NoSuchPrincipal(principal.clone())),
        }
    }

    pub fn is_disabled(&self, user: &str) -> Result<bool> {
        Ok(read(&self.disabled_users)?.contains(user.trim()))
    }

    pub fn user_information(&self, user: &str) -> Result<Option<UserInformation>> {
        Ok(read(&self.user_info)?.get(user.trim()).cloned())
    }
}

fn already_applied<S: PartitionState>(
    current: &S,
    action: &PrivilegeAction,
    error: &AccessError,
) -> bool {
    match error {
        AccessError::AlreadyExists(_) => {
            action.verb() == Verb::Create && current.holds_created(action)
        }
        _ => error.is_satisfied_by(action.verb()),
    }
}

fn read<S: PartitionState>(lock: &RwLock<S>) -> Result<RwLockReadGuard<'_, S>> {
    lock.read().map_err(|_| AccessError::LockPoisoned(S::KIND.as_str()))
}

fn write<S: PartitionState>(lock: &RwLock<S>) -> Result<RwLockWriteGuard<'_, S>> {
    lock.write().map_err(|_| AccessError::LockPoisoned(S::KIND.as_str()))
}
