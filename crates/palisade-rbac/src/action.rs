//! DCL commands evaluated by the access model.
//!
//! A [`PrivilegeAction`] is immutable once built. Grant is set-union and
//! revoke is set-difference, so re-applying an action to a refreshed model
//! converges on the same state; the synchronizer relies on that when it
//! replays an action after a version conflict.

use std::fmt::{self, Display};

use crate::error::{AccessError, Result};
use crate::partition::PartitionKind;
use crate::path::PrivilegePath;

/// What an action does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Check,
    Grant,
    Revoke,
    Create,
    Remove,
    Disable,
}

impl Verb {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Verb::Check)
    }
}

impl Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verb::Check => "check",
            Verb::Grant => "grant",
            Verb::Revoke => "revoke",
            Verb::Create => "create",
            Verb::Remove => "remove",
            Verb::Disable => "disable",
        };
        f.write_str(name)
    }
}

/// A user or role, by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrincipalRef {
    User(String),
    Role(String),
}

impl PrincipalRef {
    pub fn user(name: impl Into<String>) -> Self {
        Self::User(name.into().trim().to_string())
    }

    pub fn role(name: impl Into<String>) -> Self {
        Self::Role(name.into().trim().to_string())
    }

    pub fn name(&self) -> &str {
        match self {
            Self::User(name) | Self::Role(name) => name,
        }
    }

    pub fn is_role(&self) -> bool {
        matches!(self, Self::Role(_))
    }
}

impl Display for PrincipalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(name) => write!(f, "user '{name}'"),
            Self::Role(name) => write!(f, "role '{name}'"),
        }
    }
}

/// The object an action applies to, beyond its target principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionScope {
    /// The principal itself (create role, remove, disable).
    Principal,
    /// A new user's credentials.
    Credentials { password: String },
    /// A privilege on a resource path.
    Privilege {
        action_type: String,
        path: PrivilegePath,
    },
    /// Membership of a user in a role.
    Membership { role: String },
}

/// An immutable DCL command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeAction {
    acting_user: Option<String>,
    target: PrincipalRef,
    verb: Verb,
    scope: ActionScope,
}

impl PrivilegeAction {
    /// Builds an action from parts, rejecting combinations that have no
    /// meaning (checking a role, disabling a role, creating a user without
    /// credentials, role membership on a role, ...).
    pub fn new(
        acting_user: Option<String>,
        target: PrincipalRef,
        verb: Verb,
        scope: ActionScope,
    ) -> Result<Self> {
        let action = Self {
            acting_user,
            target,
            verb,
            scope,
        };
        action.validate_shape()?;
        Ok(action)
    }

    fn validate_shape(&self) -> Result<()> {
        use ActionScope as S;

        let valid = match (self.verb, &self.target, &self.scope) {
            (Verb::Check, PrincipalRef::User(_), S::Privilege { .. }) => true,
            (Verb::Grant | Verb::Revoke, _, S::Privilege { .. }) => true,
            (Verb::Grant | Verb::Revoke, PrincipalRef::User(_), S::Membership { .. }) => true,
            (Verb::Create, PrincipalRef::User(_), S::Credentials { .. }) => true,
            (Verb::Create, PrincipalRef::Role(_), S::Principal) => true,
            (Verb::Remove, _, S::Principal) => true,
            (Verb::Disable, PrincipalRef::User(_), S::Principal) => true,
            _ => false,
        };

        if self.target.name().is_empty() {
            return Err(AccessError::InvalidAction(format!(
                "{} with an empty principal name",
                self.verb
            )));
        }

        if valid {
            Ok(())
        } else {
            Err(AccessError::InvalidAction(format!(
                "{} on {} with scope {:?}",
                self.verb, self.target, self.scope
            )))
        }
    }

    pub fn check(user: &str, action_type: &str, path: PrivilegePath) -> Self {
        Self::privilege(Verb::Check, PrincipalRef::user(user), action_type, path)
    }

    pub fn grant(target: PrincipalRef, action_type: &str, path: PrivilegePath) -> Self {
        Self::privilege(Verb::Grant, target, action_type, path)
    }

    pub fn revoke(target: PrincipalRef, action_type: &str, path: PrivilegePath) -> Self {
        Self::privilege(Verb::Revoke, target, action_type, path)
    }

    fn privilege(verb: Verb, target: PrincipalRef, action_type: &str, path: PrivilegePath) -> Self {
        Self {
            acting_user: None,
            target,
            verb,
            scope: ActionScope::Privilege {
                action_type: action_type.to_string(),
                path,
            },
        }
    }

    pub fn grant_role(user: &str, role: &str) -> Self {
        Self::membership(Verb::Grant, user, role)
    }

    pub fn revoke_role(user: &str, role: &str) -> Self {
        Self::membership(Verb::Revoke, user, role)
    }

    fn membership(verb: Verb, user: &str, role: &str) -> Self {
        Self {
            acting_user: None,
            target: PrincipalRef::user(user),
            verb,
            scope: ActionScope::Membership {
                role: role.trim().to_string(),
            },
        }
    }

    pub fn create_user(user: &str, password: &str) -> Self {
        Self {
            acting_user: None,
            target: PrincipalRef::user(user),
            verb: Verb::Create,
            scope: ActionScope::Credentials {
                password: password.to_string(),
            },
        }
    }

    pub fn create_role(role: &str) -> Self {
        Self::on_principal(Verb::Create, PrincipalRef::role(role))
    }

    pub fn remove_user(user: &str) -> Self {
        Self::on_principal(Verb::Remove, PrincipalRef::user(user))
    }

    pub fn remove_role(role: &str) -> Self {
        Self::on_principal(Verb::Remove, PrincipalRef::role(role))
    }

    pub fn disable_user(user: &str) -> Self {
        Self::on_principal(Verb::Disable, PrincipalRef::user(user))
    }

    fn on_principal(verb: Verb, target: PrincipalRef) -> Self {
        Self {
            acting_user: None,
            target,
            verb,
            scope: ActionScope::Principal,
        }
    }

    /// Records the user issuing the statement.
    pub fn by(mut self, acting_user: &str) -> Self {
        self.acting_user = Some(acting_user.trim().to_string());
        self
    }

    pub fn acting_user(&self) -> Option<&str> {
        self.acting_user.as_deref()
    }

    pub fn target(&self) -> &PrincipalRef {
        &self.target
    }

    pub fn is_role(&self) -> bool {
        self.target.is_role()
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn scope(&self) -> &ActionScope {
        &self.scope
    }

    pub fn action_type(&self) -> Option<&str> {
        match &self.scope {
            ActionScope::Privilege { action_type, .. } => Some(action_type),
            _ => None,
        }
    }

    pub fn path(&self) -> Option<&PrivilegePath> {
        match &self.scope {
            ActionScope::Privilege { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Partitions this action mutates, in commit order.
    ///
    /// Removing a role strips memberships (user privileges) before deleting
    /// the role, so an interrupted removal never leaves users pointing at a
    /// role that is gone.
    pub fn partitions(&self) -> &'static [PartitionKind] {
        use PartitionKind as P;

        match (self.verb, &self.target) {
            (Verb::Check, _) => &[],
            (Verb::Create, PrincipalRef::User(_)) => &[P::UserInfo, P::UserPrivileges],
            (Verb::Create, PrincipalRef::Role(_)) => &[P::RolePrivileges],
            (Verb::Remove, PrincipalRef::User(_)) => {
                &[P::UserInfo, P::DisabledUsers, P::UserPrivileges]
            }
            (Verb::Remove, PrincipalRef::Role(_)) => &[P::UserPrivileges, P::RolePrivileges],
            (Verb::Disable, _) => &[P::DisabledUsers],
            (Verb::Grant | Verb::Revoke, PrincipalRef::User(_)) => &[P::UserPrivileges],
            (Verb::Grant | Verb::Revoke, PrincipalRef::Role(_)) => &[P::RolePrivileges],
        }
    }
}

impl Display for PrivilegeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb, self.target)?;
        match &self.scope {
            ActionScope::Principal | ActionScope::Credentials { .. } => Ok(()),
            ActionScope::Privilege { action_type, path } => write!(f, " {action_type} on {path}"),
            ActionScope::Membership { role } => write!(f, " membership of role '{role}'"),
        }
    }
}
