//! The four independently synchronized slices of access-model state.
//!
//! Each partition knows how to apply the part of a [`PrivilegeAction`] that
//! concerns it. Application is local to the partition: cross-partition
//! preconditions (role exists, user not disabled) are checked by
//! [`AccessModel::validate`](crate::AccessModel::validate) beforehand.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Debug, Display};
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::access::AccessModel;
use crate::action::{ActionScope, PrincipalRef, PrivilegeAction, Verb};
use crate::error::{AccessError, Result};
use crate::principal::{RolePrivilege, UserInformation, UserPrivilege};

/// Identifies a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PartitionKind {
    UserInfo,
    DisabledUsers,
    UserPrivileges,
    RolePrivileges,
}

impl PartitionKind {
    pub const ALL: [PartitionKind; 4] = [
        PartitionKind::UserInfo,
        PartitionKind::DisabledUsers,
        PartitionKind::UserPrivileges,
        PartitionKind::RolePrivileges,
    ];

    /// Stable name used in store paths and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionKind::UserInfo => "user-info",
            PartitionKind::DisabledUsers => "disabled-users",
            PartitionKind::UserPrivileges => "user-privileges",
            PartitionKind::RolePrivileges => "role-privileges",
        }
    }
}

impl Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State held by one partition.
pub trait PartitionState:
    Clone + Default + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: PartitionKind;

    /// The lock holding this partition inside the model.
    fn slot(model: &AccessModel) -> &RwLock<Self>;

    /// Applies the part of `action` that concerns this partition.
    fn apply(&mut self, action: &PrivilegeAction) -> Result<()>;

    /// Whether the principal a CREATE `action` names is already here with
    /// the same payload the action carries.
    fn holds_created(&self, action: &PrivilegeAction) -> bool;
}

/// Credentials by username.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserInfoPartition(BTreeMap<String, UserInformation>);

impl UserInfoPartition {
    pub fn get(&self, username: &str) -> Option<&UserInformation> {
        self.0.get(username)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartitionState for UserInfoPartition {
    const KIND: PartitionKind = PartitionKind::UserInfo;

    fn slot(model: &AccessModel) -> &RwLock<Self> {
        &model.user_info
    }

    fn apply(&mut self, action: &PrivilegeAction) -> Result<()> {
        let PrincipalRef::User(name) = action.target() else {
            return Ok(());
        };

        match (action.verb(), action.scope()) {
            (Verb::Create, ActionScope::Credentials { password }) => {
                if self.0.contains_key(name) {
                    return Err(AccessError::AlreadyExists(action.target().clone()));
                }
                self.0
                    .insert(name.clone(), UserInformation::new(name.clone(), password.clone()));
                Ok(())
            }
            (Verb::Remove, _) => self
                .0
                .remove(name)
                .map(drop)
                .ok_or_else(|| AccessError::NoSuchPrincipal(action.target().clone())),
            _ => Ok(()),
        }
    }

    fn holds_created(&self, action: &PrivilegeAction) -> bool {
        match (action.verb(), action.target(), action.scope()) {
            (Verb::Create, PrincipalRef::User(name), ActionScope::Credentials { password }) => {
                self.0.get(name).is_some_and(|info| info.password == *password)
            }
            _ => false,
        }
    }
}

/// Usernames that may no longer act or be checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisabledUsersPartition(BTreeSet<String>);

impl DisabledUsersPartition {
    pub fn contains(&self, username: &str) -> bool {
        self.0.contains(username)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartitionState for DisabledUsersPartition {
    const KIND: PartitionKind = PartitionKind::DisabledUsers;

    fn slot(model: &AccessModel) -> &RwLock<Self> {
        &model.disabled_users
    }

    fn apply(&mut self, action: &PrivilegeAction) -> Result<()> {
        let PrincipalRef::User(name) = action.target() else {
            return Ok(());
        };

        match action.verb() {
            Verb::Disable => {
                self.0.insert(name.clone());
            }
            Verb::Remove => {
                self.0.remove(name);
            }
            _ => {}
        }
        Ok(())
    }

    fn holds_created(&self, _action: &PrivilegeAction) -> bool {
        false
    }
}

/// User principals by username.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserPrivilegesPartition(BTreeMap<String, UserPrivilege>);

impl UserPrivilegesPartition {
    pub fn get(&self, username: &str) -> Option<&UserPrivilege> {
        self.0.get(username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.0.contains_key(username)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn user_mut(&mut self, target: &PrincipalRef) -> Result<&mut UserPrivilege> {
        self.0
            .get_mut(target.name())
            .ok_or_else(|| AccessError::NoSuchPrincipal(target.clone()))
    }
}

impl PartitionState for UserPrivilegesPartition {
    const KIND: PartitionKind = PartitionKind::UserPrivileges;

    fn slot(model: &AccessModel) -> &RwLock<Self> {
        &model.user_privileges
    }

    fn apply(&mut self, action: &PrivilegeAction) -> Result<()> {
        let target = action.target();

        match (action.verb(), target, action.scope()) {
            (Verb::Create, PrincipalRef::User(name), ActionScope::Credentials { password }) => {
                if self.0.contains_key(name) {
                    return Err(AccessError::AlreadyExists(target.clone()));
                }
                self.0
                    .insert(name.clone(), UserPrivilege::new(name.clone(), password.clone()));
                Ok(())
            }
            (Verb::Remove, PrincipalRef::User(name), _) => self
                .0
                .remove(name)
                .map(drop)
                .ok_or_else(|| AccessError::NoSuchPrincipal(target.clone())),
            (Verb::Remove, PrincipalRef::Role(role), _) => {
                for user in self.0.values_mut() {
                    user.revoke_role(role);
                }
                Ok(())
            }
            (Verb::Grant, PrincipalRef::User(_), ActionScope::Privilege { action_type, path }) => {
                self.user_mut(target)?.model_mut().grant(action_type, path)
            }
            (Verb::Revoke, PrincipalRef::User(_), ActionScope::Privilege { action_type, path }) => {
                self.user_mut(target)?.model_mut().revoke(action_type, path)
            }
            (Verb::Grant, PrincipalRef::User(_), ActionScope::Membership { role }) => {
                self.user_mut(target)?.grant_role(role);
                Ok(())
            }
            (Verb::Revoke, PrincipalRef::User(_), ActionScope::Membership { role }) => {
                self.user_mut(target)?.revoke_role(role);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn holds_created(&self, action: &PrivilegeAction) -> bool {
        match (action.verb(), action.target(), action.scope()) {
            (Verb::Create, PrincipalRef::User(name), ActionScope::Credentials { password }) => {
                self.0.get(name).is_some_and(|user| user.password() == password)
            }
            _ => false,
        }
    }
}

/// Role principals by role name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RolePrivilegesPartition(BTreeMap<String, RolePrivilege>);

impl RolePrivilegesPartition {
    pub fn get(&self, role: &str) -> Option<&RolePrivilege> {
        self.0.get(role)
    }

    pub fn contains(&self, role: &str) -> bool {
        self.0.contains_key(role)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn role_mut(&mut self, target: &PrincipalRef) -> Result<&mut RolePrivilege> {
        self.0
            .get_mut(target.name())
            .ok_or_else(|| AccessError::NoSuchPrincipal(target.clone()))
    }
}

impl PartitionState for RolePrivilegesPartition {
    const KIND: PartitionKind = PartitionKind::RolePrivileges;

    fn slot(model: &AccessModel) -> &RwLock<Self> {
        &model.role_privileges
    }

    fn apply(&mut self, action: &PrivilegeAction) -> Result<()> {
        let target = action.target();
        let PrincipalRef::Role(name) = target else {
            return Ok(());
        };

        match (action.verb(), action.scope()) {
            (Verb::Create, _) => {
                if self.0.contains_key(name) {
                    return Err(AccessError::AlreadyExists(target.clone()));
                }
                self.0.insert(name.clone(), RolePrivilege::new(name.clone()));
                Ok(())
            }
            (Verb::Remove, _) => self
                .0
                .remove(name)
                .map(drop)
                .ok_or_else(|| AccessError::NoSuchPrincipal(target.clone())),
            (Verb::Grant, ActionScope::Privilege { action_type, path }) => {
                self.role_mut(target)?.model_mut().grant(action_type, path)
            }
            (Verb::Revoke, ActionScope::Privilege { action_type, path }) => {
                self.role_mut(target)?.model_mut().revoke(action_type, path)
            }
            _ => Ok(()),
        }
    }

    /// A role carries nothing but its name, so any existing role will do.
    fn holds_created(&self, action: &PrivilegeAction) -> bool {
        match (action.verb(), action.target()) {
            (Verb::Create, PrincipalRef::Role(name)) => self.0.contains_key(name),
            _ => false,
        }
    }
}
