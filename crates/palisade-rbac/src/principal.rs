//! Users and roles: a privilege model plus identity.
//!
//! Users reference roles by name; they never own them. Role membership is
//! one level deep: roles do not reference other roles.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::action::PrincipalRef;
use crate::error::{AccessError, Result};
use crate::model::{ActionType, PrivilegeModel};
use crate::path::PrivilegePath;

/// Credential record kept in the user-info partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInformation {
    pub username: String,
    pub password: String,
}

impl UserInformation {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// A role's privileges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePrivilege {
    role_name: String,
    model: PrivilegeModel,
}

impl RolePrivilege {
    pub fn new(role_name: impl Into<String>) -> Self {
        Self {
            role_name: role_name.into(),
            model: PrivilegeModel::new(),
        }
    }

    pub fn role_name(&self) -> &str {
        &self.role_name
    }

    pub fn model(&self) -> &PrivilegeModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut PrivilegeModel {
        &mut self.model
    }
}

/// A user's own privileges, credentials and role memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPrivilege {
    username: String,
    password: String,
    roles: BTreeSet<String>,
    model: PrivilegeModel,
}

impl UserPrivilege {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            roles: BTreeSet::new(),
            model: PrivilegeModel::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn model(&self) -> &PrivilegeModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut PrivilegeModel {
        &mut self.model
    }

    /// Adds a role membership. Idempotent; returns whether it was new.
    pub fn grant_role(&mut self, role: &str) -> bool {
        self.roles.insert(role.trim().to_string())
    }

    /// Drops a role membership. Idempotent; returns whether it was held.
    pub fn revoke_role(&mut self, role: &str) -> bool {
        self.roles.remove(role.trim())
    }

    /// Returns whether the user's own grants or any of its roles' grants
    /// cover `path` for `action_type`.
    ///
    /// Role grants are a pure union with the user's own; there is no deny.
    /// Every referenced role is resolved before evaluation, so a dangling
    /// membership fails with [`AccessError::NoSuchPrincipal`] even when the
    /// user's own grants would have sufficed.
    pub fn check_privilege<'r, F>(
        &self,
        action_type: &str,
        path: &PrivilegePath,
        resolve: F,
    ) -> Result<bool>
    where
        F: Fn(&str) -> Option<&'r RolePrivilege>,
    {
        let action_type: ActionType = action_type.parse()?;

        let roles = self
            .roles
            .iter()
            .map(|name| {
                resolve(name).ok_or_else(|| AccessError::NoSuchPrincipal(PrincipalRef::role(name)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(self.model.tree(action_type).check(path)
            || roles
                .iter()
                .any(|role| role.model.tree(action_type).check(path)))
    }
}
