//! Action types and the per-principal privilege model.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AccessError, Result};
use crate::path::PrivilegePath;
use crate::tree::PrivilegeTree;

/// Data-manipulation action a privilege can be granted for.
///
/// Control verbs such as `grant` or `revoke` are deliberately absent; they
/// are [`Verb`](crate::Verb)s, not privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionType {
    Insert,
    Delete,
    Select,
    Update,
}

impl ActionType {
    pub const ALL: [ActionType; 4] = [
        ActionType::Insert,
        ActionType::Delete,
        ActionType::Select,
        ActionType::Update,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Insert => "insert",
            ActionType::Delete => "delete",
            ActionType::Select => "select",
            ActionType::Update => "update",
        }
    }
}

impl FromStr for ActionType {
    type Err = AccessError;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insert" => Ok(ActionType::Insert),
            "delete" => Ok(ActionType::Delete),
            "select" => Ok(ActionType::Select),
            "update" => Ok(ActionType::Update),
            _ => Err(AccessError::UnknownPrivilegeType(s.to_string())),
        }
    }
}

impl Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One [`PrivilegeTree`] per action type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeModel {
    insert: PrivilegeTree,
    delete: PrivilegeTree,
    select: PrivilegeTree,
    update: PrivilegeTree,
}

impl PrivilegeModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self, action_type: ActionType) -> &PrivilegeTree {
        match action_type {
            ActionType::Insert => &self.insert,
            ActionType::Delete => &self.delete,
            ActionType::Select => &self.select,
            ActionType::Update => &self.update,
        }
    }

    fn tree_mut(&mut self, action_type: ActionType) -> &mut PrivilegeTree {
        match action_type {
            ActionType::Insert => &mut self.insert,
            ActionType::Delete => &mut self.delete,
            ActionType::Select => &mut self.select,
            ActionType::Update => &mut self.update,
        }
    }

    pub fn grant(&mut self, action_type: &str, path: &PrivilegePath) -> Result<()> {
        let action_type = action_type.parse()?;
        self.tree_mut(action_type).grant(path)
    }

    pub fn revoke(&mut self, action_type: &str, path: &PrivilegePath) -> Result<()> {
        let action_type = action_type.parse()?;
        self.tree_mut(action_type).revoke(path)
    }

    pub fn check_privilege(&self, action_type: &str, path: &PrivilegePath) -> Result<bool> {
        let action_type = action_type.parse()?;
        Ok(self.tree(action_type).check(path))
    }

    /// [`grant`](Self::grant) with the combined `db.table.c1;c2` form.
    pub fn grant_str(&mut self, action_type: &str, path: &str) -> Result<()> {
        self.grant(action_type, &path.parse()?)
    }

    /// [`revoke`](Self::revoke) with the combined `db.table.c1;c2` form.
    pub fn revoke_str(&mut self, action_type: &str, path: &str) -> Result<()> {
        self.revoke(action_type, &path.parse()?)
    }

    /// [`check_privilege`](Self::check_privilege) with the combined form.
    pub fn check_str(&self, action_type: &str, path: &str) -> Result<bool> {
        self.check_privilege(action_type, &path.parse()?)
    }

    pub fn is_empty(&self) -> bool {
        ActionType::ALL.iter().all(|t| self.tree(*t).is_empty())
    }
}
