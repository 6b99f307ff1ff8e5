//! Error types for privilege evaluation and DCL actions.

use crate::action::PrincipalRef;
use crate::action::Verb;
use thiserror::Error;

/// Error type for tree, model and access-model operations.
///
/// Every variant is a local validation failure surfaced synchronously to the
/// caller of [`AccessModel::do_action`](crate::AccessModel::do_action).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// Action type outside insert/delete/select/update.
    #[error("unknown privilege type '{0}'")]
    UnknownPrivilegeType(String),

    /// Path with the wrong segment count or an empty/misplaced segment.
    #[error("malformed privilege path '{path}': {reason}")]
    MalformedPath { path: String, reason: String },

    /// Every entry of the grant was already present.
    #[error("privilege on '{0}' is already granted")]
    AlreadyGranted(String),

    /// None of the entries of the revoke were present.
    #[error("no grant on '{0}' to revoke")]
    NoSuchGrant(String),

    /// A principal with this name already exists.
    #[error("{0} already exists")]
    AlreadyExists(PrincipalRef),

    /// The principal does not exist.
    #[error("{0} does not exist")]
    NoSuchPrincipal(PrincipalRef),

    /// The user has been disabled.
    #[error("user '{0}' is disabled")]
    PrincipalDisabled(String),

    /// Verb, target and scope do not form a meaningful action.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// A partition lock was poisoned by a panicking writer.
    #[error("lock poisoned on partition {0}")]
    LockPoisoned(&'static str),
}

impl AccessError {
    pub(crate) fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns whether this error means the action's effect is already
    /// present in the state it was applied to.
    ///
    /// Replaying an action against a freshly refreshed partition may find
    /// that another instance already made the same change. Those outcomes
    /// count as success during replay; everything else still fails.
    ///
    /// `AlreadyExists` is not listed: a CREATE carries a payload, so whether
    /// it is satisfied depends on the existing record
    /// (see [`PartitionState::holds_created`](crate::PartitionState::holds_created)).
    pub fn is_satisfied_by(&self, verb: Verb) -> bool {
        matches!(
            (self, verb),
            (Self::AlreadyGranted(_), Verb::Grant)
                | (Self::NoSuchGrant(_), Verb::Revoke)
                | (Self::NoSuchPrincipal(_), Verb::Remove)
        )
    }
}

/// Result type for access-control operations.
pub type Result<T> = std::result::Result<T, AccessError>;
