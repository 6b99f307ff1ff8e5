//! Error types for the Palisade facade.

use palisade_rbac::AccessError;
use palisade_sync::SyncError;
use thiserror::Error;

/// Errors returned by [`Palisade`](crate::Palisade).
#[derive(Debug, Error)]
pub enum PalisadeError {
    /// The statement failed local validation.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// The statement could not be made durable.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] anyhow::Error),
}

impl PalisadeError {
    /// Returns the access-control failure behind this error, if any.
    pub fn access_error(&self) -> Option<&AccessError> {
        match self {
            PalisadeError::Access(e) | PalisadeError::Sync(SyncError::Access(e)) => Some(e),
            _ => None,
        }
    }
}

/// Result type for Palisade operations.
pub type Result<T> = std::result::Result<T, PalisadeError>;
