//! # palisade-sync: Coordination-Store Synchronization
//!
//! Keeps every proxy instance's [`AccessModel`](palisade_rbac::AccessModel)
//! in step through a shared, versioned coordination store:
//! - **Compare-and-swap with replay**: a mutation is written conditionally
//!   on the last version this instance saw; on conflict the partition is
//!   refreshed from the store and the action replayed, up to
//!   `max_retries` times
//! - **Watches**: a background thread per partition adopts remote changes
//!   whose version is newer than the last one seen
//! - **Independent partitions**: user info, disabled users, user privileges
//!   and role privileges are committed separately, with no cross-partition
//!   transaction
//!
//! [`MemoryStore`] implements [`CoordinationStore`] in process, with one
//! [`MemoryConnection`] per instance.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use palisade_config::SyncSettings;
//! use palisade_rbac::{AccessModel, PrivilegeAction};
//! use palisade_sync::{MemoryStore, Synchronizer};
//!
//! let store = MemoryStore::new();
//! let sync = Synchronizer::start(
//!     Arc::new(AccessModel::new()),
//!     Arc::new(store.connect()),
//!     SyncSettings::default(),
//! )?;
//!
//! sync.execute(&PrivilegeAction::create_role("auditor"))?;
//! assert_eq!(sync.model().role_names()?, vec!["auditor".to_string()]);
//! sync.close();
//! # Ok::<(), palisade_sync::SyncError>(())
//! ```

mod codec;
mod error;
mod memory;
mod store;
mod synchronizer;

#[cfg(test)]
mod tests;

pub use codec::PartitionCodec;
pub use error::{Result, SyncError};
pub use memory::{MemoryConnection, MemoryStore};
pub use store::{
    CoordinationStore, StoreError, Version, WatchEvent, WatchNext, WatchSubscription,
};
pub use synchronizer::Synchronizer;
