//! # Palisade
//!
//! Distributed access control for fleets of SQL proxy instances.
//!
//! Every instance holds the full privilege state in memory and answers
//! privilege checks locally. DCL statements (GRANT, REVOKE, CREATE/DROP
//! USER/ROLE, DISABLE) are committed to a shared coordination store with
//! optimistic compare-and-swap, and every other instance picks them up
//! through store watches.
//!
//! - **Wildcard grants** at database, table or column level
//! - **Roles** whose grants are added to every member's own
//! - **Disabled users** that can no longer act or be checked
//! - **Conflict replay**: a lost race refreshes and reapplies the statement
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        Palisade                            │
//! │  ┌──────────────┐   ┌───────────────┐   ┌───────────────┐ │
//! │  │    Config    │ → │  AccessModel  │ ↔ │ Synchronizer  │ │
//! │  │ (seed grants)│   │ (4 partitions)│   │ (CAS + watch) │ │
//! │  └──────────────┘   └───────────────┘   └───────┬───────┘ │
//! └─────────────────────────────────────────────────┼─────────┘
//!                                                   ▼
//!                                         CoordinationStore
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use palisade::{MemoryStore, Palisade, PalisadeConfig, PrincipalRef};
//!
//! let store = MemoryStore::new();
//! let config = PalisadeConfig::default();
//! let proxy = Palisade::open(&config, Arc::new(store.connect()))?;
//!
//! proxy.create_user("alice", "secret")?;
//! proxy.grant(PrincipalRef::user("alice"), "select", "sales.*")?;
//!
//! assert!(proxy.check("alice", "select", "sales.orders.total")?);
//! assert!(!proxy.check("alice", "delete", "sales.orders")?);
//! # Ok::<(), palisade::PalisadeError>(())
//! ```

mod error;
mod palisade;

pub use error::{PalisadeError, Result};
pub use palisade::Palisade;

// Re-export configuration
pub use palisade_config::{
    CodecKind, ConfigError, ConfigLoader, ConfigLocations, GrantSet, Layer, PalisadeConfig,
    RoleDefinition, SyncSettings, UserDefinition,
};

// Re-export the access model
pub use palisade_rbac::{
    AccessError, AccessModel, ActionOutcome, ActionScope, ActionType, PrincipalRef,
    PrivilegeAction, PrivilegeModel, PrivilegePath, PrivilegeTree, RolePrivilege,
    UserInformation, UserPrivilege, Verb,
};

// Re-export synchronization
pub use palisade_sync::{
    CoordinationStore, MemoryConnection, MemoryStore, PartitionCodec, StoreError, SyncError,
    Synchronizer, Version,
};
