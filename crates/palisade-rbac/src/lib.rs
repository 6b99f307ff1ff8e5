//! # palisade-rbac: Wildcard Privilege Trees
//!
//! The in-memory half of Palisade access control:
//! - **Privilege trees** keyed by database, table and column, with `*`
//!   wildcards at every level
//! - **Privilege models** holding one tree per action type
//!   (insert, delete, select, update)
//! - **Users and roles**, where a user's effective grants are its own plus
//!   the union of its roles' grants
//! - **The access model**, four independently lockable partitions that a
//!   synchronizer can snapshot, replay onto and replace
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  PrivilegeAction (check/grant/revoke/...)    │
//! └──────────────────┬───────────────────────────┘
//!                    │
//!                    ▼
//! ┌──────────────────────────────────────────────┐
//! │  AccessModel                                  │
//! │  ├─ user-info        (credentials)            │
//! │  ├─ disabled-users   (username set)           │
//! │  ├─ user-privileges  (UserPrivilege by name)  │
//! │  └─ role-privileges  (RolePrivilege by name)  │
//! └──────────────────┬───────────────────────────┘
//!                    │
//!                    ▼
//! ┌──────────────────────────────────────────────┐
//! │  PrivilegeModel: one PrivilegeTree per type   │
//! │  root(*) ─ db(*) ─ table(*) ─ column          │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Paths
//!
//! | Path           | Grants                                   |
//! |----------------|------------------------------------------|
//! | `*`            | every database                           |
//! | `db`, `db.*`   | every table in `db`                      |
//! | `db.t`, `db.t.*` | every column of `db.t`                 |
//! | `db.t.c1;c2`   | columns `c1` and `c2` of `db.t` only     |
//!
//! ## Example
//!
//! ```
//! use palisade_rbac::{AccessModel, PrincipalRef, PrivilegeAction};
//!
//! let model = AccessModel::new();
//! model.do_action(&PrivilegeAction::create_role("reader"))?;
//! model.do_action(&PrivilegeAction::grant(
//!     PrincipalRef::role("reader"),
//!     "select",
//!     "sales.orders".parse()?,
//! ))?;
//! model.do_action(&PrivilegeAction::create_user("alice", "secret"))?;
//! model.do_action(&PrivilegeAction::grant_role("alice", "reader"))?;
//!
//! assert!(model.check("alice", "select", &"sales.orders.total".parse()?)?);
//! assert!(!model.check("alice", "update", &"sales.orders".parse()?)?);
//! # Ok::<(), palisade_rbac::AccessError>(())
//! ```

mod access;
mod action;
mod error;
mod model;
mod partition;
mod path;
mod principal;
mod tree;


pub use access::{AccessModel, ActionOutcome};
pub use action::{ActionScope, PrincipalRef, PrivilegeAction, Verb};
pub use error::{AccessError, Result};
pub use model::{ActionType, PrivilegeModel};
pub use partition::{
    DisabledUsersPartition, PartitionKind, PartitionState, RolePrivilegesPartition,
    UserInfoPartition, UserPrivilegesPartition,
};
pub use path::{PrivilegePath, WILDCARD};
pub use principal::{RolePrivilege, UserInformation, UserPrivilege};
pub use tree::{Node, PrivilegeTree, LEAF_DEPTH, ROOT_DEPTH};
