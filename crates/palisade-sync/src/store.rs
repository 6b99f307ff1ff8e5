//! The coordination-store contract the synchronizer is written against.
//!
//! A store holds versioned byte blobs at slash-separated paths. Every
//! successful write bumps the path's version by one; a conditional write
//! names the version it expects to replace and fails with
//! [`StoreError::VersionConflict`] when someone else got there first.

use std::fmt::{self, Debug, Display};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// Version of a stored blob.
///
/// [`Version::UNKNOWN`] sorts below every version a store hands out, so any
/// real version is "newer" than a partition that was never read.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Version(u64);

impl Version {
    pub const UNKNOWN: Version = Version(0);
    /// Version of a freshly created path.
    pub const INITIAL: Version = Version(1);

    pub fn new(version: u64) -> Self {
        Self(version)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The version a successful write produces.
    #[must_use]
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(version: u64) -> Self {
        Self(version)
    }
}

/// Error returned by a [`CoordinationStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A conditional write lost the race.
    #[error("version conflict on {path}: expected {expected}, store has {current}")]
    VersionConflict {
        path: String,
        expected: Version,
        current: Version,
    },

    #[error("no data at {0}")]
    NotFound(String),

    /// Transport-level failure. Never retried by the synchronizer.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The connection was closed.
    #[error("store connection closed")]
    Closed,
}

/// A change observed on a watched path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: String,
    pub data: Bytes,
    pub version: Version,
}

/// What a [`WatchSubscription`] yields next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchNext {
    Event(WatchEvent),
    /// The subscriber fell behind and this many events were dropped.
    Lagged(u64),
    /// The connection closed; no further events will arrive.
    Closed,
}

/// Stream of changes on one path.
///
/// Backed by a [`broadcast`] receiver so a slow consumer is told it lagged
/// instead of blocking writers.
#[derive(Debug)]
pub struct WatchSubscription {
    receiver: broadcast::Receiver<WatchEvent>,
}

impl WatchSubscription {
    pub fn new(receiver: broadcast::Receiver<WatchEvent>) -> Self {
        Self { receiver }
    }

    /// Blocks until the next change. Must not be called from inside an
    /// async runtime.
    pub fn recv(&mut self) -> WatchNext {
        match self.receiver.blocking_recv() {
            Ok(event) => WatchNext::Event(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => WatchNext::Lagged(skipped),
            Err(broadcast::error::RecvError::Closed) => WatchNext::Closed,
        }
    }

    /// Returns the next change if one is already buffered.
    pub fn try_recv(&mut self) -> Option<WatchNext> {
        match self.receiver.try_recv() {
            Ok(event) => Some(WatchNext::Event(event)),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => Some(WatchNext::Lagged(skipped)),
            Err(broadcast::error::TryRecvError::Closed) => Some(WatchNext::Closed),
            Err(broadcast::error::TryRecvError::Empty) => None,
        }
    }
}

/// A versioned key/value store shared by every proxy instance.
///
/// Implementations are blocking; every call completes one round trip.
pub trait CoordinationStore: Send + Sync + Debug {
    /// Returns the blob at `path` and its version.
    fn read(&self, path: &str) -> Result<(Bytes, Version), StoreError>;

    /// Replaces the blob at `path` if its version is still `expected`.
    /// Returns the new version.
    fn write(&self, path: &str, data: Bytes, expected: Version) -> Result<Version, StoreError>;

    /// Creates `path` with `data`. Returns `false`, leaving the existing
    /// blob alone, when the path already exists.
    fn create(&self, path: &str, data: Bytes) -> Result<bool, StoreError>;

    /// Subscribes to changes on `path`. Events for changes made through this
    /// connection are delivered too.
    fn watch(&self, path: &str) -> Result<WatchSubscription, StoreError>;

    /// Closes the connection and ends its watch subscriptions. Idempotent.
    fn close(&self);
}
