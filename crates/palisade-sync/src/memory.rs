//! In-process coordination store.
//!
//! One [`MemoryStore`] stands in for the shared store; each proxy instance
//! gets its own [`MemoryConnection`] with its own watches and close state,
//! the way separate processes would each hold a client session.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bytes::Bytes;
use palisade_config::SyncSettings;
use tokio::sync::broadcast;
use tracing::trace;

use crate::store::{CoordinationStore, StoreError, Version, WatchEvent, WatchSubscription};

const DEFAULT_WATCH_BUFFER: usize = 256;

type WriteHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone)]
struct Entry {
    data: Bytes,
    version: Version,
}

struct Shared {
    entries: Mutex<BTreeMap<String, Entry>>,
    connections: Mutex<Vec<Weak<ConnectionState>>>,
    available: AtomicBool,
    before_write: Mutex<Option<WriteHook>>,
    watch_buffer: usize,
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("available", &self.available.load(Ordering::Relaxed))
            .field("watch_buffer", &self.watch_buffer)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct ConnectionState {
    closed: AtomicBool,
    watchers: Mutex<HashMap<String, broadcast::Sender<WatchEvent>>>,
}

/// Shared in-memory store backend.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_watch_buffer(DEFAULT_WATCH_BUFFER)
    }

    /// Creates a store whose watch channels buffer `watch_buffer` events.
    pub fn with_watch_buffer(watch_buffer: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(BTreeMap::new()),
                connections: Mutex::new(Vec::new()),
                available: AtomicBool::new(true),
                before_write: Mutex::new(None),
                watch_buffer: watch_buffer.max(1),
            }),
        }
    }

    /// Creates a store sized by the synchronizer settings.
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::with_watch_buffer(settings.watch_buffer)
    }

    /// Opens a new client connection.
    pub fn connect(&self) -> MemoryConnection {
        let state = Arc::new(ConnectionState::default());
        let mut connections = lock(&self.shared.connections);
        connections.retain(|c| c.strong_count() > 0);
        connections.push(Arc::downgrade(&state));
        MemoryConnection {
            store: self.clone(),
            state,
        }
    }

    /// Makes every call fail with [`StoreError::Unavailable`] while `false`.
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// Installs a hook run at the start of every conditional write, before
    /// the version check and outside any store lock.
    ///
    /// The hook may write through another connection to force a conflict.
    /// It is also run for those nested writes, so it must guard itself.
    pub fn before_write(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *lock(&self.shared.before_write) = Some(Arc::new(hook));
    }

    pub fn clear_before_write(&self) {
        *lock(&self.shared.before_write) = None;
    }

    /// Current version at `path`, bypassing availability.
    pub fn version(&self, path: &str) -> Option<Version> {
        lock(&self.shared.entries).get(path).map(|e| e.version)
    }

    /// Current blob at `path`, bypassing availability.
    pub fn data(&self, path: &str) -> Option<Bytes> {
        lock(&self.shared.entries).get(path).map(|e| e.data.clone())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.shared.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store marked unavailable".to_string()))
        }
    }

    /// Delivers a change to every open connection watching `path`.
    ///
    /// Called with the entries lock held so events for one path reach each
    /// watcher in version order.
    fn notify(&self, path: &str, entry: &Entry) {
        let connections = lock(&self.shared.connections);
        for state in connections.iter().filter_map(Weak::upgrade) {
            if state.closed.load(Ordering::SeqCst) {
                continue;
            }
            if let Some(sender) = lock(&state.watchers).get(path) {
                // No live receivers is fine.
                let _ = sender.send(WatchEvent {
                    path: path.to_string(),
                    data: entry.data.clone(),
                    version: entry.version,
                });
            }
        }
    }
}

/// One client session on a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryConnection {
    store: MemoryStore,
    state: Arc<ConnectionState>,
}

impl MemoryConnection {
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        self.store.check_available()
    }
}

impl CoordinationStore for MemoryConnection {
    fn read(&self, path: &str) -> Result<(Bytes, Version), StoreError> {
        self.check_open()?;
        lock(&self.store.shared.entries)
            .get(path)
            .map(|e| (e.data.clone(), e.version))
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn write(&self, path: &str, data: Bytes, expected: Version) -> Result<Version, StoreError> {
        self.check_open()?;

        let hook = lock(&self.store.shared.before_write).clone();
        if let Some(hook) = hook {
            hook(path);
        }

        let mut entries = lock(&self.store.shared.entries);
        let entry = entries
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        if entry.version != expected {
            trace!(path, %expected, current = %entry.version, "rejecting stale write");
            return Err(StoreError::VersionConflict {
                path: path.to_string(),
                expected,
                current: entry.version,
            });
        }

        entry.data = data;
        entry.version = entry.version.next();
        let written = entry.clone();
        self.store.notify(path, &written);
        Ok(written.version)
    }

    fn create(&self, path: &str, data: Bytes) -> Result<bool, StoreError> {
        self.check_open()?;

        let mut entries = lock(&self.store.shared.entries);
        if entries.contains_key(path) {
            return Ok(false);
        }
        let entry = Entry {
            data,
            version: Version::INITIAL,
        };
        self.store.notify(path, &entry);
        entries.insert(path.to_string(), entry);
        Ok(true)
    }

    fn watch(&self, path: &str) -> Result<WatchSubscription, StoreError> {
        self.check_open()?;

        let mut watchers = lock(&self.state.watchers);
        let sender = watchers
            .entry(path.to_string())
            .or_insert_with(|| broadcast::channel(self.store.shared.watch_buffer).0);
        Ok(WatchSubscription::new(sender.subscribe()))
    }

    fn close(&self) {
        if !self.state.closed.swap(true, Ordering::SeqCst) {
            // Dropping the senders ends every subscription on this connection.
            lock(&self.state.watchers).clear();
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Locks a store mutex. The guarded data is plain values with no invariants
/// spanning a panic, so a poisoned lock is recovered rather than propagated.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
