//! Durable key/value persistence
//!
//! Every collection is mirrored to the store as one JSON snapshot per
//! (namespace, key). Writes go through [`SnapshotWriter`] so rule edits
//! never wait on disk I/O.

mod writer;

pub use writer::{SnapshotWriter, DEFAULT_QUEUE_CAPACITY};

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Namespaces and keys of persisted snapshots
pub mod keys {
    /// Rule collections
    pub const RULES: &str = "fire_rules";
    /// Application rules
    pub const APP_RULES: &str = "app_rules";
    /// Domain rules
    pub const DOMAIN_RULES: &str = "domain_rules";
    /// IP rules
    pub const IP_RULES: &str = "ip_rules";

    /// Denylist
    pub const DENYLIST: &str = "fire_blocklist";
    /// Denylisted domains
    pub const BLOCKED_DOMAINS: &str = "blocked_domains";

    /// Connection log
    pub const CONNECTION_LOG: &str = "fire_connection_logs";
    /// Log entries
    pub const LOGS: &str = "logs";

    /// Usage accounting
    pub const USAGE: &str = "fire_data_usage";
    /// Per-identity counters
    pub const USAGE_STATS: &str = "usage";
}

/// Byte-oriented storage of named snapshots
pub trait KeyValueStore: Send + Sync {
    /// Read a snapshot, `None` if it was never written
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace a snapshot
    fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<()>;
}

/// In-memory store, used by tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<(String, String), Vec<u8>>>,
    puts: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `put` calls so far
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::Relaxed)
    }

    /// Make every subsequent `put` fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Stored snapshot as UTF-8 text
    pub fn get_string(&self, namespace: &str, key: &str) -> Option<String> {
        let entries = self.entries.lock();
        entries
            .get(&(namespace.to_string(), key.to_string()))
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.lock();
        Ok(entries.get(&(namespace.to_string(), key.to_string())).cloned())
    }

    fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(Error::persistence(namespace, key, "store is failing"));
        }
        self.entries
            .lock()
            .insert((namespace.to_string(), key.to_string()), value.to_vec());
        self.puts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("ns", "k").unwrap(), None);

        store.put("ns", "k", b"[1,2]").unwrap();
        assert_eq!(store.get("ns", "k").unwrap().as_deref(), Some(&b"[1,2]"[..]));
        assert_eq!(store.get_string("ns", "k").as_deref(), Some("[1,2]"));
        assert_eq!(store.put_count(), 1);
    }

    #[test]
    fn test_memory_store_namespaces_disjoint() {
        let store = MemoryStore::new();
        store.put(keys::RULES, "logs", b"a").unwrap();
        assert_eq!(store.get(keys::CONNECTION_LOG, "logs").unwrap(), None);
    }

    #[test]
    fn test_memory_store_failing() {
        let store = MemoryStore::new();
        store.set_failing(true);
        assert!(matches!(store.put("ns", "k", b"x"), Err(Error::Persistence { .. })));
        assert_eq!(store.put_count(), 0);
    }
}
