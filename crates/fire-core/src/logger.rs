//! Blocked-connection log
//!
//! Bounded, newest-first record of block decisions. Allowed traffic is
//! never logged.

use crate::error::Result;
use crate::identity::{is_known, IdentityResolver, Uid};
use crate::store::{keys, SnapshotWriter};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Default number of entries kept
pub const DEFAULT_CAPACITY: usize = 1000;

/// Action tag for lookups answered with NXDOMAIN
pub const DNS_BLOCKED: &str = "DNS_BLOCKED";

/// Action tag for packets dropped by an application or IP rule
pub const RULE_BLOCKED: &str = "RULE_BLOCKED";

/// One block decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionLogEntry {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Destination address
    pub dest_ip: String,
    /// Destination port
    pub dest_port: u16,
    /// Owning identity, -1 when unknown
    pub uid: Uid,
    /// Reason tag
    pub action: String,
    /// Owning package, empty when unknown
    #[serde(default)]
    pub package_name: String,
}

/// Newest-first log of blocked connections
pub struct ConnectionLogger {
    entries: Mutex<VecDeque<ConnectionLogEntry>>,
    capacity: usize,
    resolver: Arc<dyn IdentityResolver>,
    writer: Arc<SnapshotWriter>,
}

impl ConnectionLogger {
    /// Create a logger keeping at most `capacity` entries, restoring the
    /// persisted log
    pub fn new(
        writer: Arc<SnapshotWriter>,
        resolver: Arc<dyn IdentityResolver>,
        capacity: usize,
    ) -> Self {
        let logger = Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            resolver,
            writer,
        };
        if let Err(e) = logger.reload() {
            warn!(error = %e, "Failed to restore connection log");
        }
        logger
    }

    /// Replace the in-memory log with the persisted one
    pub fn reload(&self) -> Result<()> {
        let stored: Option<VecDeque<ConnectionLogEntry>> =
            self.writer.load(keys::CONNECTION_LOG, keys::LOGS)?;
        let mut entries = self.entries.lock();
        *entries = stored.unwrap_or_default();
        entries.truncate(self.capacity);
        Ok(())
    }

    /// Record a block decision
    pub fn log_blocked(&self, dest: Ipv4Addr, dest_port: u16, uid: Uid, action: &str) {
        let package_name = if is_known(uid) {
            self.resolver.resolve_name(uid).unwrap_or_default()
        } else {
            String::new()
        };
        let entry = ConnectionLogEntry {
            timestamp: now_millis(),
            dest_ip: dest.to_string(),
            dest_port,
            uid,
            action: action.to_string(),
            package_name,
        };
        debug!(dest = %dest, port = dest_port, uid, action, "Blocked connection");

        let mut entries = self.entries.lock();
        entries.push_front(entry);
        entries.truncate(self.capacity);
        self.persist(&entries);
    }

    /// Up to `limit` entries, newest first
    pub fn get_logs(&self, limit: usize) -> Vec<ConnectionLogEntry> {
        self.entries.lock().iter().take(limit).cloned().collect()
    }

    /// Number of entries held
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry
    pub fn clear_logs(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        self.persist(&entries);
    }

    fn persist(&self, entries: &VecDeque<ConnectionLogEntry>) {
        if let Err(e) = self.writer.save(keys::CONNECTION_LOG, keys::LOGS, entries) {
            warn!(error = %e, "Failed to persist connection log");
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
