//! Per-application traffic accounting
//!
//! Byte and packet counters for allowed and blocked traffic, keyed by
//! owning identity. Blocked events persist immediately; allowed events
//! persist every `persist_every` packets to keep disk I/O off the hot path.

use crate::error::Result;
use crate::identity::{is_known, IdentityResolver, Uid};
use crate::store::{keys, SnapshotWriter};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Default number of allowed packets between snapshots
pub const DEFAULT_PERSIST_EVERY: u64 = 100;

/// Counters of one identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageStats {
    /// Bytes let through
    pub bytes_allowed: u64,
    /// Bytes dropped or answered locally
    pub bytes_blocked: u64,
    /// Packets let through
    pub packets_allowed: u64,
    /// Packets dropped or answered locally
    pub packets_blocked: u64,
}

impl UsageStats {
    /// Allowed plus blocked bytes
    pub fn total_bytes(&self) -> u64 {
        self.bytes_allowed + self.bytes_blocked
    }

    /// Allowed plus blocked packets
    pub fn total_packets(&self) -> u64 {
        self.packets_allowed + self.packets_blocked
    }

    fn merge(&mut self, other: &UsageStats) {
        self.bytes_allowed += other.bytes_allowed;
        self.bytes_blocked += other.bytes_blocked;
        self.packets_allowed += other.packets_allowed;
        self.packets_blocked += other.packets_blocked;
    }
}

/// Point-in-time view of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    /// Sum over every identity
    pub totals: UsageStats,
    /// Counters per resolved package; identities sharing a package merge
    pub by_app: BTreeMap<String, UsageStats>,
    /// Identities that did not resolve, summed
    pub unattributed: UsageStats,
}

struct State {
    stats: BTreeMap<Uid, UsageStats>,
    unsaved_allowed: u64,
}

/// Counts allowed and blocked traffic per identity
pub struct UsageTracker {
    state: Mutex<State>,
    persist_every: u64,
    resolver: Arc<dyn IdentityResolver>,
    writer: Arc<SnapshotWriter>,
}

impl UsageTracker {
    /// Create a tracker, restoring persisted counters
    pub fn new(
        writer: Arc<SnapshotWriter>,
        resolver: Arc<dyn IdentityResolver>,
        persist_every: u64,
    ) -> Self {
        let tracker = Self {
            state: Mutex::new(State {
                stats: BTreeMap::new(),
                unsaved_allowed: 0,
            }),
            persist_every: persist_every.max(1),
            resolver,
            writer,
        };
        if let Err(e) = tracker.reload() {
            warn!(error = %e, "Failed to restore usage stats");
        }
        tracker
    }

    /// Replace the in-memory counters with the persisted ones
    pub fn reload(&self) -> Result<()> {
        let stored: Option<BTreeMap<Uid, UsageStats>> =
            self.writer.load(keys::USAGE, keys::USAGE_STATS)?;
        let mut state = self.state.lock();
        state.stats = stored.unwrap_or_default();
        state.unsaved_allowed = 0;
        Ok(())
    }

    /// Count an allowed packet of `bytes` bytes
    pub fn track_allowed(&self, uid: Uid, bytes: u64) {
        if !is_known(uid) {
            return;
        }
        let mut state = self.state.lock();
        let entry = state.stats.entry(uid).or_default();
        entry.bytes_allowed += bytes;
        entry.packets_allowed += 1;

        state.unsaved_allowed += 1;
        if state.unsaved_allowed >= self.persist_every {
            self.persist(&mut state);
        }
    }

    /// Count a blocked packet of `bytes` bytes
    pub fn track_blocked(&self, uid: Uid, bytes: u64) {
        if !is_known(uid) {
            return;
        }
        let mut state = self.state.lock();
        let entry = state.stats.entry(uid).or_default();
        entry.bytes_blocked += bytes;
        entry.packets_blocked += 1;
        self.persist(&mut state);
    }

    /// Counters of one identity
    pub fn get_uid_stats(&self, uid: Uid) -> Option<UsageStats> {
        self.state.lock().stats.get(&uid).copied()
    }

    /// Totals and per-application breakdown from one consistent snapshot
    pub fn get_usage_stats(&self) -> UsageReport {
        let snapshot = self.state.lock().stats.clone();

        let mut report = UsageReport::default();
        for (uid, stats) in &snapshot {
            report.totals.merge(stats);
            match self.resolver.resolve_name(*uid) {
                Some(name) => report.by_app.entry(name).or_default().merge(stats),
                None => report.unattributed.merge(stats),
            }
        }
        report
    }

    /// Zero every counter
    pub fn reset_stats(&self) {
        let mut state = self.state.lock();
        state.stats.clear();
        self.persist(&mut state);
    }

    /// Persist counters not yet written because of throttling
    pub fn flush(&self) {
        let mut state = self.state.lock();
        if state.unsaved_allowed > 0 {
            self.persist(&mut state);
        }
    }

    fn persist(&self, state: &mut State) {
        state.unsaved_allowed = 0;
        if let Err(e) = self.writer.save(keys::USAGE, keys::USAGE_STATS, &state.stats) {
            warn!(error = %e, "Failed to persist usage stats");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{MockIdentityResolver, NullResolver, UNKNOWN_UID};
    use crate::store::MemoryStore;

    fn tracker(persist_every: u64) -> (Arc<MemoryStore>, Arc<SnapshotWriter>, UsageTracker) {
        let store = Arc::new(MemoryStore::new());
        let writer = Arc::new(SnapshotWriter::new(store.clone(), 8).unwrap());
        let tracker = UsageTracker::new(writer.clone(), Arc::new(NullResolver), persist_every);
        (store, writer, tracker)
    }

    #[test]
    fn test_counters() {
        let (_, _, tracker) = tracker(100);
        tracker.track_allowed(10_001, 100);
        tracker.track_allowed(10_001, 50);
        tracker.track_blocked(10_001, 40);

        let stats = tracker.get_uid_stats(10_001).unwrap();
        assert_eq!(stats.bytes_allowed, 150);
        assert_eq!(stats.packets_allowed, 2);
        assert_eq!(stats.bytes_blocked, 40);
        assert_eq!(stats.packets_blocked, 1);
        assert_eq!(stats.total_bytes(), 190);
        assert_eq!(stats.total_packets(), 3);
    }

    #[test]
    fn test_unknown_identity_ignored() {
        let (_, _, tracker) = tracker(100);
        tracker.track_allowed(UNKNOWN_UID, 100);
        tracker.track_blocked(-7, 100);
        assert_eq!(tracker.get_usage_stats().totals, UsageStats::default());
    }

    #[test]
    fn test_allowed_persistence_throttled() {
        let (store, writer, tracker) = tracker(10);
        for _ in 0..9 {
            tracker.track_allowed(1, 10);
        }
        writer.flush().unwrap();
        assert_eq!(store.get_string(keys::USAGE, keys::USAGE_STATS), None);

        tracker.track_allowed(1, 10);
        writer.flush().unwrap();
        let json = store.get_string(keys::USAGE, keys::USAGE_STATS).unwrap();
        assert!(json.contains(r#""1":{"bytesAllowed":100"#));
    }

    #[test]
    fn test_blocked_persists_immediately() {
        let (store, writer, tracker) = tracker(1000);
        tracker.track_blocked(3, 64);
        writer.flush().unwrap();
        assert_eq!(
            store.get_string(keys::USAGE, keys::USAGE_STATS).as_deref(),
            Some(r#"{"3":{"bytesAllowed":0,"bytesBlocked":64,"packetsAllowed":0,"packetsBlocked":1}}"#)
        );
    }

    #[test]
    fn test_flush_writes_pending_allowed() {
        let (_, writer, tracker) = tracker(1000);
        tracker.track_allowed(5, 10);
        tracker.flush();

        let restored = UsageTracker::new(writer, Arc::new(NullResolver), 1000);
        assert_eq!(restored.get_uid_stats(5).unwrap().bytes_allowed, 10);
    }

    #[test]
    fn test_report_groups_by_app() {
        let mut resolver = MockIdentityResolver::new();
        resolver.expect_resolve_name().returning(|uid| match uid {
            1 | 2 => Some("com.shared".to_string()),
            3 => Some("com.other".to_string()),
            _ => None,
        });
        let writer = Arc::new(SnapshotWriter::new(Arc::new(MemoryStore::new()), 8).unwrap());
        let tracker = UsageTracker::new(writer, Arc::new(resolver), 100);

        tracker.track_allowed(1, 10);
        tracker.track_allowed(2, 20);
        tracker.track_blocked(3, 5);
        tracker.track_allowed(4, 7);

        let report = tracker.get_usage_stats();
        assert_eq!(report.by_app["com.shared"].bytes_allowed, 30);
        assert_eq!(report.by_app["com.other"].bytes_blocked, 5);
        assert_eq!(report.unattributed.bytes_allowed, 7);
        assert_eq!(report.totals.total_bytes(), 42);
    }

    #[test]
    fn test_reset() {
        let (_, _, tracker) = tracker(100);
        tracker.track_blocked(1, 10);
        tracker.reset_stats();
        assert!(tracker.get_uid_stats(1).is_none());
        assert_eq!(tracker.get_usage_stats(), UsageReport::default());
    }
}
