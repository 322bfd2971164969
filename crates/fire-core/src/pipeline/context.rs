//! Pipeline execution context

/// Statistics for pipeline execution
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Stats {
    /// Total packets processed
    pub packets_processed: u64,
    /// Packets allowed through the filter
    pub packets_allowed: u64,
    /// Packets dropped by an application or IP rule
    pub packets_dropped: u64,
    /// DNS queries answered with a synthesized reply
    pub dns_blocked: u64,
    /// Non-IPv4 packets passed without inspection
    pub passed_through: u64,
    /// IPv4 packets that failed to parse and were passed through
    pub malformed: u64,
}

/// Execution context for the pipeline.
///
/// Owned by the worker driving the pipeline; not shared across threads.
#[derive(Debug, Default)]
pub struct Context {
    /// Processing statistics
    pub stats: Stats,
}

impl Context {
    /// Create a new context
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current statistics
    pub fn get_stats(&self) -> Stats {
        self.stats.clone()
    }

    /// Reset statistics
    pub fn reset_stats(&mut self) {
        self.stats = Stats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats() {
        let mut ctx = Context::new();

        ctx.stats.packets_processed = 100;
        ctx.stats.dns_blocked = 7;

        let stats = ctx.get_stats();
        assert_eq!(stats.packets_processed, 100);
        assert_eq!(stats.dns_blocked, 7);

        ctx.reset_stats();
        assert_eq!(ctx.stats, Stats::default());
    }
}
