//! Service wiring
//!
//! One instance of each stateful component per process, built once at
//! startup and handed out by reference.

use crate::config::{Config, DnsConfig};
use crate::error::Result;
use crate::filter::{Denylist, ListFetcher};
use crate::identity::IdentityResolver;
use crate::intercept::DnsInterceptor;
use crate::logger::ConnectionLogger;
use crate::packet_filter::PacketFilter;
use crate::pipeline::Pipeline;
use crate::rules::RuleStore;
use crate::store::{KeyValueStore, SnapshotWriter};
use crate::usage::UsageTracker;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The firewall's stateful components
pub struct Services {
    /// Snapshot writer shared by every component
    pub writer: Arc<SnapshotWriter>,
    /// Application, domain and IP rules
    pub rules: Arc<RuleStore>,
    /// Blocked domains
    pub denylist: Arc<Denylist>,
    /// Per-packet decision
    pub filter: Arc<PacketFilter>,
    /// Blocked-connection log
    pub logger: Arc<ConnectionLogger>,
    /// Traffic accounting
    pub usage: Arc<UsageTracker>,
    /// Identity resolution
    pub resolver: Arc<dyn IdentityResolver>,
}

impl Services {
    /// Build every component over `store`, restoring persisted state
    pub fn new(
        config: &Config,
        store: Arc<dyn KeyValueStore>,
        resolver: Arc<dyn IdentityResolver>,
        fetcher: Arc<dyn ListFetcher>,
    ) -> Result<Self> {
        let writer = Arc::new(SnapshotWriter::new(
            store,
            config.persistence.queue_capacity,
        )?);

        let rules = Arc::new(RuleStore::new(Arc::clone(&writer)));
        let denylist = Arc::new(Denylist::new(Arc::clone(&writer), fetcher));
        let filter = Arc::new(PacketFilter::new(Arc::clone(&rules), Arc::clone(&resolver)));
        let logger = Arc::new(ConnectionLogger::new(
            Arc::clone(&writer),
            Arc::clone(&resolver),
            config.logging.capacity,
        ));
        let usage = Arc::new(UsageTracker::new(
            Arc::clone(&writer),
            Arc::clone(&resolver),
            config.usage.persist_every,
        ));

        info!(
            app_rules = rules.get_app_rules().len(),
            domain_rules = rules.get_domain_rules().len(),
            ip_rules = rules.get_ip_rules().len(),
            denylist = denylist.count(),
            "Services initialized"
        );

        Ok(Self {
            writer,
            rules,
            denylist,
            filter,
            logger,
            usage,
            resolver,
        })
    }

    /// DNS interceptor over the shared rules and denylist
    pub fn interceptor(&self, dns: &DnsConfig) -> DnsInterceptor {
        DnsInterceptor::new(Arc::clone(&self.rules), Arc::clone(&self.denylist))
            .with_reply_flags(dns.reply_flags)
    }

    /// Pipeline over the shared components
    pub fn pipeline(&self, config: &Config) -> Pipeline {
        Pipeline::new(
            self.interceptor(&config.dns),
            Arc::clone(&self.filter),
            Arc::clone(&self.logger),
            Arc::clone(&self.usage),
            &config.dns,
        )
    }

    /// Rebuild derived state after rules changed
    pub fn rules_changed(&self) -> usize {
        self.filter.reload_rules()
    }

    /// Pick up rules, denylist and log edits written by other processes.
    ///
    /// Pending snapshots of this process are written first so its own edits
    /// are part of what gets read back. Usage counters are not re-read: the
    /// in-memory counters are ahead of the persisted ones. Returns the number
    /// of blocked identities after the filter rebuild.
    pub fn reload(&self) -> Result<usize> {
        self.writer.flush()?;
        self.rules.reload()?;
        self.denylist.reload()?;
        self.logger.reload()?;
        let blocked = self.filter.reload_rules();
        debug!(blocked, denylist = self.denylist.count(), "Reloaded persisted state");
        Ok(blocked)
    }

    /// Start background loads of every configured denylist source
    pub fn load_denylist_sources(&self, sources: &[String]) {
        for source in sources {
            let url = source.clone();
            self.denylist.load_from_url(source, move |result| match result {
                Ok(count) => info!(url = %url, count, "Denylist source loaded"),
                Err(e) => warn!(url = %url, error = %e, "Denylist source failed"),
            });
        }
    }

    /// Write every pending snapshot
    pub fn flush(&self) -> Result<()> {
        self.usage.flush();
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::NullResolver;
    use crate::rules::{ApplicationRule, DomainRule, IpRule};
    use crate::store::{keys, MemoryStore};
    use std::io::BufRead;
    use std::net::Ipv4Addr;

    struct NoFetch;

    impl ListFetcher for NoFetch {
        fn fetch(&self, url: &str) -> Result<Box<dyn BufRead + Send>> {
            Err(crate::Error::fetch(url, "offline"))
        }
    }

    #[test]
    fn test_state_survives_restart() {
        let store = Arc::new(MemoryStore::new());
        let config = Config::default();

        {
            let services =
                Services::new(&config, store.clone(), Arc::new(NullResolver), Arc::new(NoFetch))
                    .unwrap();
            services.rules.add_app_rule(ApplicationRule::blocked("com.example"));
            services.denylist.add_domain("ads.example.com");
            services.usage.track_allowed(3, 100);
            services.flush().unwrap();
        }

        assert!(store.get_string(keys::USAGE, keys::USAGE_STATS).is_some());

        let services =
            Services::new(&config, store, Arc::new(NullResolver), Arc::new(NoFetch)).unwrap();
        assert!(services.rules.get_app_rule("com.example").is_some());
        assert!(services.denylist.is_blocked("x.ads.example.com"));
        assert_eq!(services.usage.get_uid_stats(3).unwrap().bytes_allowed, 100);
    }

    #[test]
    fn test_reload_picks_up_edits_from_another_process() {
        let store = Arc::new(MemoryStore::new());
        let config = Config::default();
        let open = || {
            Services::new(&config, store.clone(), Arc::new(NullResolver), Arc::new(NoFetch))
                .unwrap()
        };

        let running = open();
        running
            .logger
            .log_blocked(Ipv4Addr::new(1, 2, 3, 4), 443, 7, "RULE_BLOCKED");
        running.flush().unwrap();
        assert!(running.filter.decide(Ipv4Addr::new(10, 1, 2, 3), 7).is_none());

        let editor = open();
        editor.rules.add_ip_rule(IpRule::new("10.0.0.0", 8, true).unwrap());
        editor.rules.add_domain_rule(DomainRule::new("ads.example.com", true));
        editor.denylist.add_domain("tracker.net");
        editor.logger.clear_logs();
        editor.flush().unwrap();

        running.reload().unwrap();
        assert!(running.filter.decide(Ipv4Addr::new(10, 1, 2, 3), 7).is_some());
        assert!(running
            .rules
            .find_blocking_domain_rule("cdn.ads.example.com")
            .is_some());
        assert!(running.denylist.is_blocked("pixel.tracker.net"));
        assert!(running.logger.is_empty());
    }

    #[test]
    fn test_reload_keeps_own_pending_edits() {
        let store = Arc::new(MemoryStore::new());
        let services = Services::new(
            &Config::default(),
            store,
            Arc::new(NullResolver),
            Arc::new(NoFetch),
        )
        .unwrap();

        services.denylist.add_domain("ads.example.com");
        services.reload().unwrap();
        assert!(services.denylist.contains("ads.example.com"));
    }
}
