//! Per-packet admit/deny decision
//!
//! Blocked applications are checked first, by numeric identity. Everything
//! else is matched against the IP rules, first blocking rule wins.

use crate::identity::{is_known, IdentityResolver, Uid};
use crate::packet::Packet;
use crate::rules::{IpRule, RuleStore, Transport};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Why a packet was blocked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// The owning application is blocked
    Application(Uid),
    /// The destination matched this rule
    IpRule(IpRule),
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Application(uid) => write!(f, "application {uid}"),
            BlockReason::IpRule(rule) => write!(f, "ip rule {rule}"),
        }
    }
}

/// Decides whether outgoing packets may leave the device
pub struct PacketFilter {
    rules: Arc<RuleStore>,
    resolver: Arc<dyn IdentityResolver>,
    blocked_uids: RwLock<HashSet<Uid>>,
    transport: RwLock<Option<Transport>>,
}

impl PacketFilter {
    /// Create a filter and build the blocked-identity set
    pub fn new(rules: Arc<RuleStore>, resolver: Arc<dyn IdentityResolver>) -> Self {
        let filter = Self {
            rules,
            resolver,
            blocked_uids: RwLock::new(HashSet::new()),
            transport: RwLock::new(None),
        };
        filter.reload_rules();
        filter
    }

    /// Rebuild the blocked-identity set from the current application rules.
    ///
    /// Packages that do not resolve are skipped. Returns the set's size.
    pub fn reload_rules(&self) -> usize {
        let transport = *self.transport.read();
        let mut uids = HashSet::new();

        for rule in self.rules.get_app_rules() {
            let blocked = match transport {
                Some(transport) => rule.should_block(transport),
                None => rule.is_blocked(),
            };
            if !blocked {
                continue;
            }
            match self.resolver.resolve_uid(&rule.package_name) {
                Some(uid) => {
                    uids.insert(uid);
                }
                None => warn!(package = %rule.package_name, "Cannot resolve blocked application"),
            }
        }

        let count = uids.len();
        *self.blocked_uids.write() = uids;
        debug!(count, ?transport, "Blocked identities rebuilt");
        count
    }

    /// Select per-transport blocking, or `None` to block on either flag
    pub fn set_transport(&self, transport: Option<Transport>) {
        *self.transport.write() = transport;
        self.reload_rules();
    }

    /// Current transport
    pub fn transport(&self) -> Option<Transport> {
        *self.transport.read()
    }

    /// Blocked identities, sorted
    pub fn blocked_uids(&self) -> Vec<Uid> {
        let mut uids: Vec<Uid> = self.blocked_uids.read().iter().copied().collect();
        uids.sort_unstable();
        uids
    }

    /// Whether `packet`, sent by `owner`, must be dropped
    pub fn should_block(&self, packet: &Packet, owner: Uid) -> bool {
        self.decide(packet.dst_addr, owner).is_some()
    }

    /// Block decision with its reason
    pub fn decide(&self, dst: Ipv4Addr, owner: Uid) -> Option<BlockReason> {
        if is_known(owner) && self.blocked_uids.read().contains(&owner) {
            return Some(BlockReason::Application(owner));
        }
        self.rules
            .find_blocking_ip_rule(dst)
            .map(BlockReason::IpRule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{MockIdentityResolver, UNKNOWN_UID};
    use crate::packet::DnsQueryBuilder;
    use crate::rules::ApplicationRule;
    use crate::store::{MemoryStore, SnapshotWriter};
    use mockall::predicate::eq;

    fn rules() -> Arc<RuleStore> {
        let writer = Arc::new(SnapshotWriter::new(Arc::new(MemoryStore::new()), 8).unwrap());
        Arc::new(RuleStore::new(writer))
    }

    fn resolver() -> MockIdentityResolver {
        let mut resolver = MockIdentityResolver::new();
        resolver
            .expect_resolve_uid()
            .with(eq("com.blocked"))
            .returning(|_| Some(10_001));
        resolver
            .expect_resolve_uid()
            .with(eq("com.wifi"))
            .returning(|_| Some(10_002));
        resolver.expect_resolve_uid().returning(|_| None);
        resolver
    }

    #[test]
    fn test_blocked_application() {
        let rules = rules();
        rules.add_app_rule(ApplicationRule::blocked("com.blocked"));
        let filter = PacketFilter::new(rules, Arc::new(resolver()));

        let packet = Packet::from_bytes(&DnsQueryBuilder::new("a.com").build()).unwrap();
        assert!(filter.should_block(&packet, 10_001));
        assert!(!filter.should_block(&packet, 10_003));
        assert!(!filter.should_block(&packet, UNKNOWN_UID));
    }

    #[test]
    fn test_unresolvable_package_is_inert() {
        let rules = rules();
        rules.add_app_rule(ApplicationRule::blocked("com.unknown"));
        rules.add_app_rule(ApplicationRule::blocked("com.blocked"));
        let filter = PacketFilter::new(rules, Arc::new(resolver()));
        assert_eq!(filter.blocked_uids(), vec![10_001]);
    }

    #[test]
    fn test_ip_rule_block() {
        let rules = rules();
        rules.add_ip_rule(IpRule::new("192.168.1.0", 24, true).unwrap());
        let filter = PacketFilter::new(rules, Arc::new(resolver()));

        assert!(matches!(
            filter.decide(Ipv4Addr::new(192, 168, 1, 55), UNKNOWN_UID),
            Some(BlockReason::IpRule(_))
        ));
        assert!(filter.decide(Ipv4Addr::new(192, 168, 2, 1), 10_005).is_none());
    }

    #[test]
    fn test_application_checked_first() {
        let rules = rules();
        rules.add_app_rule(ApplicationRule::blocked("com.blocked"));
        rules.add_ip_rule(IpRule::new("0.0.0.0", 0, true).unwrap());
        let filter = PacketFilter::new(rules, Arc::new(resolver()));

        assert_eq!(
            filter.decide(Ipv4Addr::new(1, 1, 1, 1), 10_001),
            Some(BlockReason::Application(10_001))
        );
    }

    #[test]
    fn test_reload_picks_up_rule_changes() {
        let rules = rules();
        let filter = PacketFilter::new(rules.clone(), Arc::new(resolver()));
        assert!(filter.blocked_uids().is_empty());

        rules.add_app_rule(ApplicationRule::blocked("com.blocked"));
        assert!(filter.decide(Ipv4Addr::new(1, 1, 1, 1), 10_001).is_none());

        assert_eq!(filter.reload_rules(), 1);
        assert_eq!(filter.reload_rules(), 1);
        assert!(filter.decide(Ipv4Addr::new(1, 1, 1, 1), 10_001).is_some());
    }

    #[test]
    fn test_transport_selects_flag() {
        let rules = rules();
        rules.add_app_rule(ApplicationRule::new("com.wifi", true, false));
        let filter = PacketFilter::new(rules, Arc::new(resolver()));
        assert_eq!(filter.blocked_uids(), vec![10_002]);

        filter.set_transport(Some(Transport::Mobile));
        assert!(filter.blocked_uids().is_empty());

        filter.set_transport(Some(Transport::Wifi));
        assert_eq!(filter.blocked_uids(), vec![10_002]);
        assert_eq!(filter.transport(), Some(Transport::Wifi));
    }
}
