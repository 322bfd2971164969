//! Rule storage
//!
//! Three independently locked collections: application rules (one per
//! package), domain rules (one per lowercase pattern) and IP rules (any
//! number, evaluated in insertion order). Every mutation queues a full
//! snapshot of the touched collection.

mod model;

pub use model::{prefix_mask, ApplicationRule, DomainRule, IpNetwork, IpRule, Transport};

use crate::error::Result;
use crate::filter::matcher;
use crate::store::{keys, SnapshotWriter};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Application, domain and IP rules with write-through persistence
pub struct RuleStore {
    app_rules: RwLock<Vec<ApplicationRule>>,
    domain_rules: RwLock<Vec<DomainRule>>,
    ip_rules: RwLock<IpRuleSet>,
    writer: Arc<SnapshotWriter>,
}

/// IP rules plus the compiled ranges of the blocking ones
#[derive(Default)]
struct IpRuleSet {
    rules: Vec<IpRule>,
    /// (range, index into `rules`), in evaluation order
    blocking: Vec<(IpNetwork, usize)>,
}

impl IpRuleSet {
    fn new(rules: Vec<IpRule>) -> Self {
        let mut set = Self {
            rules,
            blocking: Vec::new(),
        };
        set.reindex();
        set
    }

    fn reindex(&mut self) {
        self.blocking = self
            .rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.blocked)
            .filter_map(|(index, rule)| rule.compile().map(|network| (network, index)))
            .collect();
    }
}

impl RuleStore {
    /// Create a store, restoring persisted rules
    pub fn new(writer: Arc<SnapshotWriter>) -> Self {
        let store = Self {
            app_rules: RwLock::new(Vec::new()),
            domain_rules: RwLock::new(Vec::new()),
            ip_rules: RwLock::new(IpRuleSet::default()),
            writer,
        };
        if let Err(e) = store.reload() {
            warn!(error = %e, "Failed to restore rules");
        }
        store
    }

    /// Re-read all three collections from persistence.
    ///
    /// Entries that no longer deserialize are skipped.
    pub fn reload(&self) -> Result<()> {
        let apps = self.load_collection::<ApplicationRule>(keys::APP_RULES)?;
        let domains = self.load_collection::<DomainRule>(keys::DOMAIN_RULES)?;
        let ips = self.load_collection::<IpRule>(keys::IP_RULES)?;
        debug!(
            apps = apps.len(),
            domains = domains.len(),
            ips = ips.len(),
            "Rules restored"
        );

        *self.app_rules.write() = apps;
        *self.domain_rules.write() = domains;
        *self.ip_rules.write() = IpRuleSet::new(ips);
        Ok(())
    }

    fn load_collection<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let raw: Vec<serde_json::Value> = self.writer.load(keys::RULES, key)?.unwrap_or_default();
        Ok(raw
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!(key, error = %e, "Skipping unreadable rule");
                    None
                }
            })
            .collect())
    }

    fn persist<T: Serialize>(&self, key: &str, rules: &[T]) {
        if let Err(e) = self.writer.save(keys::RULES, key, rules) {
            warn!(key, error = %e, "Failed to persist rules");
        }
    }

    // ==================== Application rules ====================

    /// Add or replace the rule for `rule.package_name`
    pub fn add_app_rule(&self, rule: ApplicationRule) {
        let mut rules = self.app_rules.write();
        match rules.iter_mut().find(|r| r.package_name == rule.package_name) {
            Some(existing) => *existing = rule,
            None => rules.push(rule),
        }
        self.persist(keys::APP_RULES, rules.as_slice());
    }

    /// Remove the rule for `package`, returning whether one existed
    pub fn remove_app_rule(&self, package: &str) -> bool {
        let mut rules = self.app_rules.write();
        let before = rules.len();
        rules.retain(|r| r.package_name != package);
        let removed = rules.len() != before;
        self.persist(keys::APP_RULES, rules.as_slice());
        removed
    }

    /// Rule for `package`
    pub fn get_app_rule(&self, package: &str) -> Option<ApplicationRule> {
        self.app_rules
            .read()
            .iter()
            .find(|r| r.package_name == package)
            .cloned()
    }

    /// All application rules
    pub fn get_app_rules(&self) -> Vec<ApplicationRule> {
        self.app_rules.read().clone()
    }

    /// Replace every application rule with "blocked everywhere" rules for
    /// `packages`
    pub fn set_blocked_apps<I, S>(&self, packages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rules = self.app_rules.write();
        rules.clear();
        for package in packages {
            let rule = ApplicationRule::blocked(package);
            match rules.iter_mut().find(|r| r.package_name == rule.package_name) {
                Some(existing) => *existing = rule,
                None => rules.push(rule),
            }
        }
        self.persist(keys::APP_RULES, rules.as_slice());
    }

    /// Drop every application rule
    pub fn clear_app_rules(&self) {
        let mut rules = self.app_rules.write();
        rules.clear();
        self.persist(keys::APP_RULES, rules.as_slice());
    }

    // ==================== Domain rules ====================

    /// Add or replace the rule for the rule's lowercase pattern
    pub fn add_domain_rule(&self, rule: DomainRule) {
        let rule = DomainRule::new(&rule.domain, rule.blocked);
        let mut rules = self.domain_rules.write();
        match rules.iter_mut().find(|r| r.domain == rule.domain) {
            Some(existing) => *existing = rule,
            None => rules.push(rule),
        }
        self.persist(keys::DOMAIN_RULES, rules.as_slice());
    }

    /// Remove the rule for `domain`, returning whether one existed
    pub fn remove_domain_rule(&self, domain: &str) -> bool {
        let domain = domain.trim().to_lowercase();
        let mut rules = self.domain_rules.write();
        let before = rules.len();
        rules.retain(|r| r.domain != domain);
        let removed = rules.len() != before;
        self.persist(keys::DOMAIN_RULES, rules.as_slice());
        removed
    }

    /// All domain rules
    pub fn get_domain_rules(&self) -> Vec<DomainRule> {
        self.domain_rules.read().clone()
    }

    /// First blocking domain rule whose pattern matches `domain`
    pub fn find_blocking_domain_rule(&self, domain: &str) -> Option<DomainRule> {
        self.domain_rules
            .read()
            .iter()
            .find(|r| r.blocked && matcher::matches(domain, &r.domain))
            .cloned()
    }

    // ==================== IP rules ====================

    /// Append an IP rule
    pub fn add_ip_rule(&self, rule: IpRule) {
        let mut set = self.ip_rules.write();
        set.rules.push(rule);
        set.reindex();
        self.persist(keys::IP_RULES, set.rules.as_slice());
    }

    /// Remove every rule for `ip`, returning how many were removed
    pub fn remove_ip_rule(&self, ip: &str) -> usize {
        let ip = ip.trim();
        let mut set = self.ip_rules.write();
        let before = set.rules.len();
        set.rules.retain(|r| r.ip != ip);
        let removed = before - set.rules.len();
        set.reindex();
        self.persist(keys::IP_RULES, set.rules.as_slice());
        removed
    }

    /// All IP rules, in evaluation order
    pub fn get_ip_rules(&self) -> Vec<IpRule> {
        self.ip_rules.read().rules.clone()
    }

    /// First blocking IP rule covering `addr`
    pub fn find_blocking_ip_rule(&self, addr: Ipv4Addr) -> Option<IpRule> {
        let set = self.ip_rules.read();
        set.blocking
            .iter()
            .find(|(network, _)| network.contains(addr))
            .map(|&(_, index)| set.rules[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyValueStore, MemoryStore};

    fn store() -> (Arc<MemoryStore>, Arc<SnapshotWriter>, RuleStore) {
        let memory = Arc::new(MemoryStore::new());
        let writer = Arc::new(SnapshotWriter::new(memory.clone(), 8).unwrap());
        let rules = RuleStore::new(writer.clone());
        (memory, writer, rules)
    }

    #[test]
    fn test_app_rule_replaces() {
        let (_, _, rules) = store();
        rules.add_app_rule(ApplicationRule::new("com.example", true, false));
        rules.add_app_rule(ApplicationRule::new("com.example", false, true));

        let all = rules.get_app_rules();
        assert_eq!(all.len(), 1);
        assert!(all[0].block_mobile);
        assert!(!all[0].block_wifi);
    }

    #[test]
    fn test_remove_app_rule() {
        let (_, _, rules) = store();
        rules.add_app_rule(ApplicationRule::blocked("com.a"));
        assert!(rules.remove_app_rule("com.a"));
        assert!(!rules.remove_app_rule("com.a"));
        assert!(rules.get_app_rule("com.a").is_none());
    }

    #[test]
    fn test_set_blocked_apps_replaces_all() {
        let (_, _, rules) = store();
        rules.add_app_rule(ApplicationRule::new("com.old", true, false));
        rules.set_blocked_apps(["com.a", "com.b", "com.a"]);

        let all = rules.get_app_rules();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|r| r.block_wifi && r.block_mobile));
        assert!(rules.get_app_rule("com.old").is_none());

        rules.clear_app_rules();
        assert!(rules.get_app_rules().is_empty());
    }

    #[test]
    fn test_domain_rule_idempotent() {
        let (_, _, rules) = store();
        rules.add_domain_rule(DomainRule::new("Ads.Example.com", true));
        rules.add_domain_rule(DomainRule::new("ads.example.com", false));

        let all = rules.get_domain_rules();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].domain, "ads.example.com");
        assert!(!all[0].blocked);
    }

    #[test]
    fn test_find_blocking_domain_rule() {
        let (_, _, rules) = store();
        rules.add_domain_rule(DomainRule::new("allowed.com", false));
        rules.add_domain_rule(DomainRule::new("*.tracker.net", true));

        assert!(rules.find_blocking_domain_rule("allowed.com").is_none());
        let hit = rules.find_blocking_domain_rule("cdn.tracker.net").unwrap();
        assert_eq!(hit.domain, "*.tracker.net");
        assert!(rules.remove_domain_rule("*.TRACKER.net"));
        assert!(rules.find_blocking_domain_rule("cdn.tracker.net").is_none());
    }

    #[test]
    fn test_ip_rules_append_and_remove_all() {
        let (_, _, rules) = store();
        rules.add_ip_rule(IpRule::new("10.0.0.0", 8, true).unwrap());
        rules.add_ip_rule(IpRule::new("10.0.0.0", 16, false).unwrap());
        rules.add_ip_rule(IpRule::host(Ipv4Addr::new(1, 1, 1, 1), true));
        assert_eq!(rules.get_ip_rules().len(), 3);

        assert_eq!(rules.remove_ip_rule("10.0.0.0"), 2);
        assert_eq!(rules.get_ip_rules().len(), 1);
    }

    #[test]
    fn test_find_blocking_ip_rule_skips_allow_rules() {
        let (_, _, rules) = store();
        rules.add_ip_rule(IpRule::new("192.168.1.0", 24, false).unwrap());
        rules.add_ip_rule(IpRule::new("192.168.0.0", 16, true).unwrap());

        let hit = rules.find_blocking_ip_rule(Ipv4Addr::new(192, 168, 1, 5)).unwrap();
        assert_eq!(hit.prefix_length, 16);
        assert!(rules.find_blocking_ip_rule(Ipv4Addr::new(10, 0, 0, 1)).is_none());
    }

    #[test]
    fn test_blocking_ranges_follow_changes() {
        let memory = Arc::new(MemoryStore::new());
        memory
            .put(
                keys::RULES,
                keys::IP_RULES,
                br#"[{"ip":"bogus","prefixLength":0,"blocked":true},{"ip":"172.16.0.0","prefixLength":12,"blocked":true}]"#,
            )
            .unwrap();
        let writer = Arc::new(SnapshotWriter::new(memory, 8).unwrap());
        let rules = RuleStore::new(writer);

        // The unparseable rule is kept but never matches
        assert_eq!(rules.get_ip_rules().len(), 2);
        assert!(rules.find_blocking_ip_rule(Ipv4Addr::new(8, 8, 8, 8)).is_none());
        let hit = rules.find_blocking_ip_rule(Ipv4Addr::new(172, 20, 0, 1)).unwrap();
        assert_eq!(hit.ip, "172.16.0.0");

        rules.add_ip_rule(IpRule::host(Ipv4Addr::new(8, 8, 8, 8), true));
        assert!(rules.find_blocking_ip_rule(Ipv4Addr::new(8, 8, 8, 8)).is_some());

        rules.remove_ip_rule("172.16.0.0");
        assert!(rules.find_blocking_ip_rule(Ipv4Addr::new(172, 20, 0, 1)).is_none());
        assert_eq!(
            rules.find_blocking_ip_rule(Ipv4Addr::new(8, 8, 8, 8)).unwrap().prefix_length,
            32
        );
    }

    #[test]
    fn test_rules_persist_and_reload() {
        let (memory, writer, rules) = store();
        rules.add_app_rule(ApplicationRule::blocked("com.example"));
        rules.add_domain_rule(DomainRule::new("ads.com", true));
        rules.add_ip_rule(IpRule::new("192.168.1.0", 24, true).unwrap());
        writer.flush().unwrap();

        assert_eq!(
            memory.get_string(keys::RULES, keys::IP_RULES).as_deref(),
            Some(r#"[{"ip":"192.168.1.0","prefixLength":24,"blocked":true}]"#)
        );

        let restored = RuleStore::new(writer);
        assert_eq!(restored.get_app_rules(), rules.get_app_rules());
        assert_eq!(restored.get_domain_rules(), rules.get_domain_rules());
        assert_eq!(restored.get_ip_rules(), rules.get_ip_rules());
    }

    #[test]
    fn test_reload_skips_bad_entries() {
        let memory = Arc::new(MemoryStore::new());
        memory
            .put(
                keys::RULES,
                keys::DOMAIN_RULES,
                br#"[{"domain":"ok.com","blocked":true},{"domain":5},{"blocked":true}]"#,
            )
            .unwrap();
        let writer = Arc::new(SnapshotWriter::new(memory, 8).unwrap());
        let rules = RuleStore::new(writer);

        let all = rules.get_domain_rules();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].domain, "ok.com");
    }
}
