//! DNS query interception
//!
//! Vetoes lookups of blocked names by answering them locally with NXDOMAIN.
//! Anything the interceptor cannot fully parse passes through untouched.

use crate::filter::Denylist;
use crate::packet::dns::{parse_qname, DnsHeader};
use crate::packet::{offsets, ReplyBuilder};
use crate::rules::RuleStore;
use bytes::BytesMut;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// What caused a lookup to be blocked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockSource {
    /// A blocking domain rule with this pattern
    Rule(String),
    /// The denylist
    Denylist,
}

impl fmt::Display for BlockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockSource::Rule(pattern) => write!(f, "rule {pattern}"),
            BlockSource::Denylist => write!(f, "denylist"),
        }
    }
}

/// A blocked lookup and the reply answering it
#[derive(Debug, Clone)]
pub struct BlockedQuery {
    /// Queried name, lowercase
    pub domain: String,
    /// Why it was blocked
    pub source: BlockSource,
    /// Synthesized reply, ready to write back to the tunnel
    pub reply: BytesMut,
}

/// Inspects outgoing DNS queries against domain rules and the denylist
pub struct DnsInterceptor {
    rules: Arc<RuleStore>,
    denylist: Arc<Denylist>,
    reply: ReplyBuilder,
}

impl DnsInterceptor {
    /// Create an interceptor answering with NXDOMAIN
    pub fn new(rules: Arc<RuleStore>, denylist: Arc<Denylist>) -> Self {
        Self {
            rules,
            denylist,
            reply: ReplyBuilder::nxdomain(),
        }
    }

    /// Use a different flags word in synthesized replies
    pub fn with_reply_flags(mut self, flags: u16) -> Self {
        self.reply = ReplyBuilder::with_flags(flags);
        self
    }

    /// Inspect a raw IPv4/UDP datagram.
    ///
    /// Returns the reply to send back when the queried name is blocked,
    /// `None` when there is no decision to make.
    pub fn process(&self, raw: &[u8]) -> Option<BlockedQuery> {
        let domain = query_name(raw)?;
        let source = self.decide(&domain)?;
        debug!(domain = %domain, source = %source, "Blocking DNS query");

        Some(BlockedQuery {
            reply: self.reply.build(raw),
            domain,
            source,
        })
    }

    /// Block decision for a name. Domain rules take precedence over the
    /// denylist.
    pub fn decide(&self, domain: &str) -> Option<BlockSource> {
        if let Some(rule) = self.rules.find_blocking_domain_rule(domain) {
            return Some(BlockSource::Rule(rule.domain));
        }
        if self.denylist.is_blocked(domain) {
            return Some(BlockSource::Denylist);
        }
        None
    }
}

/// Name in the first question of a DNS query datagram.
///
/// Requires an option-less IPv4 header, a full DNS header and at least one
/// question.
pub fn query_name(raw: &[u8]) -> Option<String> {
    if raw.len() < offsets::DNS + offsets::DNS_HEADER_LEN {
        return None;
    }
    if usize::from(raw[0] & 0x0F) * 4 != offsets::IPV4_HEADER_LEN {
        return None;
    }

    let header = DnsHeader::from_datagram(raw).ok()?;
    if header.qdcount < 1 {
        return None;
    }

    parse_qname(raw, offsets::DNS_QUESTION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ListFetcher;
    use crate::packet::DnsQueryBuilder;
    use crate::rules::DomainRule;
    use crate::store::{MemoryStore, SnapshotWriter};
    use std::io::BufRead;

    struct NoFetch;

    impl ListFetcher for NoFetch {
        fn fetch(&self, url: &str) -> crate::Result<Box<dyn BufRead + Send>> {
            Err(crate::Error::fetch(url, "offline"))
        }
    }

    fn interceptor() -> (Arc<RuleStore>, Arc<Denylist>, DnsInterceptor) {
        let writer = Arc::new(SnapshotWriter::new(Arc::new(MemoryStore::new()), 8).unwrap());
        let rules = Arc::new(RuleStore::new(writer.clone()));
        let denylist = Arc::new(Denylist::new(writer, Arc::new(NoFetch)));
        let interceptor = DnsInterceptor::new(rules.clone(), denylist.clone());
        (rules, denylist, interceptor)
    }

    #[test]
    fn test_query_name() {
        let packet = DnsQueryBuilder::new("WWW.Example.com").build();
        assert_eq!(query_name(&packet).as_deref(), Some("www.example.com"));
    }

    #[test]
    fn test_short_packet_no_decision() {
        let packet = DnsQueryBuilder::new("ads.example.com").build();
        assert_eq!(query_name(&packet[..39]), None);
    }

    #[test]
    fn test_zero_questions_no_decision() {
        let mut packet = DnsQueryBuilder::new("ads.example.com").build();
        packet[32] = 0;
        packet[33] = 0;
        assert_eq!(query_name(&packet), None);
    }

    #[test]
    fn test_ip_options_no_decision() {
        let mut packet = DnsQueryBuilder::new("ads.example.com").build();
        packet[0] = 0x46;
        assert_eq!(query_name(&packet), None);
    }

    #[test]
    fn test_rule_block() {
        let (rules, _, interceptor) = interceptor();
        rules.add_domain_rule(DomainRule::new("*.example.com", true));

        let request = DnsQueryBuilder::new("ads.example.com").build();
        let blocked = interceptor.process(&request).unwrap();
        assert_eq!(blocked.domain, "ads.example.com");
        assert_eq!(blocked.source, BlockSource::Rule("*.example.com".into()));
        assert_eq!(&blocked.reply[30..32], &[0x81, 0x83]);
    }

    #[test]
    fn test_denylist_block() {
        let (_, denylist, interceptor) = interceptor();
        denylist.add_domain("tracker.net");

        let request = DnsQueryBuilder::new("cdn.tracker.net").build();
        let blocked = interceptor.process(&request).unwrap();
        assert_eq!(blocked.source, BlockSource::Denylist);
    }

    #[test]
    fn test_rule_precedes_denylist() {
        let (rules, denylist, interceptor) = interceptor();
        denylist.add_domain("ads.com");
        rules.add_domain_rule(DomainRule::new("ads.com", true));
        assert_eq!(
            interceptor.decide("ads.com"),
            Some(BlockSource::Rule("ads.com".into()))
        );
    }

    #[test]
    fn test_allow_rule_falls_back_to_denylist() {
        let (rules, denylist, interceptor) = interceptor();
        rules.add_domain_rule(DomainRule::new("ads.com", false));
        assert_eq!(interceptor.decide("ads.com"), None);

        denylist.add_domain("ads.com");
        assert_eq!(interceptor.decide("ads.com"), Some(BlockSource::Denylist));
    }

    #[test]
    fn test_unblocked_query_untouched() {
        let (_, _, interceptor) = interceptor();
        let request = DnsQueryBuilder::new("example.org").build();
        assert!(interceptor.process(&request).is_none());
    }

    #[test]
    fn test_custom_reply_flags() {
        let (_, denylist, interceptor) = interceptor();
        let interceptor = interceptor.with_reply_flags(0x8185);
        denylist.add_domain("ads.com");

        let request = DnsQueryBuilder::new("ads.com").build();
        let blocked = interceptor.process(&request).unwrap();
        assert_eq!(&blocked.reply[30..32], &[0x81, 0x85]);
    }
}
