//! Property tests for domain matching and CIDR rules

use fire_core::filter::{matches, matches_any, parse_hosts_line};
use fire_core::rules::{prefix_mask, IpRule};
use proptest::prelude::*;
use std::net::Ipv4Addr;

fn label() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,12}"
}

fn domain() -> impl Strategy<Value = String> {
    prop::collection::vec(label(), 1..5).prop_map(|labels| labels.join("."))
}

// ============ Domain Matcher Properties ============

#[test]
fn test_matcher_examples() {
    assert!(matches("a.b.c", "*.b.c"));
    assert!(matches("b.c", "*.b.c"));
    assert!(matches("x.b.c", "b.c"));
    assert!(!matches("bc", "b.c"));
}

proptest! {
    #[test]
    fn prop_matches_is_reflexive(d in domain()) {
        prop_assert!(matches(&d, &d));
    }

    #[test]
    fn prop_matches_case_insensitive(d in domain(), p in domain()) {
        prop_assert_eq!(matches(&d, &p), matches(&d.to_uppercase(), &p.to_uppercase()));
    }

    #[test]
    fn prop_subdomain_matches_parent(sub in label(), d in domain()) {
        let name = format!("{sub}.{d}");
        prop_assert!(matches(&name, &d));
        let wildcard = format!("*.{d}");
        prop_assert!(matches(&name, &wildcard));
        prop_assert!(matches(&d, &wildcard));
    }

    #[test]
    fn prop_parent_never_matches_child_pattern(sub in label(), d in domain()) {
        let child = format!("{sub}.{d}");
        prop_assert!(!matches(&d, &child));
    }

    #[test]
    fn prop_empty_never_matches(d in domain()) {
        prop_assert!(!matches("", &d));
        prop_assert!(!matches(&d, ""));
    }

    #[test]
    fn prop_matches_any_is_or(d in domain(), patterns in prop::collection::vec(domain(), 0..5)) {
        let expected = patterns.iter().any(|p| matches(&d, p));
        prop_assert_eq!(matches_any(&d, &patterns), expected);
    }

    // ============ Hosts Parser Properties ============

    #[test]
    fn prop_sentinel_lines_accepted(d in domain(), sentinel in prop::sample::select(vec!["0.0.0.0", "127.0.0.1"])) {
        prop_assume!(d != "localhost" && d != "localhost.localdomain");
        let line = format!("{sentinel} {d}");
        prop_assert_eq!(parse_hosts_line(&line), Some(d));
    }

    #[test]
    fn prop_comment_lines_rejected(text in "[ -~]{0,40}") {
        let line = format!("#{text}");
        prop_assert_eq!(parse_hosts_line(&line), None);
    }

    // ============ CIDR Properties ============

    #[test]
    fn prop_network_contains_itself(ip in any::<u32>(), prefix in 0u32..=32) {
        let addr = Ipv4Addr::from(ip);
        let rule = IpRule::new(&addr.to_string(), prefix, true).unwrap();
        prop_assert!(rule.matches(addr));
    }

    #[test]
    fn prop_cidr_match_agrees_with_mask(net in any::<u32>(), target in any::<u32>(), prefix in 0u32..=32) {
        let rule = IpRule::new(&Ipv4Addr::from(net).to_string(), prefix, true).unwrap();
        let mask = prefix_mask(prefix);
        prop_assert_eq!(rule.matches(Ipv4Addr::from(target)), (net & mask) == (target & mask));
    }

    #[test]
    fn prop_prefix_zero_matches_all(net in any::<u32>(), target in any::<u32>()) {
        let rule = IpRule::new(&Ipv4Addr::from(net).to_string(), 0, true).unwrap();
        prop_assert!(rule.matches(Ipv4Addr::from(target)));
    }
}

#[test]
fn test_cidr_example() {
    let rule: IpRule =
        serde_json::from_str(r#"{"ip":"192.168.1.0","prefixLength":24,"blocked":true}"#).unwrap();
    assert!(rule.matches(Ipv4Addr::new(192, 168, 1, 55)));
    assert!(rule.matches(Ipv4Addr::new(192, 168, 1, 0)));
    assert!(!rule.matches(Ipv4Addr::new(192, 168, 2, 1)));
}
