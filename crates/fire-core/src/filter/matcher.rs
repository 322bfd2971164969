//! Domain pattern matching

/// Does `requested` satisfy `pattern`?
///
/// Case-insensitive. A pattern matches the exact name, any subdomain of
/// itself, and `*.zone` additionally matches `zone`. Empty input on either
/// side never matches.
pub fn matches(requested: &str, pattern: &str) -> bool {
    if requested.is_empty() || pattern.is_empty() {
        return false;
    }

    let requested = requested.to_lowercase();
    let pattern = pattern.to_lowercase();

    if requested == pattern {
        return true;
    }

    if let Some(base) = pattern.strip_prefix("*.") {
        if !base.is_empty() && (requested == base || is_subdomain_of(&requested, base)) {
            return true;
        }
    }

    is_subdomain_of(&requested, &pattern)
}

/// True if any pattern matches, stopping at the first one that does
pub fn matches_any<I, S>(domain: &str, patterns: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .any(|pattern| matches(domain, pattern.as_ref()))
}

/// `name` ends with `.zone`
fn is_subdomain_of(name: &str, zone: &str) -> bool {
    name.len() > zone.len()
        && name.ends_with(zone)
        && name.as_bytes()[name.len() - zone.len() - 1] == b'.'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(matches("example.com", "example.com"));
        assert!(matches("Example.COM", "example.com"));
        assert!(!matches("other.com", "example.com"));
    }

    #[test]
    fn test_wildcard_match() {
        assert!(matches("a.b.c", "*.b.c"));
        assert!(matches("b.c", "*.b.c"));
        assert!(matches("deep.sub.b.c", "*.B.C"));
        assert!(!matches("xb.c", "*.b.c"));
    }

    #[test]
    fn test_suffix_match() {
        assert!(matches("x.b.c", "b.c"));
        assert!(!matches("bc", "b.c"));
        assert!(!matches("ab.c", "b.c"));
        assert!(!matches("b.c", "x.b.c"));
    }

    #[test]
    fn test_empty_never_matches() {
        assert!(!matches("", "example.com"));
        assert!(!matches("example.com", ""));
        assert!(!matches("", ""));
        assert!(!matches("com", "*."));
    }

    #[test]
    fn test_matches_any() {
        let patterns = ["ads.net", "*.tracker.org"];
        assert!(matches_any("cdn.ads.net", patterns));
        assert!(matches_any("tracker.org", patterns));
        assert!(!matches_any("example.com", patterns));
        assert!(!matches_any("example.com", Vec::<String>::new()));
    }
}
