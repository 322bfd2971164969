//! Domain-based blocking
//!
//! This module provides:
//! - Pattern matching for domain rules (exact, subdomain, `*.zone`)
//! - The denylist: a set of blocked domains checked together with every
//!   parent zone, bulk-loadable from hosts-format lists

mod denylist;
pub mod matcher;

pub use denylist::{parse_hosts_line, Denylist, ListFetcher, LoadCallback};
pub use matcher::{matches, matches_any};
