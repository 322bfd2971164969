//! # Fire Core
//!
//! Platform-independent core library of the on-device firewall.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Packet parsing** - Typed views over IPv4/UDP/DNS datagrams
//! - **Rules** - Application, domain and IP/CIDR policies with persistence
//! - **Denylist** - Blocked-domain set with parent-zone lookup
//! - **DNS interception** - NXDOMAIN answers for blocked lookups
//! - **Packet filter** - Per-packet admit/deny decision
//! - **Connection log and usage accounting** - Bounded observation of
//!   the pipeline's decisions
//!
//! ## Example
//!
//! ```rust,no_run
//! use fire_core::{Config, Context, Services};
//! use fire_core::identity::NullResolver;
//! use fire_core::store::MemoryStore;
//! # use fire_core::filter::ListFetcher;
//! # use std::sync::Arc;
//! # fn fetcher() -> Arc<dyn ListFetcher> { unimplemented!() }
//! # fn main() -> fire_core::Result<()> {
//! # let raw: Vec<u8> = Vec::new();
//!
//! let config = Config::load("fire.toml")?;
//! let services = Services::new(
//!     &config,
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(NullResolver),
//!     fetcher(),
//! )?;
//! let pipeline = services.pipeline(&config);
//!
//! // Decide what happens to one datagram read from the tunnel
//! let mut ctx = Context::new();
//! let verdict = pipeline.process(&raw, -1, &mut ctx);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod filter;
pub mod identity;
pub mod intercept;
pub mod logger;
pub mod packet;
pub mod packet_filter;
pub mod pipeline;
pub mod rules;
pub mod services;
pub mod store;
pub mod usage;

// Re-exports for convenience
pub use config::Config;
pub use error::{Error, Result};
pub use filter::Denylist;
pub use intercept::{BlockSource, DnsInterceptor};
pub use logger::{ConnectionLogEntry, ConnectionLogger};
pub use packet::Packet;
pub use packet_filter::PacketFilter;
pub use pipeline::{Context, Pipeline, Stats, Verdict, Worker};
pub use rules::RuleStore;
pub use services::Services;
pub use usage::{UsageReport, UsageStats, UsageTracker};
