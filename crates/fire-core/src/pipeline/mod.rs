//! Packet processing pipeline
//!
//! One decision per outgoing datagram: DNS interception first, then the
//! packet filter. Blocks are logged; usage is accounted per owner.

mod context;
mod worker;

pub use context::{Context, Stats};
pub use worker::{DiscardForwarder, Forwarder, TunnelIo, Worker};

use crate::config::DnsConfig;
use crate::identity::Uid;
use crate::intercept::DnsInterceptor;
use crate::logger::{ConnectionLogger, DNS_BLOCKED, RULE_BLOCKED};
use crate::packet::{IpVersion, Packet};
use crate::packet_filter::PacketFilter;
use crate::usage::UsageTracker;
use bytes::BytesMut;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Outcome for one datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Write this reply back to the tunnel instead of sending the datagram
    Reply(BytesMut),
    /// Drop the datagram
    Drop,
    /// Let the datagram through
    Allow,
}

/// Classifies datagrams read from the tunnel
pub struct Pipeline {
    interceptor: DnsInterceptor,
    filter: Arc<PacketFilter>,
    logger: Arc<ConnectionLogger>,
    usage: Arc<UsageTracker>,
    intercept_dns: bool,
    dns_port: u16,
}

impl Pipeline {
    /// Assemble a pipeline
    pub fn new(
        interceptor: DnsInterceptor,
        filter: Arc<PacketFilter>,
        logger: Arc<ConnectionLogger>,
        usage: Arc<UsageTracker>,
        dns: &DnsConfig,
    ) -> Self {
        Self {
            interceptor,
            filter,
            logger,
            usage,
            intercept_dns: dns.intercept,
            dns_port: dns.port,
        }
    }

    /// Decide what happens to `raw`, sent by `owner`.
    ///
    /// Never fails: datagrams without a readable IPv4 header are let through.
    /// A short or missing transport header skips DNS interception but still
    /// goes through the packet filter.
    #[instrument(level = "trace", skip(self, raw, ctx), fields(len = raw.len()))]
    pub fn process(&self, raw: &[u8], owner: Uid, ctx: &mut Context) -> Verdict {
        ctx.stats.packets_processed += 1;

        if IpVersion::of(raw) != Some(IpVersion::V4) {
            ctx.stats.passed_through += 1;
            return Verdict::Allow;
        }

        let packet = match Packet::from_bytes(raw) {
            Ok(packet) => packet,
            Err(e) => {
                trace!(error = %e, "Passing unparseable packet");
                ctx.stats.malformed += 1;
                return Verdict::Allow;
            }
        };

        if self.intercept_dns && packet.is_udp_to(self.dns_port) {
            if let Some(blocked) = self.interceptor.process(raw) {
                self.logger
                    .log_blocked(packet.dst_addr, packet.dst_port, owner, DNS_BLOCKED);
                ctx.stats.dns_blocked += 1;
                return Verdict::Reply(blocked.reply);
            }
        }

        let bytes = raw.len() as u64;
        if let Some(reason) = self.filter.decide(packet.dst_addr, owner) {
            debug!(
                dst = %packet.dst_addr,
                port = packet.dst_port,
                owner,
                reason = %reason,
                "Dropping packet"
            );
            self.logger
                .log_blocked(packet.dst_addr, packet.dst_port, owner, RULE_BLOCKED);
            self.usage.track_blocked(owner, bytes);
            ctx.stats.packets_dropped += 1;
            return Verdict::Drop;
        }

        self.usage.track_allowed(owner, bytes);
        ctx.stats.packets_allowed += 1;
        Verdict::Allow
    }

    /// The packet filter this pipeline consults
    pub fn filter(&self) -> &Arc<PacketFilter> {
        &self.filter
    }

    /// Persist throttled usage counters
    pub fn flush(&self) {
        self.usage.flush();
    }
}
