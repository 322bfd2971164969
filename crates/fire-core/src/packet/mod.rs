//! Packet parsing and manipulation
//!
//! Typed views over raw IPv4 datagrams read from the tunnel.

mod builder;
pub mod dns;
mod parser;
mod types;

pub use builder::{DnsQueryBuilder, ReplyBuilder};
pub use parser::PacketParser;
pub use types::*;

use crate::error::{Error, Result};
use bytes::BytesMut;
use std::net::Ipv4Addr;

/// Maximum packet size we read from the tunnel in one go
pub const MAX_PACKET_SIZE: usize = 32767;

const TCP_MIN_HEADER_LEN: usize = 20;

/// An IPv4 datagram with its headers parsed
#[derive(Debug, Clone)]
pub struct Packet {
    /// Raw packet data
    data: BytesMut,
    /// Transport protocol
    pub protocol: Protocol,
    /// Source IP address
    pub src_addr: Ipv4Addr,
    /// Destination IP address
    pub dst_addr: Ipv4Addr,
    /// Source port (TCP/UDP, 0 otherwise)
    pub src_port: u16,
    /// Destination port (TCP/UDP, 0 otherwise)
    pub dst_port: u16,
    /// IP header length
    ip_header_len: usize,
    /// Transport header length, 0 when no transport header was parsed
    transport_header_len: usize,
}

impl Packet {
    /// Parse an IPv4 datagram
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < offsets::IPV4_HEADER_LEN {
            return Err(Error::PacketTooSmall {
                expected: offsets::IPV4_HEADER_LEN,
                actual: data.len(),
            });
        }

        match IpVersion::of(data) {
            Some(IpVersion::V4) => {}
            Some(other) => {
                return Err(Error::packet_parse(format!("Unsupported IP version: {other:?}")))
            }
            None => return Err(Error::packet_parse("Empty packet")),
        }

        let ip_header_len = usize::from(data[0] & 0x0F) * 4;
        if ip_header_len < offsets::IPV4_HEADER_LEN {
            return Err(Error::packet_parse_at(
                format!("Invalid IHL: {ip_header_len} bytes"),
                0,
            ));
        }
        if data.len() < ip_header_len {
            return Err(Error::PacketTooSmall {
                expected: ip_header_len,
                actual: data.len(),
            });
        }

        let mut packet = Self {
            data: BytesMut::from(data),
            protocol: Protocol::from_u8(data[offsets::IPV4_PROTOCOL]),
            src_addr: read_ipv4(data, offsets::IPV4_SRC),
            dst_addr: read_ipv4(data, offsets::IPV4_DST),
            src_port: 0,
            dst_port: 0,
            ip_header_len,
            transport_header_len: 0,
        };

        if packet.fragment_offset() == 0 {
            packet.parse_transport();
        }
        Ok(packet)
    }

    /// Parse transport layer (TCP/UDP).
    ///
    /// A short transport header leaves the ports at 0; the IPv4 addresses
    /// stay usable for address-based decisions.
    fn parse_transport(&mut self) {
        let offset = self.ip_header_len;

        let min_len = match self.protocol {
            Protocol::Tcp => TCP_MIN_HEADER_LEN,
            Protocol::Udp => offsets::UDP_HEADER_LEN,
            _ => return,
        };

        if self.data.len() < offset + min_len {
            return;
        }

        self.src_port = u16::from_be_bytes([self.data[offset], self.data[offset + 1]]);
        self.dst_port = u16::from_be_bytes([self.data[offset + 2], self.data[offset + 3]]);
        self.transport_header_len = match self.protocol {
            Protocol::Tcp => (usize::from(self.data[offset + 12] >> 4) * 4).max(TCP_MIN_HEADER_LEN),
            _ => offsets::UDP_HEADER_LEN,
        };
    }

    /// Fragment offset in 8-byte units; non-zero for every fragment but the first
    pub fn fragment_offset(&self) -> u16 {
        u16::from_be_bytes([
            self.data[offsets::IPV4_FRAGMENT],
            self.data[offsets::IPV4_FRAGMENT + 1],
        ]) & offsets::IPV4_FRAGMENT_OFFSET_MASK
    }

    /// Whether a TCP or UDP header was parsed, so the ports are meaningful
    pub fn has_transport_header(&self) -> bool {
        self.transport_header_len > 0
    }

    /// Get the payload (data after headers)
    pub fn payload(&self) -> &[u8] {
        let offset = self.ip_header_len + self.transport_header_len;
        if offset < self.data.len() {
            &self.data[offset..]
        } else {
            &[]
        }
    }

    /// IP version of the datagram (always V4 once parsed)
    pub fn ip_version(&self) -> IpVersion {
        IpVersion::V4
    }

    /// Bytes after the UDP header, empty for other protocols
    pub fn udp_payload(&self) -> &[u8] {
        if self.is_udp() && self.has_transport_header() {
            self.payload()
        } else {
            &[]
        }
    }

    /// Check if this is a UDP packet
    pub fn is_udp(&self) -> bool {
        matches!(self.protocol, Protocol::Udp)
    }

    /// Check if this is a TCP packet
    pub fn is_tcp(&self) -> bool {
        matches!(self.protocol, Protocol::Tcp)
    }

    /// Whether the IPv4 header carries options
    pub fn has_ip_options(&self) -> bool {
        self.ip_header_len > offsets::IPV4_HEADER_LEN
    }

    /// Outbound UDP datagram addressed to `port`
    pub fn is_udp_to(&self, port: u16) -> bool {
        self.is_udp() && self.has_transport_header() && self.dst_port == port
    }

    /// Get the raw packet data
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get total packet length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if packet is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Read four bytes at `offset` as an IPv4 address
pub(crate) fn read_ipv4(data: &[u8], offset: usize) -> Ipv4Addr {
    Ipv4Addr::new(
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    )
}

/// Split a tunnel read into the IP datagrams it holds.
///
/// IPv4 datagrams are delimited by their total-length field. Anything that
/// cannot be delimited (IPv6, a zero or oversized length) is yielded as the
/// remainder of the buffer so the caller can still pass it through.
pub fn split_datagrams(buf: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = buf;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }

        let len = match IpVersion::of(rest) {
            Some(IpVersion::V4) if rest.len() >= offsets::IPV4_HEADER_LEN => {
                let total = usize::from(u16::from_be_bytes([
                    rest[offsets::IPV4_TOTAL_LEN],
                    rest[offsets::IPV4_TOTAL_LEN + 1],
                ]));
                if total >= offsets::IPV4_HEADER_LEN && total <= rest.len() {
                    total
                } else {
                    rest.len()
                }
            }
            _ => rest.len(),
        };

        let (head, tail) = rest.split_at(len);
        rest = tail;
        Some(head)
    })
}
