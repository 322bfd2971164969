//! Packet builder utilities

use super::dns::NXDOMAIN_REPLY_FLAGS;
use super::{offsets, PacketParser, Protocol};
use bytes::BytesMut;

/// Builder for IPv4/UDP datagrams carrying a single-question DNS query
pub struct DnsQueryBuilder {
    src_ip: [u8; 4],
    dst_ip: [u8; 4],
    src_port: u16,
    dst_port: u16,
    ttl: u8,
    id: u16,
    flags: u16,
    qname: String,
    qtype: u16,
    udp_checksum: bool,
}

impl DnsQueryBuilder {
    /// Create a builder for an A query of `qname`
    pub fn new(qname: impl Into<String>) -> Self {
        Self {
            src_ip: [10, 0, 0, 2],
            dst_ip: [8, 8, 8, 8],
            src_port: 53_000,
            dst_port: super::ports::DNS,
            ttl: 64,
            id: 0x1234,
            flags: 0x0100,
            qname: qname.into(),
            qtype: 1,
            udp_checksum: false,
        }
    }

    /// Set source IP
    pub fn src_ip_v4(mut self, ip: [u8; 4]) -> Self {
        self.src_ip = ip;
        self
    }

    /// Set destination IP
    pub fn dst_ip_v4(mut self, ip: [u8; 4]) -> Self {
        self.dst_ip = ip;
        self
    }

    /// Set source port
    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    /// Set destination port
    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    /// Set TTL
    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set transaction ID
    pub fn id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }

    /// Set the raw flags word
    pub fn flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    /// Set the question type
    pub fn qtype(mut self, qtype: u16) -> Self {
        self.qtype = qtype;
        self
    }

    /// Fill in the UDP checksum instead of leaving it zero
    pub fn with_udp_checksum(mut self) -> Self {
        self.udp_checksum = true;
        self
    }

    /// Build the datagram
    pub fn build(self) -> Vec<u8> {
        let mut dns = Vec::with_capacity(offsets::DNS_HEADER_LEN + self.qname.len() + 6);
        dns.extend_from_slice(&self.id.to_be_bytes());
        dns.extend_from_slice(&self.flags.to_be_bytes());
        dns.extend_from_slice(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        for label in self.qname.split('.').filter(|l| !l.is_empty()) {
            dns.push(label.len() as u8);
            dns.extend_from_slice(label.as_bytes());
        }
        dns.push(0);
        dns.extend_from_slice(&self.qtype.to_be_bytes());
        dns.extend_from_slice(&[0x00, 0x01]); // QCLASS IN

        let udp_len = offsets::UDP_HEADER_LEN + dns.len();
        let total_len = offsets::IPV4_HEADER_LEN + udp_len;
        let mut packet = BytesMut::with_capacity(total_len);

        // IPv4 header
        packet.extend_from_slice(&[
            0x45,                            // Version (4) + IHL (5)
            0x00,                            // DSCP + ECN
            ((total_len >> 8) & 0xFF) as u8, // Total Length (high)
            (total_len & 0xFF) as u8,        // Total Length (low)
            0x00, 0x00,                      // Identification
            0x40, 0x00,                      // Flags (DF) + Fragment Offset
            self.ttl,                        // TTL
            Protocol::Udp.to_u8(),           // Protocol
            0x00, 0x00,                      // Header Checksum (filled below)
        ]);
        packet.extend_from_slice(&self.src_ip);
        packet.extend_from_slice(&self.dst_ip);

        // UDP header
        packet.extend_from_slice(&self.src_port.to_be_bytes());
        packet.extend_from_slice(&self.dst_port.to_be_bytes());
        packet.extend_from_slice(&(udp_len as u16).to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x00]);

        packet.extend_from_slice(&dns);

        let ip_checksum = PacketParser::ipv4_header_checksum(&packet[..offsets::IPV4_HEADER_LEN]);
        packet[offsets::IPV4_CHECKSUM..offsets::IPV4_CHECKSUM + 2]
            .copy_from_slice(&ip_checksum.to_be_bytes());

        if self.udp_checksum {
            let checksum = PacketParser::udp_checksum_ipv4(
                &self.src_ip,
                &self.dst_ip,
                &packet[offsets::IPV4_HEADER_LEN..],
            );
            packet[offsets::UDP_CHECKSUM..offsets::UDP_CHECKSUM + 2]
                .copy_from_slice(&checksum.to_be_bytes());
        }

        packet.to_vec()
    }
}

/// Turns a DNS query into the mirrored negative answer.
///
/// The reply is the request with addresses and ports swapped and the flags
/// word overwritten. ID and question section stay untouched. The IPv4 header
/// checksum is invariant under the address swap; a non-zero UDP checksum is
/// recomputed so the stack accepting the reply does not discard it.
pub struct ReplyBuilder {
    flags: u16,
}

impl Default for ReplyBuilder {
    fn default() -> Self {
        Self::nxdomain()
    }
}

impl ReplyBuilder {
    /// Reply with QR, RD, RA set and RCODE=NXDOMAIN
    pub fn nxdomain() -> Self {
        Self {
            flags: NXDOMAIN_REPLY_FLAGS,
        }
    }

    /// Reply with an arbitrary flags word
    pub fn with_flags(flags: u16) -> Self {
        Self { flags }
    }

    /// Flags word written into replies
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Build the reply for `request`.
    ///
    /// The caller guarantees the request holds at least the fixed
    /// IPv4/UDP/DNS header prefix.
    pub fn build(&self, request: &[u8]) -> BytesMut {
        let mut reply = BytesMut::from(request);
        swap_ranges(&mut reply, offsets::IPV4_SRC, offsets::IPV4_DST, 4);
        swap_ranges(&mut reply, offsets::UDP_SRC_PORT, offsets::UDP_DST_PORT, 2);
        reply[offsets::DNS_FLAGS..offsets::DNS_FLAGS + 2].copy_from_slice(&self.flags.to_be_bytes());
        PacketParser::refresh_udp_checksum(&mut reply);
        reply
    }
}

fn swap_ranges(data: &mut [u8], a: usize, b: usize, len: usize) {
    let (head, tail) = data.split_at_mut(b);
    head[a..a + len].swap_with_slice(&mut tail[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::dns::{parse_qname, DnsHeader};
    use crate::packet::Packet;
    use std::net::Ipv4Addr;

    #[test]
    fn test_build_dns_query() {
        let packet = DnsQueryBuilder::new("ads.example.com")
            .src_ip_v4([192, 168, 1, 10])
            .dst_ip_v4([1, 1, 1, 1])
            .src_port(40000)
            .id(0xBEEF)
            .build();

        let parsed = Packet::from_bytes(&packet).unwrap();
        assert!(parsed.is_udp_to(53));
        assert_eq!(parsed.src_addr, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(parsed.src_port, 40000);
        assert_eq!(packet.len(), usize::from(u16::from_be_bytes([packet[2], packet[3]])));
        assert_eq!(PacketParser::internet_checksum(&packet[..20]), 0);

        let header = DnsHeader::from_datagram(&packet).unwrap();
        assert_eq!(header.id, 0xBEEF);
        assert_eq!(header.qdcount, 1);
        assert_eq!(
            parse_qname(&packet, offsets::DNS_QUESTION).as_deref(),
            Some("ads.example.com")
        );
    }

    #[test]
    fn test_reply_mirrors_request() {
        let request = DnsQueryBuilder::new("ads.example.com")
            .src_ip_v4([10, 0, 0, 2])
            .dst_ip_v4([8, 8, 4, 4])
            .src_port(5353)
            .id(0x0A0B)
            .build();
        let reply = ReplyBuilder::nxdomain().build(&request);

        assert_eq!(reply.len(), request.len());
        assert_eq!(&reply[12..16], &request[16..20]);
        assert_eq!(&reply[16..20], &request[12..16]);
        assert_eq!(&reply[20..22], &request[22..24]);
        assert_eq!(&reply[22..24], &request[20..22]);
        assert_eq!(&reply[28..30], &request[28..30]);
        assert_eq!(&reply[30..32], &[0x81, 0x83]);
        assert_eq!(&reply[32..], &request[32..]);
        assert_eq!(PacketParser::internet_checksum(&reply[..20]), 0);
    }

    #[test]
    fn test_reply_refreshes_udp_checksum() {
        let request = DnsQueryBuilder::new("tracker.example.net")
            .with_udp_checksum()
            .build();
        let reply = ReplyBuilder::nxdomain().build(&request);

        let mut pseudo = Vec::new();
        pseudo.extend_from_slice(&reply[12..20]);
        pseudo.extend_from_slice(&[0, 17]);
        pseudo.extend_from_slice(&reply[24..26]);
        pseudo.extend_from_slice(&reply[20..]);
        if pseudo.len() % 2 != 0 {
            pseudo.push(0);
        }
        assert_ne!(&reply[26..28], &[0, 0]);
        assert_eq!(PacketParser::internet_checksum(&pseudo), 0);
    }

    #[test]
    fn test_reply_keeps_zero_udp_checksum() {
        let request = DnsQueryBuilder::new("example.org").build();
        let reply = ReplyBuilder::nxdomain().build(&request);
        assert_eq!(&reply[26..28], &[0, 0]);
    }
}
