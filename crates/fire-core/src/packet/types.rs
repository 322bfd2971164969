//! Packet type definitions

/// IP version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    /// IPv4
    V4,
    /// IPv6
    V6,
    /// Anything else found in the version nibble
    Other(u8),
}

impl IpVersion {
    /// Read the version nibble from the first byte of a datagram
    pub fn of(data: &[u8]) -> Option<Self> {
        let first = *data.first()?;
        Some(match first >> 4 {
            4 => IpVersion::V4,
            6 => IpVersion::V6,
            v => IpVersion::Other(v),
        })
    }
}

/// Transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// TCP (protocol number 6)
    Tcp,
    /// UDP (protocol number 17)
    Udp,
    /// ICMP (protocol number 1)
    Icmp,
    /// Unknown protocol
    Unknown(u8),
}

impl Protocol {
    /// Create from protocol number
    pub fn from_u8(proto: u8) -> Self {
        match proto {
            1 => Protocol::Icmp,
            6 => Protocol::Tcp,
            17 => Protocol::Udp,
            other => Protocol::Unknown(other),
        }
    }

    /// Get protocol number
    pub fn to_u8(self) -> u8 {
        match self {
            Protocol::Icmp => 1,
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
            Protocol::Unknown(other) => other,
        }
    }

    /// Whether the protocol carries 16-bit source/destination ports
    pub fn has_ports(self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }
}

/// Fixed header offsets.
///
/// Every byte position the firewall reads or writes lives here. DNS offsets
/// assume an option-less IPv4 header, which is what the tunnel produces.
pub mod offsets {
    /// Minimum IPv4 header length (IHL = 5)
    pub const IPV4_HEADER_LEN: usize = 20;
    /// IPv4 total length field
    pub const IPV4_TOTAL_LEN: usize = 2;
    /// IPv4 flags and fragment offset word
    pub const IPV4_FRAGMENT: usize = 6;
    /// Fragment offset bits of that word
    pub const IPV4_FRAGMENT_OFFSET_MASK: u16 = 0x1FFF;
    /// IPv4 protocol field
    pub const IPV4_PROTOCOL: usize = 9;
    /// IPv4 header checksum
    pub const IPV4_CHECKSUM: usize = 10;
    /// IPv4 source address
    pub const IPV4_SRC: usize = 12;
    /// IPv4 destination address
    pub const IPV4_DST: usize = 16;

    /// UDP header length
    pub const UDP_HEADER_LEN: usize = 8;
    /// UDP source port (relative to the datagram start)
    pub const UDP_SRC_PORT: usize = IPV4_HEADER_LEN;
    /// UDP destination port
    pub const UDP_DST_PORT: usize = IPV4_HEADER_LEN + 2;
    /// UDP length field
    pub const UDP_LEN: usize = IPV4_HEADER_LEN + 4;
    /// UDP checksum field
    pub const UDP_CHECKSUM: usize = IPV4_HEADER_LEN + 6;

    /// Start of the DNS message
    pub const DNS: usize = IPV4_HEADER_LEN + UDP_HEADER_LEN;
    /// DNS header length
    pub const DNS_HEADER_LEN: usize = 12;
    /// DNS transaction ID
    pub const DNS_ID: usize = DNS;
    /// DNS flags word
    pub const DNS_FLAGS: usize = DNS + 2;
    /// DNS question count
    pub const DNS_QDCOUNT: usize = DNS + 4;
    /// First question
    pub const DNS_QUESTION: usize = DNS + DNS_HEADER_LEN;
}

/// Common well-known ports
pub mod ports {
    /// DNS port
    pub const DNS: u16 = 53;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_from_u8() {
        assert_eq!(Protocol::from_u8(6), Protocol::Tcp);
        assert_eq!(Protocol::from_u8(17), Protocol::Udp);
        assert_eq!(Protocol::from_u8(1), Protocol::Icmp);
        assert_eq!(Protocol::from_u8(99), Protocol::Unknown(99));
    }

    #[test]
    fn test_protocol_roundtrip() {
        for proto in [Protocol::Tcp, Protocol::Udp, Protocol::Icmp, Protocol::Unknown(47)] {
            assert_eq!(Protocol::from_u8(proto.to_u8()), proto);
        }
    }

    #[test]
    fn test_ip_version_nibble() {
        assert_eq!(IpVersion::of(&[0x45]), Some(IpVersion::V4));
        assert_eq!(IpVersion::of(&[0x60]), Some(IpVersion::V6));
        assert_eq!(IpVersion::of(&[0x20]), Some(IpVersion::Other(2)));
        assert_eq!(IpVersion::of(&[]), None);
    }

    #[test]
    fn test_dns_offsets_follow_fixed_prefix() {
        assert_eq!(offsets::DNS, 28);
        assert_eq!(offsets::DNS_FLAGS, 30);
        assert_eq!(offsets::DNS_QUESTION, 40);
    }
}
