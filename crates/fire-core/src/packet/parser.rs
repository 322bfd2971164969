//! Checksum utilities

use super::offsets;

/// Internet checksum helpers for rewritten datagrams
pub struct PacketParser;

impl PacketParser {
    /// Calculate Internet Checksum (RFC 1071)
    pub fn internet_checksum(data: &[u8]) -> u16 {
        let mut sum: u32 = 0;
        let mut chunks = data.chunks_exact(2);

        for pair in &mut chunks {
            sum += u32::from(u16::from_be_bytes([pair[0], pair[1]]));
        }

        // Handle odd byte
        if let [last] = chunks.remainder() {
            sum += u32::from(*last) << 8;
        }

        // Fold 32-bit sum to 16 bits
        while sum >> 16 != 0 {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }

        !(sum as u16)
    }

    /// Calculate UDP checksum with the IPv4 pseudo-header
    pub fn udp_checksum_ipv4(src_ip: &[u8; 4], dst_ip: &[u8; 4], udp_segment: &[u8]) -> u16 {
        let udp_len = udp_segment.len() as u16;

        let mut pseudo = Vec::with_capacity(12 + udp_segment.len() + 1);
        pseudo.extend_from_slice(src_ip);
        pseudo.extend_from_slice(dst_ip);
        pseudo.push(0); // Reserved
        pseudo.push(17); // Protocol (UDP)
        pseudo.extend_from_slice(&udp_len.to_be_bytes());
        pseudo.extend_from_slice(udp_segment);

        // Pad if odd length
        if pseudo.len() % 2 != 0 {
            pseudo.push(0);
        }

        match Self::internet_checksum(&pseudo) {
            // 0 means "no checksum" on the wire
            0 => 0xFFFF,
            sum => sum,
        }
    }

    /// Recompute the UDP checksum of an option-less IPv4 datagram in place.
    ///
    /// A zero checksum means the sender opted out; it is left as is.
    pub fn refresh_udp_checksum(data: &mut [u8]) {
        if data.len() < offsets::DNS {
            return;
        }
        if data[offsets::UDP_CHECKSUM] == 0 && data[offsets::UDP_CHECKSUM + 1] == 0 {
            return;
        }

        let declared = usize::from(u16::from_be_bytes([
            data[offsets::UDP_LEN],
            data[offsets::UDP_LEN + 1],
        ]));
        let available = data.len() - offsets::IPV4_HEADER_LEN;
        let udp_len = declared.clamp(offsets::UDP_HEADER_LEN, available);

        data[offsets::UDP_CHECKSUM] = 0;
        data[offsets::UDP_CHECKSUM + 1] = 0;

        let mut src = [0u8; 4];
        let mut dst = [0u8; 4];
        src.copy_from_slice(&data[offsets::IPV4_SRC..offsets::IPV4_SRC + 4]);
        dst.copy_from_slice(&data[offsets::IPV4_DST..offsets::IPV4_DST + 4]);

        let segment = &data[offsets::IPV4_HEADER_LEN..offsets::IPV4_HEADER_LEN + udp_len];
        let checksum = Self::udp_checksum_ipv4(&src, &dst, segment);
        data[offsets::UDP_CHECKSUM..offsets::UDP_CHECKSUM + 2]
            .copy_from_slice(&checksum.to_be_bytes());
    }

    /// Calculate IPv4 header checksum
    pub fn ipv4_header_checksum(header: &[u8]) -> u16 {
        let mut header_copy = header.to_vec();
        if header_copy.len() >= offsets::IPV4_CHECKSUM + 2 {
            header_copy[offsets::IPV4_CHECKSUM] = 0;
            header_copy[offsets::IPV4_CHECKSUM + 1] = 0;
        }
        Self::internet_checksum(&header_copy)
    }
}
