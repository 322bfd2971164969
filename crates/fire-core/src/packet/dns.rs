//! DNS message view
//!
//! Only the pieces the interceptor needs: the fixed 12-byte header and the
//! QNAME of the first question.

use super::offsets;
use crate::error::{Error, Result};
use bitflags::bitflags;

bitflags! {
    /// Single-bit fields of the DNS flags word
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DnsFlags: u16 {
        /// Message is a response
        const QR = 0x8000;
        /// Authoritative answer
        const AA = 0x0400;
        /// Truncated
        const TC = 0x0200;
        /// Recursion desired
        const RD = 0x0100;
        /// Recursion available
        const RA = 0x0080;
    }
}

/// Longest encoded name a message may carry
const MAX_WIRE_NAME_LEN: usize = 255;

/// Response code for "name does not exist"
pub const RCODE_NXDOMAIN: u16 = 3;

/// Flags word of a synthesized negative answer: QR, RD, RA, RCODE=NXDOMAIN
pub const NXDOMAIN_REPLY_FLAGS: u16 = 0x8183;

impl DnsFlags {
    /// Opcode nibble of a raw flags word
    pub fn opcode(raw: u16) -> u16 {
        (raw >> 11) & 0x0F
    }

    /// RCODE nibble of a raw flags word
    pub fn rcode(raw: u16) -> u16 {
        raw & 0x000F
    }
}

/// The fixed DNS header fields we care about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsHeader {
    /// Transaction ID
    pub id: u16,
    /// Raw flags word
    pub flags: u16,
    /// Question count
    pub qdcount: u16,
}

impl DnsHeader {
    /// Read the header from a datagram with a fixed 28-byte IPv4/UDP prefix
    pub fn from_datagram(data: &[u8]) -> Result<Self> {
        let needed = offsets::DNS + offsets::DNS_HEADER_LEN;
        if data.len() < needed {
            return Err(Error::PacketTooSmall {
                expected: needed,
                actual: data.len(),
            });
        }

        Ok(Self {
            id: read_u16(data, offsets::DNS_ID),
            flags: read_u16(data, offsets::DNS_FLAGS),
            qdcount: read_u16(data, offsets::DNS_QDCOUNT),
        })
    }

    /// Single-bit flags, unknown bits kept
    pub fn flag_bits(&self) -> DnsFlags {
        DnsFlags::from_bits_retain(self.flags)
    }

    /// Whether the QR bit marks this as a response
    pub fn is_response(&self) -> bool {
        self.flag_bits().contains(DnsFlags::QR)
    }
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

/// Decode the QNAME starting at `offset`.
///
/// Labels are length-prefixed and terminated by a zero-length label. Each
/// label byte is taken as a raw byte value (not UTF-8) and lowercased.
/// Returns `None` for an empty name, a label running past the end of the
/// buffer, a compression pointer or a name longer than a hostname can be.
pub fn parse_qname(data: &[u8], offset: usize) -> Option<String> {
    let mut name = String::new();
    let mut pos = offset;

    loop {
        let label_len = usize::from(*data.get(pos)?);
        if label_len == 0 {
            break;
        }
        // 0b11xx_xxxx is a compression pointer, never valid in a query QNAME
        if label_len & 0xC0 != 0 {
            return None;
        }

        pos += 1;
        let label = data.get(pos..pos + label_len)?;
        if !name.is_empty() {
            name.push('.');
        }
        for &byte in label {
            name.extend(char::from(byte).to_lowercase());
        }
        pos += label_len;

        if pos - offset > MAX_WIRE_NAME_LEN {
            return None;
        }
    }

    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(name: &str) -> Vec<u8> {
        let mut out = Vec::new();
        for label in name.split('.') {
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
        out.push(0);
        out
    }

    #[test]
    fn test_parse_qname() {
        let data = encode("www.Example.COM");
        assert_eq!(parse_qname(&data, 0).as_deref(), Some("www.example.com"));
    }

    #[test]
    fn test_parse_qname_root_is_none() {
        assert_eq!(parse_qname(&[0], 0), None);
    }

    #[test]
    fn test_parse_qname_truncated_label() {
        let mut data = encode("tracker.example.com");
        data.truncate(6);
        assert_eq!(parse_qname(&data, 0), None);
    }

    #[test]
    fn test_parse_qname_missing_terminator() {
        let mut data = encode("example.com");
        data.pop();
        assert_eq!(parse_qname(&data, 0), None);
    }

    #[test]
    fn test_parse_qname_rejects_pointer() {
        assert_eq!(parse_qname(&[0xC0, 0x0C], 0), None);
    }

    #[test]
    fn test_parse_qname_raw_bytes() {
        // Latin-1 0xC9 ('É') is decoded byte-wise and lowercased
        let data = [3, b'c', b'a', 0xC9, 0];
        assert_eq!(parse_qname(&data, 0).as_deref(), Some("caé"));
    }

    #[test]
    fn test_header_fields() {
        let mut data = vec![0u8; 40];
        data[28] = 0xAB;
        data[29] = 0xCD;
        data[30] = 0x01;
        data[33] = 0x01;

        let header = DnsHeader::from_datagram(&data).unwrap();
        assert_eq!(header.id, 0xABCD);
        assert_eq!(header.flags, 0x0100);
        assert_eq!(header.qdcount, 1);
        assert!(!header.is_response());
        assert!(header.flag_bits().contains(DnsFlags::RD));
    }

    #[test]
    fn test_nxdomain_flags_layout() {
        let flags = DnsFlags::from_bits_retain(NXDOMAIN_REPLY_FLAGS);
        assert!(flags.contains(DnsFlags::QR | DnsFlags::RD | DnsFlags::RA));
        assert_eq!(DnsFlags::opcode(NXDOMAIN_REPLY_FLAGS), 0);
        assert_eq!(DnsFlags::rcode(NXDOMAIN_REPLY_FLAGS), RCODE_NXDOMAIN);
    }
}
