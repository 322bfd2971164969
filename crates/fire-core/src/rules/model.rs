//! Rule types and their persisted JSON shape

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Network the device is currently routed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Wi-Fi
    Wifi,
    /// Cellular data
    Mobile,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Wifi => write!(f, "wifi"),
            Transport::Mobile => write!(f, "mobile"),
        }
    }
}

/// Per-application network policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRule {
    /// Package or bundle identifier
    pub package_name: String,
    /// Block while on Wi-Fi
    pub block_wifi: bool,
    /// Block while on mobile data
    pub block_mobile: bool,
}

impl ApplicationRule {
    /// Create a rule
    pub fn new(package_name: impl Into<String>, block_wifi: bool, block_mobile: bool) -> Self {
        Self {
            package_name: package_name.into(),
            block_wifi,
            block_mobile,
        }
    }

    /// Rule blocking the application on every transport
    pub fn blocked(package_name: impl Into<String>) -> Self {
        Self::new(package_name, true, true)
    }

    /// Blocked on at least one transport
    pub fn is_blocked(&self) -> bool {
        self.block_wifi || self.block_mobile
    }

    /// Blocked on `transport`
    pub fn should_block(&self, transport: Transport) -> bool {
        match transport {
            Transport::Wifi => self.block_wifi,
            Transport::Mobile => self.block_mobile,
        }
    }
}

/// Domain pattern policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRule {
    /// Lowercase pattern: exact name, parent zone or `*.zone`
    pub domain: String,
    /// Block matching lookups
    pub blocked: bool,
}

impl DomainRule {
    /// Create a rule, lowercasing the pattern
    pub fn new(domain: &str, blocked: bool) -> Self {
        Self {
            domain: domain.trim().to_lowercase(),
            blocked,
        }
    }
}

/// IPv4 host or CIDR range policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpRule {
    /// Dotted-quad address, kept as written
    pub ip: String,
    /// Prefix length, 32 for a single host
    #[serde(default = "default_prefix")]
    pub prefix_length: u32,
    /// Block matching destinations
    pub blocked: bool,
}

fn default_prefix() -> u32 {
    32
}

impl IpRule {
    /// Create a rule after validating the address and prefix
    pub fn new(ip: &str, prefix_length: u32, blocked: bool) -> Result<Self> {
        let rule = Self {
            ip: ip.trim().to_string(),
            prefix_length,
            blocked,
        };
        rule.network()?;
        Ok(rule)
    }

    /// Rule for a single host
    pub fn host(ip: Ipv4Addr, blocked: bool) -> Self {
        Self {
            ip: ip.to_string(),
            prefix_length: 32,
            blocked,
        }
    }

    /// Parse `a.b.c.d` or `a.b.c.d/n`
    pub fn parse_cidr(text: &str, blocked: bool) -> Result<Self> {
        match text.trim().split_once('/') {
            Some((ip, prefix)) => {
                let prefix = prefix.trim().parse::<u32>().map_err(|_| Error::InvalidIpAddr {
                    addr: text.trim().to_string(),
                })?;
                Self::new(ip, prefix, blocked)
            }
            None => Self::new(text, 32, blocked),
        }
    }

    /// Parsed address and validated prefix
    pub fn network(&self) -> Result<(Ipv4Addr, u32)> {
        let addr = Ipv4Addr::from_str(&self.ip).map_err(|_| Error::InvalidIpAddr {
            addr: self.ip.clone(),
        })?;
        if self.prefix_length > 32 {
            return Err(Error::InvalidPrefix {
                prefix: self.prefix_length,
            });
        }
        Ok((addr, self.prefix_length))
    }

    /// The range as a precomputed network and mask, `None` if invalid
    pub fn compile(&self) -> Option<IpNetwork> {
        self.network()
            .ok()
            .map(|(addr, prefix)| IpNetwork::new(addr, prefix))
    }

    /// Whether `target` falls inside this rule's range.
    ///
    /// A rule whose address does not parse never matches.
    pub fn matches(&self, target: Ipv4Addr) -> bool {
        self.compile().is_some_and(|network| network.contains(target))
    }
}

/// IPv4 range with the mask applied up front
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    network: u32,
    mask: u32,
}

impl IpNetwork {
    /// Range of `addr/prefix`
    pub fn new(addr: Ipv4Addr, prefix: u32) -> Self {
        let mask = prefix_mask(prefix);
        Self {
            network: u32::from(addr) & mask,
            mask,
        }
    }

    /// Whether `target` is inside the range
    pub fn contains(&self, target: Ipv4Addr) -> bool {
        (u32::from(target) & self.mask) == self.network
    }
}

impl fmt::Display for IpRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.prefix_length)
    }
}

/// Network mask for a prefix length; prefix 0 matches everything
pub fn prefix_mask(prefix: u32) -> u32 {
    match prefix {
        0 => 0,
        p if p >= 32 => u32::MAX,
        p => u32::MAX << (32 - p),
    }
}
