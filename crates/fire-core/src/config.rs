//! Configuration management for the firewall
//!
//! Strongly-typed settings loaded from TOML. Every section falls back to
//! its defaults, so an empty file is a valid configuration.

use crate::error::{Error, Result};
use crate::identity::Uid;
use crate::packet::dns::NXDOMAIN_REPLY_FLAGS;
use crate::packet::{ports, MAX_PACKET_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General application settings
    pub general: GeneralConfig,

    /// DNS interception settings
    pub dns: DnsConfig,

    /// Remote denylist sources
    pub denylist: DenylistConfig,

    /// Connection log settings
    pub logging: LoggingConfig,

    /// Usage accounting settings
    pub usage: UsageConfig,

    /// Snapshot persistence settings
    pub persistence: PersistenceConfig,

    /// Tunnel device settings
    pub tunnel: TunnelConfig,

    /// Static package to identity table
    pub identity: IdentityConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| Error::ConfigNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(Error::from)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.dns.port == 0 {
            return Err(Error::config_value("dns.port", "Must be between 1 and 65535"));
        }

        if self.logging.capacity == 0 {
            return Err(Error::config_value("logging.capacity", "Must be at least 1"));
        }

        if self.usage.persist_every == 0 {
            return Err(Error::config_value("usage.persist_every", "Must be at least 1"));
        }

        if self.persistence.queue_capacity == 0 {
            return Err(Error::config_value(
                "persistence.queue_capacity",
                "Must be at least 1",
            ));
        }

        if self.tunnel.mtu < 576 || self.tunnel.mtu > MAX_PACKET_SIZE {
            return Err(Error::config_value(
                "tunnel.mtu",
                format!("Must be between 576 and {MAX_PACKET_SIZE}"),
            ));
        }
        if self.tunnel.buffer_size < self.tunnel.mtu {
            return Err(Error::config_value(
                "tunnel.buffer_size",
                "Must not be smaller than the MTU",
            ));
        }

        for source in &self.denylist.sources {
            if !(source.starts_with("http://") || source.starts_with("https://")) {
                return Err(Error::config_value(
                    "denylist.sources",
                    format!("Not an http(s) URL: {source}"),
                ));
            }
        }

        if let Some((package, uid)) = self.identity.packages.iter().find(|(_, uid)| **uid < 0) {
            return Err(Error::config_value(
                "identity.packages",
                format!("Negative identity {uid} for {package}"),
            ));
        }

        Ok(())
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Instance name, shown in logs
    pub name: String,
    /// Directory holding persisted snapshots; platform default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: "fire".to_string(),
            data_dir: None,
        }
    }
}

/// DNS interception configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Inspect outgoing DNS queries
    pub intercept: bool,
    /// UDP destination port treated as DNS
    pub port: u16,
    /// Flags word written into synthesized replies
    pub reply_flags: u16,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            intercept: true,
            port: ports::DNS,
            reply_flags: NXDOMAIN_REPLY_FLAGS,
        }
    }
}

/// Remote denylist configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DenylistConfig {
    /// Hosts-format lists merged into the denylist
    pub sources: Vec<String>,
    /// Fetch every source when the pipeline starts
    pub load_on_start: bool,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Whole-request deadline in seconds, body download included
    pub request_timeout_secs: u64,
}

impl Default for DenylistConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            load_on_start: false,
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
        }
    }
}

impl DenylistConfig {
    /// Connect timeout as a Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Request deadline as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Connection log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Most entries kept
    pub capacity: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            capacity: crate::logger::DEFAULT_CAPACITY,
        }
    }
}

/// Usage accounting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    /// Persist allowed-traffic counters every N allowed packets
    pub persist_every: u64,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            persist_every: crate::usage::DEFAULT_PERSIST_EVERY,
        }
    }
}

/// Snapshot persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Pending snapshots before writers block
    pub queue_capacity: usize,
    /// Seconds between re-reads of state edited by other processes, 0 disables
    pub reload_interval_secs: u64,
}

impl PersistenceConfig {
    /// Reload period, `None` when reloading is disabled
    pub fn reload_interval(&self) -> Option<Duration> {
        (self.reload_interval_secs > 0).then(|| Duration::from_secs(self.reload_interval_secs))
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            queue_capacity: crate::store::DEFAULT_QUEUE_CAPACITY,
            reload_interval_secs: 10,
        }
    }
}

/// Tunnel device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Bytes read per call
    pub buffer_size: usize,
    /// Interface MTU
    pub mtu: usize,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            buffer_size: MAX_PACKET_SIZE,
            mtu: 1500,
        }
    }
}

/// Static identity table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Package identifier to numeric identity
    pub packages: BTreeMap<String, Uid>,
}
