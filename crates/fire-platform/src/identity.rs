//! Identity resolvers
//!
//! On a desktop or server host the closest thing to an application identity
//! is the account that owns a socket, so package names map to account
//! names in the local account database.

use crate::error::{PlatformError, Result};
use fire_core::config::IdentityConfig;
use fire_core::identity::{IdentityResolver, Uid};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Default location of the account database
pub const PASSWD_PATH: &str = "/etc/passwd";

/// Two-way name/identity table
#[derive(Debug, Clone, Default)]
struct Table {
    by_name: HashMap<String, Uid>,
    by_uid: HashMap<Uid, String>,
}

impl Table {
    fn insert(&mut self, name: String, uid: Uid) {
        // First name wins for the reverse direction
        self.by_uid.entry(uid).or_insert_with(|| name.clone());
        self.by_name.insert(name, uid);
    }
}

/// Resolves account names from a `passwd(5)` formatted database
#[derive(Debug, Clone, Default)]
pub struct PasswdResolver {
    table: Table,
}

impl PasswdResolver {
    /// Read the system account database
    pub fn system() -> Result<Self> {
        Self::load(PASSWD_PATH)
    }

    /// Read an account database from `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse `name:password:uid:gid:gecos:home:shell` lines
    pub fn parse(content: &str) -> Result<Self> {
        let mut table = Table::default();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split(':');
            let name = fields.next().unwrap_or_default();
            let uid = fields.nth(1).ok_or_else(|| PlatformError::AccountParse {
                line: index + 1,
                message: "missing uid field".to_string(),
            })?;
            let uid: Uid = uid.parse().map_err(|_| PlatformError::AccountParse {
                line: index + 1,
                message: format!("invalid uid '{uid}'"),
            })?;
            if name.is_empty() {
                return Err(PlatformError::AccountParse {
                    line: index + 1,
                    message: "empty name".to_string(),
                });
            }
            table.insert(name.to_string(), uid);
        }
        debug!(accounts = table.by_name.len(), "Account database loaded");
        Ok(Self { table })
    }

    /// Number of accounts known
    pub fn len(&self) -> usize {
        self.table.by_name.len()
    }

    /// Whether no account is known
    pub fn is_empty(&self) -> bool {
        self.table.by_name.is_empty()
    }
}

impl IdentityResolver for PasswdResolver {
    fn resolve_uid(&self, package: &str) -> Option<Uid> {
        self.table.by_name.get(package).copied()
    }

    fn resolve_name(&self, uid: Uid) -> Option<String> {
        self.table.by_uid.get(&uid).cloned()
    }
}

/// Resolves from the configured `[identity]` table
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    table: Table,
}

impl StaticResolver {
    /// Build from explicit pairs
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Uid)>,
        S: Into<String>,
    {
        let mut table = Table::default();
        for (name, uid) in entries {
            table.insert(name.into(), uid);
        }
        Self { table }
    }

    /// Build from configuration
    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(
            config
                .packages
                .iter()
                .map(|(name, uid)| (name.clone(), *uid)),
        )
    }
}

impl IdentityResolver for StaticResolver {
    fn resolve_uid(&self, package: &str) -> Option<Uid> {
        self.table.by_name.get(package).copied()
    }

    fn resolve_name(&self, uid: Uid) -> Option<String> {
        self.table.by_uid.get(&uid).cloned()
    }
}

/// Consults resolvers in order, first answer wins
#[derive(Clone, Default)]
pub struct ChainResolver {
    resolvers: Vec<Arc<dyn IdentityResolver>>,
}

impl ChainResolver {
    /// Empty chain, resolves nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resolver
    #[must_use]
    pub fn with(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }
}

impl IdentityResolver for ChainResolver {
    fn resolve_uid(&self, package: &str) -> Option<Uid> {
        self.resolvers.iter().find_map(|r| r.resolve_uid(package))
    }

    fn resolve_name(&self, uid: Uid) -> Option<String> {
        self.resolvers.iter().find_map(|r| r.resolve_name(uid))
    }
}
