//! CLI commands

pub mod app;
pub mod check;
pub mod completions;
pub mod config;
pub mod denylist;
pub mod domain;
pub mod ip;
pub mod logs;
pub mod run;
pub mod usage;

use anyhow::{Context, Result};
use clap::Subcommand;
use directories::ProjectDirs;
use fire_core::{Config, Services};
use fire_platform::{ChainResolver, FileStore, HttpFetcher, PasswdResolver, StaticResolver};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the firewall pipeline (main command)
    Run(run::RunArgs),

    /// Application rules
    App(app::AppArgs),

    /// Domain rules
    Domain(domain::DomainArgs),

    /// IP and CIDR rules
    Ip(ip::IpArgs),

    /// Blocked-domain list
    Denylist(denylist::DenylistArgs),

    /// Show whether a domain lookup would be blocked
    Check(check::CheckArgs),

    /// Blocked-connection log
    Logs(logs::LogsArgs),

    /// Traffic accounting
    Usage(usage::UsageArgs),

    /// Configuration management
    Config(config::ConfigArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Config file and data directory selection shared by every command
#[derive(Debug, Clone, Default)]
pub struct Session {
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
}

impl Session {
    /// Create a session from global options
    pub fn new(config_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Self {
        Self {
            config_path,
            data_dir,
        }
    }

    /// Load and validate the configuration: explicit path, then the search
    /// paths, then defaults
    pub fn config(&self) -> Result<Config> {
        let config = match self.config_path.clone().or_else(find_config_file) {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration");
                Config::load(&path)
                    .with_context(|| format!("Failed to load config from {}", path.display()))?
            }
            None => Config::default(),
        };
        config
            .validate()
            .context("Configuration validation failed")?;
        Ok(config)
    }

    /// Directory holding persisted state
    pub fn data_dir(&self, config: &Config) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| config.general.data_dir.clone())
            .or_else(|| project_dirs().map(|dirs| dirs.data_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("fire-data"))
    }

    /// Build every service over the file store
    pub fn open(&self) -> Result<(Config, Services)> {
        let config = self.config()?;
        let data_dir = self.data_dir(&config);
        let store = FileStore::open(&data_dir)
            .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?;
        let fetcher =
            HttpFetcher::from_config(&config.denylist).context("Failed to create HTTP client")?;

        let services = Services::new(
            &config,
            Arc::new(store),
            Arc::new(resolver(&config)),
            Arc::new(fetcher),
        )
        .context("Failed to initialize services")?;
        Ok((config, services))
    }
}

/// Static table first, then the account database when readable
fn resolver(config: &Config) -> ChainResolver {
    let chain = ChainResolver::new().with(Arc::new(StaticResolver::from_config(&config.identity)));
    match PasswdResolver::system() {
        Ok(passwd) => chain.with(Arc::new(passwd)),
        Err(e) => {
            debug!(error = %e, "Account database unavailable");
            chain
        }
    }
}

/// Write pending snapshots, reporting failures
pub fn persist(services: &Services) -> Result<()> {
    services.flush().context("Failed to persist changes")
}

pub(crate) fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "fire")
}

/// Config file names searched in the working directory
pub(crate) const LOCAL_CONFIG_FILES: &[&str] = &["fire.toml", "config.toml"];

pub(crate) fn user_config_file() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

fn find_config_file() -> Option<PathBuf> {
    LOCAL_CONFIG_FILES
        .iter()
        .map(PathBuf::from)
        .chain(user_config_file())
        .find(|path| Path::new(path).is_file())
}
