//! Config command - configuration management

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use fire_core::Config;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{user_config_file, Session, LOCAL_CONFIG_FILES};

/// Config command arguments
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Generate a configuration file with every default spelled out
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "fire.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Config file to validate
        file: PathBuf,
    },

    /// Show config file and data directory locations
    Paths,
}

/// Execute config command
pub fn execute(args: ConfigArgs, session: &Session) -> Result<()> {
    match args.action {
        ConfigAction::Show => show_config(session),
        ConfigAction::Generate { output, force } => generate_config(&output, force),
        ConfigAction::Validate { file } => validate_config(&file),
        ConfigAction::Paths => show_paths(session),
    }
}

fn show_config(session: &Session) -> Result<()> {
    let config = session.config()?;
    let toml_str = config.to_toml().context("Failed to serialize config")?;
    println!("{toml_str}");
    Ok(())
}

fn generate_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    let toml_str = Config::default()
        .to_toml()
        .context("Failed to serialize config")?;
    let content = format!(
        "# fire configuration\n\
         # Every section is optional; omitted keys keep these defaults.\n\n\
         {toml_str}"
    );

    std::fs::write(output, content)
        .with_context(|| format!("Failed to write config to {}", output.display()))?;

    info!(path = %output.display(), "Generated config file");
    println!("Configuration file generated: {}", output.display());
    Ok(())
}

fn validate_config(file: &Path) -> Result<()> {
    let config = Config::load(file)
        .with_context(|| format!("Failed to load config from {}", file.display()))?;
    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());
    println!("  DNS interception: {}", config.dns.intercept);
    println!("  DNS port: {}", config.dns.port);
    println!("  Denylist sources: {}", config.denylist.sources.len());
    println!("  Log capacity: {}", config.logging.capacity);
    println!("  Known identities: {}", config.identity.packages.len());
    Ok(())
}

fn show_paths(session: &Session) -> Result<()> {
    println!("Configuration file search paths:");
    println!();
    let mut index = 1;
    for name in LOCAL_CONFIG_FILES {
        println!("  {index}. ./{name}");
        index += 1;
    }
    if let Some(path) = user_config_file() {
        println!("  {index}. {}", path.display());
    }

    println!();
    let config = session.config().unwrap_or_default();
    println!("Data directory: {}", session.data_dir(&config).display());
    Ok(())
}
