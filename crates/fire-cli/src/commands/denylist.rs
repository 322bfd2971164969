//! Denylist commands

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::mpsc;

use super::{persist, Session};

/// Denylist arguments
#[derive(Args, Debug)]
pub struct DenylistArgs {
    #[command(subcommand)]
    pub command: DenylistCommands,
}

/// Denylist subcommands
#[derive(Subcommand, Debug)]
pub enum DenylistCommands {
    /// Add a domain
    Add {
        /// Domain to block, with all its subdomains
        domain: String,
    },

    /// Remove a domain
    Remove {
        /// Domain to unblock
        domain: String,
    },

    /// Show whether a domain or one of its parents is listed
    Check {
        /// Domain to check
        domain: String,
    },

    /// Merge a local hosts-format file
    Import {
        /// Hosts file path
        file: PathBuf,
    },

    /// Download and merge hosts-format lists (default: configured sources)
    Fetch {
        /// List URLs
        urls: Vec<String>,
    },

    /// Number of listed domains
    Count,
}

/// Execute denylist command
pub fn execute(args: DenylistArgs, session: &Session) -> Result<()> {
    let (config, services) = session.open()?;
    let denylist = &services.denylist;

    match args.command {
        DenylistCommands::Add { domain } => {
            denylist.add_domain(&domain);
            println!("{} {}", "✓ Added".green(), domain.to_lowercase().cyan());
        }
        DenylistCommands::Remove { domain } => {
            if denylist.remove_domain(&domain) {
                println!("{} {}", "✓ Removed".green(), domain.cyan());
            } else {
                println!("{} {}", "Not listed:".yellow(), domain.cyan());
            }
        }
        DenylistCommands::Check { domain } => {
            if denylist.is_blocked(&domain) {
                println!("{} {}", domain.cyan(), "is blocked".red());
            } else {
                println!("{} {}", domain.cyan(), "is not listed".green());
            }
            return Ok(());
        }
        DenylistCommands::Import { file } => {
            let reader = File::open(&file)
                .map(BufReader::new)
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let count = denylist
                .load_from_reader(reader)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            println!(
                "{} {count} domain(s) from {}; {} listed",
                "✓ Imported".green(),
                file.display(),
                denylist.count()
            );
        }
        DenylistCommands::Fetch { urls } => {
            let urls = if urls.is_empty() {
                config.denylist.sources.clone()
            } else {
                urls
            };
            if urls.is_empty() {
                bail!("No URLs given and no [denylist] sources configured");
            }
            fetch_all(&services, &urls)?;
        }
        DenylistCommands::Count => {
            println!("{}", denylist.count());
            return Ok(());
        }
    }

    persist(&services)
}

/// Queue every URL on the loader and wait for all of them
fn fetch_all(services: &fire_core::Services, urls: &[String]) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    for url in urls {
        let tx = tx.clone();
        let tag = url.clone();
        services.denylist.load_from_url(url, move |result| {
            let _ = tx.send((tag, result));
        });
    }
    drop(tx);

    let mut failed = 0;
    for (url, result) in rx {
        match result {
            Ok(count) => println!("{} {count} domain(s) from {url}", "✓ Loaded".green()),
            Err(e) => {
                failed += 1;
                println!("{} {url}: {e}", "✗ Failed".red());
            }
        }
    }
    println!("{} domain(s) listed", services.denylist.count());

    if failed == urls.len() {
        bail!("Every denylist source failed");
    }
    Ok(())
}
