//! Check command - explain the decision for one domain

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use fire_core::BlockSource;

use super::Session;

/// Check command arguments
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Domain to check
    pub domain: String,
}

/// Execute check command
pub fn execute(args: CheckArgs, session: &Session) -> Result<()> {
    let (config, services) = session.open()?;
    let interceptor = services.interceptor(&config.dns);
    let domain = args.domain.trim().to_lowercase();

    match interceptor.decide(&domain) {
        Some(BlockSource::Rule(pattern)) => {
            println!(
                "{} {} (domain rule {})",
                domain.cyan(),
                "BLOCKED".red().bold(),
                pattern.yellow()
            );
        }
        Some(BlockSource::Denylist) => {
            println!("{} {} (denylist)", domain.cyan(), "BLOCKED".red().bold());
        }
        None => {
            println!("{} {}", domain.cyan(), "ALLOWED".green().bold());
        }
    }
    Ok(())
}
