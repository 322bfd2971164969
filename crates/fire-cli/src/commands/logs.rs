//! Connection log commands

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use super::{persist, Session};

/// Log arguments
#[derive(Args, Debug)]
pub struct LogsArgs {
    #[command(subcommand)]
    pub command: LogsCommands,
}

/// Log subcommands
#[derive(Subcommand, Debug)]
pub enum LogsCommands {
    /// Show the most recent blocked connections
    Show {
        /// Most entries to show
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Drop every entry
    Clear,
}

/// Execute logs command
pub fn execute(args: LogsArgs, session: &Session) -> Result<()> {
    let (_, services) = session.open()?;

    match args.command {
        LogsCommands::Show { limit, json } => {
            let entries = services.logger.get_logs(limit);
            if json {
                let text =
                    serde_json::to_string_pretty(&entries).context("Failed to serialize logs")?;
                println!("{text}");
                return Ok(());
            }

            if entries.is_empty() {
                println!("{}", "No blocked connections".yellow());
                return Ok(());
            }
            println!(
                "{:<15} {:<21} {:>7} {:<13} {}",
                "TIME (ms)".bold(),
                "DESTINATION".bold(),
                "UID".bold(),
                "ACTION".bold(),
                "APPLICATION".bold()
            );
            for entry in entries {
                let destination = format!("{}:{}", entry.dest_ip, entry.dest_port);
                println!(
                    "{:<15} {:<21} {:>7} {:<13} {}",
                    entry.timestamp,
                    destination,
                    entry.uid,
                    entry.action.red(),
                    entry.package_name
                );
            }
        }
        LogsCommands::Clear => {
            services.logger.clear_logs();
            println!("{}", "✓ Cleared connection log".green());
            persist(&services)?;
        }
    }
    Ok(())
}
