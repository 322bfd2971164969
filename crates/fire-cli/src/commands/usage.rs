//! Usage accounting commands

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use fire_core::UsageStats;

use super::{persist, Session};

/// Usage arguments
#[derive(Args, Debug)]
pub struct UsageArgs {
    #[command(subcommand)]
    pub command: UsageCommands,
}

/// Usage subcommands
#[derive(Subcommand, Debug)]
pub enum UsageCommands {
    /// Show totals and the per-application breakdown
    Show {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Zero every counter
    Reset,
}

/// Execute usage command
pub fn execute(args: UsageArgs, session: &Session) -> Result<()> {
    let (_, services) = session.open()?;

    match args.command {
        UsageCommands::Show { json } => {
            let report = services.usage.get_usage_stats();
            if json {
                let text = serde_json::to_string_pretty(&report)
                    .context("Failed to serialize usage report")?;
                println!("{text}");
                return Ok(());
            }

            print_header();
            for (name, stats) in &report.by_app {
                print_row(name, stats);
            }
            if report.unattributed.total_packets() > 0 {
                print_row("(unresolved)", &report.unattributed);
            }
            println!("{}", "─".repeat(72).bright_blue());
            print_row("TOTAL", &report.totals);
        }
        UsageCommands::Reset => {
            services.usage.reset_stats();
            println!("{}", "✓ Usage counters reset".green());
            persist(&services)?;
        }
    }
    Ok(())
}

fn print_header() {
    println!(
        "{:<32} {:>9} {:>9} {:>9} {:>9}",
        "APPLICATION".bold(),
        "ALLOWED".bold(),
        "BLOCKED".bold(),
        "PKT OK".bold(),
        "PKT DROP".bold()
    );
}

fn print_row(name: &str, stats: &UsageStats) {
    println!(
        "{:<32} {:>9} {:>9} {:>9} {:>9}",
        name,
        human_bytes(stats.bytes_allowed),
        human_bytes(stats.bytes_blocked),
        stats.packets_allowed,
        stats.packets_blocked
    );
}

#[allow(clippy::cast_precision_loss)]
fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
