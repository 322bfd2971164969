//! Application rule commands

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use fire_core::rules::ApplicationRule;

use super::{persist, Session};

/// Application rule arguments
#[derive(Args, Debug)]
pub struct AppArgs {
    #[command(subcommand)]
    pub command: AppCommands,
}

/// Application rule subcommands
#[derive(Subcommand, Debug)]
pub enum AppCommands {
    /// Block an application, replacing any existing rule for it
    Add {
        /// Package or account name
        package: String,

        /// Block only on Wi-Fi
        #[arg(long, conflicts_with = "mobile_only")]
        wifi_only: bool,

        /// Block only on mobile data
        #[arg(long)]
        mobile_only: bool,
    },

    /// Remove an application's rule
    Remove {
        /// Package or account name
        package: String,
    },

    /// List application rules
    List,

    /// Remove every application rule
    Clear,

    /// Replace all rules with the given applications, blocked everywhere
    SetBlocked {
        /// Package or account names
        packages: Vec<String>,
    },
}

/// Execute app command
pub fn execute(args: AppArgs, session: &Session) -> Result<()> {
    let (_, services) = session.open()?;
    let rules = &services.rules;

    match args.command {
        AppCommands::Add {
            package,
            wifi_only,
            mobile_only,
        } => {
            let rule = ApplicationRule::new(&package, !mobile_only, !wifi_only);
            rules.add_app_rule(rule);
            println!("{} {}", "✓ Blocked".green(), package.cyan());
        }
        AppCommands::Remove { package } => {
            if rules.remove_app_rule(&package) {
                println!("{} {}", "✓ Removed".green(), package.cyan());
            } else {
                println!("{} {}", "No rule for".yellow(), package.cyan());
            }
        }
        AppCommands::List => {
            let list = rules.get_app_rules();
            if list.is_empty() {
                println!("{}", "No application rules".yellow());
            }
            for rule in list {
                println!(
                    "{:<40} wifi: {:<5} mobile: {}",
                    rule.package_name.cyan(),
                    flag(rule.block_wifi),
                    flag(rule.block_mobile)
                );
            }
            return Ok(());
        }
        AppCommands::Clear => {
            rules.clear_app_rules();
            println!("{}", "✓ Cleared application rules".green());
        }
        AppCommands::SetBlocked { packages } => {
            let count = packages.len();
            rules.set_blocked_apps(packages);
            println!("{} {count} application(s)", "✓ Blocked".green());
        }
    }

    let resolved = services.rules_changed();
    println!("  {resolved} application(s) currently resolvable");
    persist(&services)
}

fn flag(blocked: bool) -> String {
    if blocked {
        "block".red().to_string()
    } else {
        "allow".green().to_string()
    }
}
