//! Domain rule commands

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use fire_core::rules::DomainRule;

use super::{persist, Session};

/// Domain rule arguments
#[derive(Args, Debug)]
pub struct DomainArgs {
    #[command(subcommand)]
    pub command: DomainCommands,
}

/// Domain rule subcommands
#[derive(Subcommand, Debug)]
pub enum DomainCommands {
    /// Add or replace a rule (use *.example.com for wildcard)
    Add {
        /// Domain pattern
        pattern: String,

        /// Record the pattern as allowed instead of blocked
        #[arg(long)]
        allow: bool,
    },

    /// Remove a rule
    Remove {
        /// Domain pattern
        pattern: String,
    },

    /// List domain rules
    List,
}

/// Execute domain command
pub fn execute(args: DomainArgs, session: &Session) -> Result<()> {
    let (_, services) = session.open()?;
    let rules = &services.rules;

    match args.command {
        DomainCommands::Add { pattern, allow } => {
            let rule = DomainRule::new(&pattern, !allow);
            println!(
                "{} {} ({})",
                "✓ Added".green(),
                rule.domain.cyan(),
                if rule.blocked { "blocked" } else { "allowed" }
            );
            rules.add_domain_rule(rule);
        }
        DomainCommands::Remove { pattern } => {
            if rules.remove_domain_rule(&pattern) {
                println!("{} {}", "✓ Removed".green(), pattern.cyan());
            } else {
                println!("{} {}", "No rule for".yellow(), pattern.cyan());
            }
        }
        DomainCommands::List => {
            let list = rules.get_domain_rules();
            if list.is_empty() {
                println!("{}", "No domain rules".yellow());
            }
            for rule in list {
                let state = if rule.blocked {
                    "block".red()
                } else {
                    "allow".green()
                };
                println!("  {state}  {}", rule.domain);
            }
            return Ok(());
        }
    }

    persist(&services)
}
