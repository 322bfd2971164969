//! IP and CIDR rule commands

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use fire_core::rules::IpRule;

use super::{persist, Session};

/// IP rule arguments
#[derive(Args, Debug)]
pub struct IpArgs {
    #[command(subcommand)]
    pub command: IpCommands,
}

/// IP rule subcommands
#[derive(Subcommand, Debug)]
pub enum IpCommands {
    /// Add a rule for an address or range (a.b.c.d or a.b.c.d/n)
    Add {
        /// Address or CIDR range
        cidr: String,

        /// Record the range as allowed instead of blocked
        #[arg(long)]
        allow: bool,
    },

    /// Remove every rule for an address
    Remove {
        /// Address as written when the rule was added, without prefix
        ip: String,
    },

    /// List IP rules in evaluation order
    List,
}

/// Execute ip command
pub fn execute(args: IpArgs, session: &Session) -> Result<()> {
    let (_, services) = session.open()?;
    let rules = &services.rules;

    match args.command {
        IpCommands::Add { cidr, allow } => {
            let rule = IpRule::parse_cidr(&cidr, !allow)
                .with_context(|| format!("Invalid address or range: {cidr}"))?;
            println!("{} {}", "✓ Added".green(), rule.to_string().cyan());
            rules.add_ip_rule(rule);
        }
        IpCommands::Remove { ip } => {
            let removed = rules.remove_ip_rule(&ip);
            if removed == 0 {
                println!("{} {}", "No rule for".yellow(), ip.cyan());
            } else {
                println!("{} {removed} rule(s) for {}", "✓ Removed".green(), ip.cyan());
            }
        }
        IpCommands::List => {
            let list = rules.get_ip_rules();
            if list.is_empty() {
                println!("{}", "No IP rules".yellow());
            }
            for (index, rule) in list.iter().enumerate() {
                let state = if rule.blocked {
                    "block".red()
                } else {
                    "allow".green()
                };
                println!("  {:>3}. {state}  {rule}", index + 1);
            }
            return Ok(());
        }
    }

    persist(&services)
}
