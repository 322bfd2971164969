//! fire CLI
//!
//! Command-line interface for the on-device firewall.

mod args;
mod commands;
mod logging;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use args::Args;
use commands::{Command, Session};

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging; the guard flushes the log file on exit
    let _guard = logging::init(&args)?;

    if matches!(args.command, Command::Run(_)) && !args.quiet {
        print_banner();
    }

    let result = run(args);

    if let Err(ref e) = result {
        error!("Fatal error: {:#}", e);
    }

    result
}

fn run(args: Args) -> Result<()> {
    let session = Session::new(args.config, args.data_dir);

    match args.command {
        Command::Run(run_args) => commands::run::execute(run_args, &session),
        Command::App(app_args) => commands::app::execute(app_args, &session),
        Command::Domain(domain_args) => commands::domain::execute(domain_args, &session),
        Command::Ip(ip_args) => commands::ip::execute(ip_args, &session),
        Command::Denylist(denylist_args) => {
            commands::denylist::execute(denylist_args, &session)
        }
        Command::Check(check_args) => commands::check::execute(check_args, &session),
        Command::Logs(logs_args) => commands::logs::execute(logs_args, &session),
        Command::Usage(usage_args) => commands::usage::execute(usage_args, &session),
        Command::Config(config_args) => commands::config::execute(config_args, &session),
        Command::Completions(comp_args) => commands::completions::execute(&comp_args),
    }
}

fn print_banner() {
    use colored::Colorize;

    println!();
    println!("{}", "╔═══════════════════════════════════════════════════════╗".cyan());
    println!(
        "{}{}{}",
        "║  ".cyan(),
        format!("fire v{:<10}", env!("CARGO_PKG_VERSION")).green().bold(),
        "                                     ║".cyan()
    );
    println!(
        "{}{}{}",
        "║  ".cyan(),
        "On-device packet firewall".white(),
        "                            ║".cyan()
    );
    println!("{}", "╚═══════════════════════════════════════════════════════╝".cyan());
    println!();
}
