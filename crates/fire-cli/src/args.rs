//! Command-line argument parsing

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::commands::Command;

/// fire - on-device packet firewall
///
/// Blocks outgoing traffic per application, per domain and per IP range,
/// and answers lookups of denylisted names with NXDOMAIN.
#[derive(Parser, Debug)]
#[command(name = "fire")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE", global = true, env = "FIRE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding rules, denylist, logs and usage
    #[arg(short = 'd', long, value_name = "DIR", global = true, env = "FIRE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format for logs
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Log file path
    #[arg(long, value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Run in quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text
    Text,
    /// JSON format
    Json,
    /// Compact format
    Compact,
}
