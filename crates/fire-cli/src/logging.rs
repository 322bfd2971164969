//! Logging initialization
//!
//! Diagnostics go to stderr so command output on stdout stays clean.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::args::{Args, LogFormat};

/// Initialize logging based on CLI arguments.
///
/// The returned guard flushes the log file when dropped; keep it alive for
/// the whole run.
pub fn init(args: &Args) -> Result<Option<WorkerGuard>> {
    let level = if args.quiet {
        Level::ERROR
    } else {
        match args.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let (file_writer, guard) = match args.log_file {
        Some(ref path) => {
            let (writer, guard) = tracing_appender::non_blocking(open_log_file(path)?);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    match args.log_format {
        LogFormat::Text => {
            let console = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(args.verbose >= 2)
                .with_thread_names(args.verbose >= 3)
                .with_file(args.verbose >= 3)
                .with_line_number(args.verbose >= 3);
            let file = file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w));
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console)
                .with(file)
                .init();
        }
        LogFormat::Json => {
            let console = fmt::layer().json().with_writer(std::io::stderr);
            let file = file_writer.map(|w| fmt::layer().json().with_writer(w));
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console)
                .with(file)
                .init();
        }
        LogFormat::Compact => {
            let console = fmt::layer().compact().with_writer(std::io::stderr);
            let file = file_writer.map(|w| {
                fmt::layer()
                    .compact()
                    .with_ansi(false)
                    .with_writer(w)
            });
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console)
                .with(file)
                .init();
        }
    }

    Ok(guard)
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}
