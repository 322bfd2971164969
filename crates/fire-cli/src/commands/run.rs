//! Run command - main firewall execution

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use fire_core::identity::UnknownOwner;
use fire_core::pipeline::DiscardForwarder;
use fire_core::rules::Transport;
use fire_core::{Services, Stats, Worker};
use fire_platform::tunnel::DEFAULT_READ_TIMEOUT;
use fire_platform::UdpTunnel;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{persist, Session};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Run command arguments
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Address receiving tunnelled datagrams
    #[arg(short, long, default_value = "127.0.0.1:7654")]
    pub listen: SocketAddr,

    /// Only exchange datagrams with this peer
    #[arg(long)]
    pub peer: Option<SocketAddr>,

    /// Current network transport, selects per-transport app blocking
    #[arg(short, long, value_enum)]
    pub transport: Option<TransportArg>,

    /// Do not fetch configured denylist sources at start
    #[arg(long)]
    pub skip_fetch: bool,

    /// Load everything and report, without opening the tunnel
    #[arg(long)]
    pub dry_run: bool,
}

/// Network transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    /// Wi-Fi
    Wifi,
    /// Mobile data
    Mobile,
}

impl From<TransportArg> for Transport {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Wifi => Transport::Wifi,
            TransportArg::Mobile => Transport::Mobile,
        }
    }
}

/// Execute the run command
pub fn execute(args: RunArgs, session: &Session) -> Result<()> {
    info!("Starting firewall...");

    let (config, services) = session.open()?;
    info!(
        name = %config.general.name,
        data_dir = %session.data_dir(&config).display(),
        "Loaded configuration"
    );

    services.filter.set_transport(args.transport.map(Transport::from));

    if config.denylist.load_on_start && !args.skip_fetch {
        services.load_denylist_sources(&config.denylist.sources);
    }

    print_rules(&services);

    if args.dry_run {
        warn!("Dry run mode - the tunnel is not opened");
        return Ok(());
    }

    let mut tunnel = UdpTunnel::bind(args.listen, DEFAULT_READ_TIMEOUT)
        .with_context(|| format!("Failed to bind tunnel socket on {}", args.listen))?;
    if let Some(peer) = args.peer {
        tunnel = tunnel
            .connect(peer)
            .with_context(|| format!("Failed to connect tunnel to {peer}"))?;
    }

    let worker = Worker::spawn(
        Arc::new(services.pipeline(&config)),
        tunnel,
        Arc::new(UnknownOwner),
        Box::new(DiscardForwarder),
        config.tunnel.buffer_size,
    )
    .context("Failed to start pipeline worker")?;

    // Set up signal handler
    let running = worker.running_flag();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down...");
        running.store(false, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    println!(
        "{} {} (Ctrl+C to stop)",
        "Listening on".green(),
        args.listen.to_string().cyan()
    );

    let start_time = Instant::now();
    let reload_every = config.persistence.reload_interval();
    let mut last_reload = Instant::now();
    while worker.is_running() {
        thread::sleep(POLL_INTERVAL);

        // Pick up edits made by other `fire` invocations
        if let Some(every) = reload_every {
            if last_reload.elapsed() >= every {
                match services.reload() {
                    Ok(blocked) => debug!(blocked, "Reloaded rules and denylist"),
                    Err(e) => warn!(error = %e, "Failed to reload persisted state"),
                }
                last_reload = Instant::now();
            }
        }
    }

    let result = worker.wait();
    persist(&services)?;
    let stats = result.context("Pipeline worker failed")?;

    print_summary(&stats, start_time.elapsed());
    info!("Firewall stopped");
    Ok(())
}

fn print_rules(services: &Services) {
    println!("{}", "═".repeat(50).bright_blue());
    println!(
        "  Application rules: {} ({} resolved)",
        services.rules.get_app_rules().len(),
        services.filter.blocked_uids().len()
    );
    println!("  Domain rules:      {}", services.rules.get_domain_rules().len());
    println!("  IP rules:          {}", services.rules.get_ip_rules().len());
    println!("  Denylist:          {}", services.denylist.count());
    if let Some(transport) = services.filter.transport() {
        println!("  Transport:         {transport}");
    }
    println!("{}", "═".repeat(50).bright_blue());
}

fn print_summary(stats: &Stats, elapsed: Duration) {
    println!(
        "Session ended: {} packets in {:.1}s",
        stats.packets_processed,
        elapsed.as_secs_f64()
    );
    println!(
        "  allowed {}, dropped {}, dns blocked {}, passed {}, malformed {}",
        stats.packets_allowed.to_string().green(),
        stats.packets_dropped.to_string().red(),
        stats.dns_blocked.to_string().red(),
        stats.passed_through,
        stats.malformed
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_arg() {
        assert_eq!(Transport::from(TransportArg::Wifi), Transport::Wifi);
        assert_eq!(Transport::from(TransportArg::Mobile), Transport::Mobile);
    }
}
