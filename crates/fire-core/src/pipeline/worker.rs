//! Tunnel read loop on a dedicated thread

use super::{Context, Pipeline, Stats, Verdict};
use crate::error::{Error, Result};
use crate::identity::OwnerLookup;
use crate::packet::split_datagrams;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Pause after a read that returned no data
const IDLE_BACKOFF: Duration = Duration::from_millis(10);

const WORKER_NAME: &str = "fire-pipeline";

/// Virtual network interface handle
pub trait TunnelIo: Send {
    /// Read one or more complete IP datagrams.
    ///
    /// `Ok(0)` and the `WouldBlock`, `TimedOut` and `Interrupted` error kinds
    /// mean no data is available right now.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write one IP datagram back to the device
    fn write(&mut self, packet: &[u8]) -> io::Result<()>;

    /// Release the device
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Relays allowed datagrams to the real network
pub trait Forwarder: Send {
    /// Send `packet` on its way
    fn forward(&mut self, packet: &[u8]) -> io::Result<()>;
}

/// Drops allowed datagrams. The firewall only decides; relaying is left to
/// a platform-specific forwarder.
#[derive(Debug, Default)]
pub struct DiscardForwarder;

impl Forwarder for DiscardForwarder {
    fn forward(&mut self, packet: &[u8]) -> io::Result<()> {
        trace!(len = packet.len(), "Discarding allowed packet");
        Ok(())
    }
}

/// Runs a [`Pipeline`] over a tunnel until stopped or the device fails
pub struct Worker {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<Stats>>>,
}

impl Worker {
    /// Start the read loop on its own thread
    pub fn spawn<T>(
        pipeline: Arc<Pipeline>,
        tunnel: T,
        owners: Arc<dyn OwnerLookup>,
        forwarder: Box<dyn Forwarder>,
        buffer_size: usize,
    ) -> Result<Self>
    where
        T: TunnelIo + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || {
                let mut io = LoopIo {
                    tunnel,
                    forwarder,
                    owners,
                };
                run(&pipeline, &mut io, &flag, buffer_size)
            })?;

        info!(buffer_size, "Pipeline worker started");
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Whether the read loop is still going
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Flag that stops the loop when cleared; for signal handlers
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Signal the loop to exit, wait for it and return its statistics
    pub fn stop(mut self) -> Result<Stats> {
        self.running.store(false, Ordering::SeqCst);
        self.join()
    }

    /// Wait for the loop to exit on its own
    pub fn wait(mut self) -> Result<Stats> {
        self.join()
    }

    fn join(&mut self) -> Result<Stats> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::WorkerStopped(WORKER_NAME))?,
            None => Err(Error::WorkerStopped(WORKER_NAME)),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.running.store(false, Ordering::SeqCst);
            if let Err(e) = self.join() {
                warn!(error = %e, "Pipeline worker ended with error");
            }
        }
    }
}

struct LoopIo<T> {
    tunnel: T,
    forwarder: Box<dyn Forwarder>,
    owners: Arc<dyn OwnerLookup>,
}

fn is_idle(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

fn run<T: TunnelIo>(
    pipeline: &Pipeline,
    io: &mut LoopIo<T>,
    running: &AtomicBool,
    buffer_size: usize,
) -> Result<Stats> {
    let mut buf = vec![0u8; buffer_size];
    let mut ctx = Context::new();

    let result = loop {
        if !running.load(Ordering::SeqCst) {
            break Ok(());
        }

        let n = match io.tunnel.read(&mut buf) {
            Ok(0) => {
                thread::sleep(IDLE_BACKOFF);
                continue;
            }
            Ok(n) => n,
            Err(e) if is_idle(&e) => {
                thread::sleep(IDLE_BACKOFF);
                continue;
            }
            Err(e) => {
                error!(error = %e, "Tunnel read failed");
                break Err(Error::Io(e));
            }
        };

        if let Err(e) = handle_batch(pipeline, io, &buf[..n], &mut ctx) {
            error!(error = %e, "Tunnel write failed");
            break Err(Error::Io(e));
        }
    };

    running.store(false, Ordering::SeqCst);
    pipeline.flush();
    if let Err(e) = io.tunnel.close() {
        warn!(error = %e, "Failed to close tunnel");
    }

    let stats = ctx.get_stats();
    debug!(?stats, "Pipeline worker stopped");
    result.map(|()| stats)
}

fn handle_batch<T: TunnelIo>(
    pipeline: &Pipeline,
    io: &mut LoopIo<T>,
    batch: &[u8],
    ctx: &mut Context,
) -> io::Result<()> {
    for raw in split_datagrams(batch) {
        let owner = io.owners.owner_of(raw);
        match pipeline.process(raw, owner, ctx) {
            Verdict::Reply(reply) => io.tunnel.write(&reply)?,
            Verdict::Allow => {
                if let Err(e) = io.forwarder.forward(raw) {
                    warn!(error = %e, "Forwarding failed");
                }
            }
            Verdict::Drop => {}
        }
    }
    Ok(())
}
