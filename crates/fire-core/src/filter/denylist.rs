//! Denylist cache
//!
//! A flat set of blocked domains. A lookup blocks a name when the name or
//! any of its parent zones is listed. Lists in hosts-file format can be
//! merged in from a reader or fetched in the background.

use crate::error::{Error, Result};
use crate::store::{keys, SnapshotWriter};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Weak};
use std::thread;
use tracing::{debug, info, warn};

/// Sentinel addresses marking a hosts entry as a block
const SENTINELS: [&str; 2] = ["0.0.0.0", "127.0.0.1"];

/// Names hosts files list for loopback, never blocked
const LOCAL_NAMES: [&str; 2] = ["localhost", "localhost.localdomain"];

const LOADER_NAME: &str = "denylist-loader";

/// Retrieves remote hosts-format lists
pub trait ListFetcher: Send + Sync {
    /// Open `url` and stream its body
    fn fetch(&self, url: &str) -> Result<Box<dyn BufRead + Send>>;
}

/// Completion callback of a background load: parsed domain count or error
pub type LoadCallback = Box<dyn FnOnce(Result<usize>) + Send>;

struct LoadJob {
    url: String,
    on_done: LoadCallback,
}

struct Shared {
    domains: RwLock<HashSet<String>>,
    writer: Arc<SnapshotWriter>,
}

impl Shared {
    fn persist(&self, domains: &HashSet<String>) {
        if let Err(e) = self
            .writer
            .save(keys::DENYLIST, keys::BLOCKED_DOMAINS, domains)
        {
            warn!(error = %e, "Failed to persist denylist");
        }
    }

    fn merge(&self, parsed: HashSet<String>) {
        let mut domains = self.domains.write();
        domains.extend(parsed);
        self.persist(&domains);
    }
}

/// Set of blocked domains with ancestor-aware lookup
pub struct Denylist {
    shared: Arc<Shared>,
    fetcher: Arc<dyn ListFetcher>,
    loader: Mutex<Option<Sender<LoadJob>>>,
}

impl Denylist {
    /// Create a denylist, restoring the persisted set
    pub fn new(writer: Arc<SnapshotWriter>, fetcher: Arc<dyn ListFetcher>) -> Self {
        let denylist = Self {
            shared: Arc::new(Shared {
                domains: RwLock::new(HashSet::new()),
                writer,
            }),
            fetcher,
            loader: Mutex::new(None),
        };
        if let Err(e) = denylist.reload() {
            warn!(error = %e, "Failed to restore denylist");
        }
        denylist
    }

    /// Replace the in-memory set with the persisted one
    pub fn reload(&self) -> Result<()> {
        let stored: Option<Vec<String>> = self
            .shared
            .writer
            .load(keys::DENYLIST, keys::BLOCKED_DOMAINS)?;
        let mut domains = self.shared.domains.write();
        *domains = stored.unwrap_or_default().into_iter().collect();
        debug!(count = domains.len(), "Denylist restored");
        Ok(())
    }

    /// Whether `domain` or any of its parent zones is listed
    pub fn is_blocked(&self, domain: &str) -> bool {
        if domain.is_empty() {
            return false;
        }
        let domain = domain.to_lowercase();
        let domains = self.shared.domains.read();

        let mut current = domain.as_str();
        loop {
            if domains.contains(current) {
                return true;
            }
            match current.find('.') {
                Some(pos) => current = &current[pos + 1..],
                None => return false,
            }
        }
    }

    /// Exact membership, no ancestor walk
    pub fn contains(&self, domain: &str) -> bool {
        self.shared.domains.read().contains(&domain.to_lowercase())
    }

    /// Add one domain
    pub fn add_domain(&self, domain: &str) {
        let domain = domain.trim().to_lowercase();
        if domain.is_empty() {
            return;
        }
        let mut domains = self.shared.domains.write();
        domains.insert(domain);
        self.shared.persist(&domains);
    }

    /// Remove one domain, returning whether it was listed
    pub fn remove_domain(&self, domain: &str) -> bool {
        let domain = domain.trim().to_lowercase();
        let mut domains = self.shared.domains.write();
        let removed = domains.remove(&domain);
        self.shared.persist(&domains);
        removed
    }

    /// Number of listed domains
    pub fn count(&self) -> usize {
        self.shared.domains.read().len()
    }

    /// Listed domains, sorted
    pub fn domains(&self) -> Vec<String> {
        let mut result: Vec<String> = self.shared.domains.read().iter().cloned().collect();
        result.sort();
        result
    }

    /// Merge a hosts-format document, returning how many domains it held
    pub fn load_from_reader<R: BufRead>(&self, reader: R) -> Result<usize> {
        let parsed = parse_hosts(reader)?;
        let count = parsed.len();
        self.shared.merge(parsed);
        info!(count, "Merged hosts list");
        Ok(count)
    }

    /// Fetch and merge a hosts-format list on the loader thread.
    ///
    /// Returns immediately; `on_done` receives the number of domains parsed
    /// from the list, or the error that aborted the load. A failed load
    /// leaves the current set untouched.
    pub fn load_from_url<F>(&self, url: &str, on_done: F)
    where
        F: FnOnce(Result<usize>) + Send + 'static,
    {
        let job = LoadJob {
            url: url.to_string(),
            on_done: Box::new(on_done),
        };

        let mut loader = self.loader.lock();
        let job = match loader.as_ref() {
            Some(tx) => match tx.send(job) {
                Ok(()) => return,
                Err(mpsc::SendError(job)) => job,
            },
            None => job,
        };

        match self.spawn_loader() {
            Ok(tx) => {
                if let Err(mpsc::SendError(job)) = tx.send(job) {
                    (job.on_done)(Err(Error::WorkerStopped(LOADER_NAME)));
                    return;
                }
                *loader = Some(tx);
            }
            Err(e) => (job.on_done)(Err(e)),
        }
    }

    fn spawn_loader(&self) -> Result<Sender<LoadJob>> {
        let (tx, rx) = mpsc::channel();
        let shared = Arc::downgrade(&self.shared);
        let fetcher = Arc::clone(&self.fetcher);
        thread::Builder::new()
            .name(LOADER_NAME.to_string())
            .spawn(move || run_loader(shared, fetcher, rx))?;
        Ok(tx)
    }
}

fn run_loader(shared: Weak<Shared>, fetcher: Arc<dyn ListFetcher>, rx: Receiver<LoadJob>) {
    for LoadJob { url, on_done } in rx {
        let result = fetcher.fetch(&url).and_then(parse_hosts);
        let result = match (result, shared.upgrade()) {
            (Ok(parsed), Some(shared)) => {
                let count = parsed.len();
                shared.merge(parsed);
                info!(url = %url, count, "Loaded denylist");
                Ok(count)
            }
            (Ok(_), None) => Err(Error::WorkerStopped(LOADER_NAME)),
            (Err(e), _) => {
                warn!(url = %url, error = %e, "Denylist load failed");
                Err(e)
            }
        };
        on_done(result);
    }
    debug!("Denylist loader stopped");
}

/// Bytes that are not UTF-8 are replaced rather than failing the list.
fn parse_hosts<R: BufRead>(mut reader: R) -> Result<HashSet<String>> {
    let mut parsed = HashSet::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if let Some(domain) = parse_hosts_line(&String::from_utf8_lossy(&line)) {
            parsed.insert(domain);
        }
    }
    Ok(parsed)
}

/// Extract the blocked domain from one hosts-file line.
///
/// Only lines of the form `<sentinel> <domain> ...` count, where the
/// sentinel is `0.0.0.0` or `127.0.0.1`. Comments, blank lines and the
/// loopback names yield `None`.
pub fn parse_hosts_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut tokens = line.split_whitespace();
    let address = tokens.next()?;
    let domain = tokens.next()?.to_lowercase();

    if !SENTINELS.contains(&address) || LOCAL_NAMES.contains(&domain.as_str()) {
        return None;
    }
    Some(domain)
}
