//! Background snapshot writer

use super::KeyValueStore;
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Default number of queued snapshots before submitters block
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

const WORKER_NAME: &str = "snapshot-writer";

enum Command {
    Write {
        namespace: String,
        key: String,
        bytes: Vec<u8>,
    },
    Flush(SyncSender<()>),
    Shutdown,
}

/// Serializes snapshots and writes them on a dedicated thread.
///
/// The queue is bounded; when it is full, `save` blocks until the writer
/// catches up. Snapshots queued for the same (namespace, key) are coalesced
/// and only the latest one hits the store. Callers submit while holding the
/// lock of the collection they serialize, so the queue order per key matches
/// the mutation order.
pub struct SnapshotWriter {
    store: Arc<dyn KeyValueStore>,
    tx: SyncSender<Command>,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotWriter {
    /// Start a writer over `store` with a queue of `capacity` snapshots
    pub fn new(store: Arc<dyn KeyValueStore>, capacity: usize) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        let worker_store = Arc::clone(&store);
        let handle = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || run(worker_store.as_ref(), rx))?;

        Ok(Self {
            store,
            tx,
            handle: Some(handle),
        })
    }

    /// The store snapshots are written to
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Serialize `value` and queue it for writing
    pub fn save<T: Serialize + ?Sized>(&self, namespace: &str, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.tx
            .send(Command::Write {
                namespace: namespace.to_string(),
                key: key.to_string(),
                bytes,
            })
            .map_err(|_| Error::WorkerStopped(WORKER_NAME))
    }

    /// Block until every snapshot queued so far reached the store
    pub fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        self.tx
            .send(Command::Flush(ack_tx))
            .map_err(|_| Error::WorkerStopped(WORKER_NAME))?;
        ack_rx.recv().map_err(|_| Error::WorkerStopped(WORKER_NAME))
    }

    /// Read and decode a snapshot, seeing every write queued before the call
    pub fn load<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Result<Option<T>> {
        self.flush()?;
        match self.store.get(namespace, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Snapshot writer panicked");
            }
        }
    }
}

fn run(store: &dyn KeyValueStore, rx: Receiver<Command>) {
    debug!("Snapshot writer started");

    while let Ok(first) = rx.recv() {
        let mut pending: HashMap<(String, String), Vec<u8>> = HashMap::new();
        let mut acks = Vec::new();
        let mut shutdown = false;

        for command in std::iter::once(first).chain(rx.try_iter()) {
            match command {
                Command::Write {
                    namespace,
                    key,
                    bytes,
                } => {
                    pending.insert((namespace, key), bytes);
                }
                Command::Flush(ack) => acks.push(ack),
                Command::Shutdown => shutdown = true,
            }
        }

        for ((namespace, key), bytes) in pending {
            if let Err(e) = store.put(&namespace, &key, &bytes) {
                warn!(namespace = %namespace, key = %key, error = %e, "Snapshot write failed");
            }
        }

        for ack in acks {
            let _ = ack.send(());
        }

        if shutdown {
            break;
        }
    }

    debug!("Snapshot writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn writer() -> (Arc<MemoryStore>, SnapshotWriter) {
        let store = Arc::new(MemoryStore::new());
        let writer = SnapshotWriter::new(store.clone(), 4).unwrap();
        (store, writer)
    }

    #[test]
    fn test_save_and_flush() {
        let (store, writer) = writer();
        writer.save("ns", "k", &vec![1, 2, 3]).unwrap();
        writer.flush().unwrap();
        assert_eq!(store.get_string("ns", "k").as_deref(), Some("[1,2,3]"));
    }

    #[test]
    fn test_latest_snapshot_wins() {
        let (store, writer) = writer();
        for i in 0..20 {
            writer.save("ns", "k", &i).unwrap();
        }
        writer.flush().unwrap();
        assert_eq!(store.get_string("ns", "k").as_deref(), Some("19"));
        assert!(store.put_count() <= 20);
    }

    #[test]
    fn test_load_sees_queued_write() {
        let (_store, writer) = writer();
        writer.save("ns", "k", &vec!["a".to_string()]).unwrap();
        let loaded: Option<Vec<String>> = writer.load("ns", "k").unwrap();
        assert_eq!(loaded, Some(vec!["a".to_string()]));

        let missing: Option<Vec<String>> = writer.load("ns", "other").unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_drop_drains_queue() {
        let store = Arc::new(MemoryStore::new());
        {
            let writer = SnapshotWriter::new(store.clone(), 4).unwrap();
            writer.save("ns", "k", &"last").unwrap();
        }
        assert_eq!(store.get_string("ns", "k").as_deref(), Some("\"last\""));
    }

    #[test]
    fn test_failed_put_keeps_writer_alive() {
        let (store, writer) = writer();
        store.set_failing(true);
        writer.save("ns", "k", &1).unwrap();
        writer.flush().unwrap();
        assert_eq!(store.get_string("ns", "k"), None);

        store.set_failing(false);
        writer.save("ns", "k", &2).unwrap();
        writer.flush().unwrap();
        assert_eq!(store.get_string("ns", "k").as_deref(), Some("2"));
    }
}
