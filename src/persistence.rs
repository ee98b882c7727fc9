//! Persistence sidecar
//!
//! Loads the talk store from a JSON file at startup and writes it back from
//! a background task. Disk problems are logged and never fatal: the
//! in-memory store stays authoritative for the life of the process.
//!
//! Write cadence: after the first mutation, after every Nth mutation, and
//! once more on shutdown. Up to N-1 mutations can be lost on a crash.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::store::TalkStore;
use crate::talk::Talk;

/// Default number of mutations between writes
pub const DEFAULT_PERSIST_EVERY: u64 = 10;

/// Decides which mutations trigger a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistPolicy {
    every: u64,
}

impl PersistPolicy {
    /// Write after the first mutation and after every `every`th one
    ///
    /// An interval of 0 is treated as 1 (write after every mutation).
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
        }
    }

    /// Check whether the `mutation`th mutation (1-based) should be written
    pub fn should_write(&self, mutation: u64) -> bool {
        mutation == 1 || (mutation > 0 && mutation % self.every == 0)
    }
}

impl Default for PersistPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PERSIST_EVERY)
    }
}

/// Read the store from `path`
///
/// A missing, unreadable or malformed file yields an empty store.
pub async fn load_talks(path: &Path) -> TalkStore {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No talks file at '{}', starting empty", path.display());
            return TalkStore::new();
        }
        Err(e) => {
            error!("Could not open '{}': {}", path.display(), e);
            return TalkStore::new();
        }
    };

    match serde_json::from_str::<BTreeMap<String, Talk>>(&text) {
        Ok(talks) => {
            let store = TalkStore::from_map(talks);
            info!("Loaded {} talks from '{}'", store.len(), path.display());
            store
        }
        Err(e) => {
            warn!("Mismatched JSON object found in '{}': {}", path.display(), e);
            TalkStore::new()
        }
    }
}

/// Write the whole store to `path` as pretty-printed JSON
pub async fn save_talks(path: &Path, store: &TalkStore) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(store)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

/// Background writer
///
/// Always writes the most recent published snapshot; snapshots published
/// while a write is in progress collapse into one. Exits once its handle
/// is gone and the last snapshot has been written.
pub struct Persister {
    path: PathBuf,
    receiver: watch::Receiver<Option<TalkStore>>,
}

impl Persister {
    /// Create a new Persister writing to `path`
    pub fn new(path: PathBuf, receiver: watch::Receiver<Option<TalkStore>>) -> Self {
        Self { path, receiver }
    }

    /// Run the writer loop
    pub async fn run(mut self) {
        debug!("Persister started for '{}'", self.path.display());

        while self.receiver.changed().await.is_ok() {
            let pending = self.receiver.borrow_and_update().clone();
            if let Some(store) = pending {
                self.write(&store).await;
            }
        }

        debug!("Persister shutting down");
    }

    async fn write(&self, store: &TalkStore) {
        match save_talks(&self.path, store).await {
            Ok(()) => debug!("Saved {} talks to '{}'", store.len(), self.path.display()),
            Err(e) => error!("Cannot write into file '{}': {}", self.path.display(), e),
        }
    }
}

/// Publishing side of the persistence sidecar, owned by the server actor
#[derive(Debug)]
pub struct PersistHandle {
    sender: watch::Sender<Option<TalkStore>>,
    policy: PersistPolicy,
    task: JoinHandle<()>,
}

impl PersistHandle {
    /// Spawn a Persister task for `path` and return its handle
    pub fn spawn(path: PathBuf, policy: PersistPolicy) -> Self {
        let (sender, receiver) = watch::channel(None);
        let task = tokio::spawn(Persister::new(path, receiver).run());
        Self {
            sender,
            policy,
            task,
        }
    }

    /// Publish a snapshot if the `mutation`th mutation is due for a write
    ///
    /// Never waits for the disk.
    pub fn record_mutation(&self, mutation: u64, store: &TalkStore) {
        if !self.policy.should_write(mutation) {
            return;
        }
        debug!("Mutation {} scheduled for persistence", mutation);
        self.sender.send_replace(Some(store.clone()));
    }

    /// Publish a final snapshot and wait until the writer is done with it
    pub async fn flush(self, store: &TalkStore) {
        let Self { sender, task, .. } = self;
        sender.send_replace(Some(store.clone()));
        drop(sender);

        if let Err(e) = task.await {
            error!("Persister task failed: {}", e);
        }
    }
}
