//! TalkServer Actor implementation
//!
//! The central actor that owns all state: the talk store, the version
//! counter and the waiter registry. Request handlers talk to it through
//! an mpsc command channel and get answers back on oneshot channels, so
//! every read and mutation runs on this one task, in arrival order.
//!
//! A mutation bumps the version, builds one snapshot and wakes every
//! parked waiter in a single step with no await in between.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::{debug, info};

use crate::error::AppError;
use crate::persistence::PersistHandle;
use crate::store::{PutOutcome, TalkStore};
use crate::talk::Talk;
use crate::types::Version;
use crate::waiter::{Snapshot, WaitOutcome, WaiterRegistry};

/// Channel buffer size for server commands
pub const CHANNEL_BUFFER_SIZE: usize = 256;

/// Longest a single long poll may stay parked
pub const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Commands sent from handlers to the TalkServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Look up a single talk
    GetTalk {
        title: String,
        reply: oneshot::Sender<Result<Talk, AppError>>,
    },
    /// Create or replace a talk
    PutTalk {
        title: String,
        presenter: String,
        summary: String,
        reply: oneshot::Sender<Result<Version, AppError>>,
    },
    /// Delete a talk (no-op if absent)
    DeleteTalk {
        title: String,
        reply: oneshot::Sender<Version>,
    },
    /// Append a comment to a talk
    AddComment {
        title: String,
        author: String,
        message: String,
        reply: oneshot::Sender<Result<Version, AppError>>,
    },
    /// Answer with the current state, or park until it changes
    AwaitChange {
        known: Option<Version>,
        wait: Option<Duration>,
        reply: oneshot::Sender<WaitOutcome>,
    },
    /// Read the current version
    CurrentVersion { reply: oneshot::Sender<Version> },
    /// Answer every waiter and stop parking new ones
    Drain { reply: oneshot::Sender<()> },
    /// Release waiters, flush to disk and stop
    Shutdown { reply: oneshot::Sender<()> },
}

/// The main TalkServer actor
pub struct TalkServer {
    /// All talks
    store: TalkStore,
    /// Bumped once per successful mutation
    version: Version,
    /// Parked long-poll requests
    waiters: WaiterRegistry,
    /// Disk writer, if persistence is enabled
    persist: Option<PersistHandle>,
    /// Set once shutdown has begun; long polls are answered at once
    draining: bool,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl TalkServer {
    /// Create a new TalkServer over `store` with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>, store: TalkStore) -> Self {
        Self {
            store,
            version: Version::default(),
            waiters: WaiterRegistry::new(),
            persist: None,
            draining: false,
            receiver,
        }
    }

    /// Enable persistence through the given sidecar handle
    pub fn with_persistence(mut self, persist: PersistHandle) -> Self {
        self.persist = Some(persist);
        self
    }

    /// Run the TalkServer event loop
    ///
    /// Processes commands and waiter deadlines until a shutdown command
    /// arrives or all senders are dropped.
    pub async fn run(mut self) {
        info!("TalkServer started with {} talks", self.store.len());

        loop {
            let deadline = self.waiters.next_deadline();
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle_command(cmd).await {
                        break;
                    }
                }
                _ = sleep_until_deadline(deadline) => {
                    let expired = self.waiters.expire(Instant::now());
                    debug!(
                        "{} waiters timed out, {} still waiting",
                        expired,
                        self.waiters.len()
                    );
                }
            }
        }

        self.waiters.release_all();
        info!("TalkServer shutting down at version {}", self.version);
    }

    /// Process a single command
    ///
    /// Returns false when the actor should stop.
    async fn handle_command(&mut self, cmd: ServerCommand) -> bool {
        match cmd {
            ServerCommand::GetTalk { title, reply } => {
                let _ = reply.send(self.store.get(&title).cloned());
            }
            ServerCommand::PutTalk {
                title,
                presenter,
                summary,
                reply,
            } => {
                let result = self.handle_put(title, presenter, summary);
                let _ = reply.send(result);
            }
            ServerCommand::DeleteTalk { title, reply } => {
                let version = self.handle_delete(title);
                let _ = reply.send(version);
            }
            ServerCommand::AddComment {
                title,
                author,
                message,
                reply,
            } => {
                let result = self.handle_add_comment(title, author, message);
                let _ = reply.send(result);
            }
            ServerCommand::AwaitChange { known, wait, reply } => {
                self.handle_await_change(known, wait, reply);
            }
            ServerCommand::CurrentVersion { reply } => {
                let _ = reply.send(self.version);
            }
            ServerCommand::Drain { reply } => {
                self.draining = true;
                let released = self.waiters.release_all();
                info!("Draining: released {} waiters", released);
                let _ = reply.send(());
            }
            ServerCommand::Shutdown { reply } => {
                self.handle_shutdown().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    /// Handle talk creation or replacement
    fn handle_put(
        &mut self,
        title: String,
        presenter: String,
        summary: String,
    ) -> Result<Version, AppError> {
        let outcome = self.store.put(&title, presenter, summary)?;
        match outcome {
            PutOutcome::Created => info!("Talk '{}' created", title),
            PutOutcome::Replaced => info!("Talk '{}' replaced", title),
        }
        Ok(self.updated())
    }

    /// Handle talk deletion
    ///
    /// Deleting an absent talk succeeds without bumping the version.
    fn handle_delete(&mut self, title: String) -> Version {
        if self.store.delete(&title).is_none() {
            debug!("Delete of unknown talk '{}' ignored", title);
            return self.version;
        }
        info!("Talk '{}' deleted", title);
        self.updated()
    }

    /// Handle a new comment
    fn handle_add_comment(
        &mut self,
        title: String,
        author: String,
        message: String,
    ) -> Result<Version, AppError> {
        let talk = self.store.add_comment(&title, author, message)?;
        info!(
            "Comment added to '{}' ({} comments)",
            title,
            talk.comment_count()
        );
        Ok(self.updated())
    }

    /// Handle a (possibly long-polling) list request
    ///
    /// The version check and the registration happen in this one
    /// synchronous step, so no mutation can slip in between them.
    fn handle_await_change(
        &mut self,
        known: Option<Version>,
        wait: Option<Duration>,
        reply: oneshot::Sender<WaitOutcome>,
    ) {
        if known != Some(self.version) {
            let _ = reply.send(WaitOutcome::Changed(self.snapshot()));
            return;
        }

        let wait = match wait {
            Some(wait) if !wait.is_zero() && !self.draining => wait.min(MAX_WAIT),
            _ => {
                let _ = reply.send(WaitOutcome::NotModified);
                return;
            }
        };

        let pruned = self.waiters.prune_closed();
        if pruned > 0 {
            debug!("Pruned {} disconnected waiters", pruned);
        }

        let now = Instant::now();
        let deadline = now.checked_add(wait).unwrap_or(now);
        let id = self.waiters.register(deadline, reply);
        debug!(
            "Waiter {} parked for {:?} at version {} ({} waiting)",
            id,
            wait,
            self.version,
            self.waiters.len()
        );
    }

    /// Handle shutdown: answer every waiter and write the store one last time
    async fn handle_shutdown(&mut self) {
        let released = self.waiters.release_all();
        debug!("Released {} waiters for shutdown", released);

        if let Some(persist) = self.persist.take() {
            info!("Saving {} talks before shutdown", self.store.len());
            persist.flush(&self.store).await;
        }
    }

    /// Helper: bump the version and notify everyone after a mutation
    fn updated(&mut self) -> Version {
        self.version = self.version.next();
        let snapshot = self.snapshot();
        let woken = self.waiters.drain(&snapshot);
        debug!("Version {} published to {} waiters", self.version, woken);

        if let Some(persist) = &self.persist {
            persist.record_mutation(self.version.0, &self.store);
        }
        self.version
    }

    /// Helper: full state at the current version
    fn snapshot(&self) -> Arc<Snapshot> {
        Arc::new(Snapshot {
            version: self.version,
            talks: self.store.list(),
        })
    }
}

/// Helper: sleep until the given deadline, or forever if there is none
async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Cloneable handle used by request handlers to reach the TalkServer
#[derive(Debug, Clone)]
pub struct ServerHandle {
    sender: mpsc::Sender<ServerCommand>,
}

impl ServerHandle {
    /// Wrap an existing command sender
    pub fn new(sender: mpsc::Sender<ServerCommand>) -> Self {
        Self { sender }
    }

    /// Spawn a TalkServer over `store` and return a handle to it
    pub fn spawn(store: TalkStore, persist: Option<PersistHandle>) -> Self {
        let (sender, receiver) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut server = TalkServer::new(receiver, store);
        if let Some(persist) = persist {
            server = server.with_persistence(persist);
        }
        tokio::spawn(server.run());
        Self::new(sender)
    }

    /// Look up a talk by title
    pub async fn get_talk(&self, title: impl Into<String>) -> Result<Talk, AppError> {
        let title = title.into();
        self.request(|reply| ServerCommand::GetTalk { title, reply })
            .await?
    }

    /// Create or replace a talk, returning the new version
    pub async fn put_talk(
        &self,
        title: impl Into<String>,
        presenter: impl Into<String>,
        summary: impl Into<String>,
    ) -> Result<Version, AppError> {
        let (title, presenter, summary) = (title.into(), presenter.into(), summary.into());
        self.request(|reply| ServerCommand::PutTalk {
            title,
            presenter,
            summary,
            reply,
        })
        .await?
    }

    /// Delete a talk, returning the version afterwards
    pub async fn delete_talk(&self, title: impl Into<String>) -> Result<Version, AppError> {
        let title = title.into();
        self.request(|reply| ServerCommand::DeleteTalk { title, reply })
            .await
    }

    /// Append a comment, returning the new version
    pub async fn add_comment(
        &self,
        title: impl Into<String>,
        author: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<Version, AppError> {
        let (title, author, message) = (title.into(), author.into(), message.into());
        self.request(|reply| ServerCommand::AddComment {
            title,
            author,
            message,
            reply,
        })
        .await?
    }

    /// Get the current state if `known` is stale, otherwise wait up to `wait` for a change
    pub async fn await_change(
        &self,
        known: Option<Version>,
        wait: Option<Duration>,
    ) -> Result<WaitOutcome, AppError> {
        self.request(|reply| ServerCommand::AwaitChange { known, wait, reply })
            .await
    }

    /// Read the current version
    pub async fn version(&self) -> Result<Version, AppError> {
        self.request(|reply| ServerCommand::CurrentVersion { reply })
            .await
    }

    /// Answer every pending long poll and stop parking new ones
    ///
    /// The actor keeps serving everything else.
    pub async fn drain(&self) -> Result<(), AppError> {
        self.request(|reply| ServerCommand::Drain { reply }).await
    }

    /// Release all waiters, flush to disk and stop the actor
    pub async fn shutdown(&self) -> Result<(), AppError> {
        self.request(|reply| ServerCommand::Shutdown { reply }).await
    }

    /// Helper: send a command and wait for its reply
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> ServerCommand,
    ) -> Result<T, AppError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| AppError::ChannelSend)?;
        reply_rx.await.map_err(|_| AppError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{load_talks, PersistPolicy};

    fn start() -> ServerHandle {
        ServerHandle::spawn(TalkStore::new(), None)
    }

    fn titles(outcome: &WaitOutcome) -> Vec<String> {
        match outcome {
            WaitOutcome::Changed(snapshot) => {
                snapshot.talks.iter().map(|t| t.title.clone()).collect()
            }
            WaitOutcome::NotModified => panic!("Expected a snapshot"),
        }
    }

    #[tokio::test]
    async fn test_version_strictly_increases() {
        let server = start();
        let mut last = server.version().await.unwrap();
        assert_eq!(last, Version(0));

        let steps = [
            server.put_talk("A", "Ann", "First").await.unwrap(),
            server.add_comment("A", "Bob", "Hi").await.unwrap(),
            server.put_talk("A", "Ann", "Replaced").await.unwrap(),
            server.put_talk("B", "Bea", "Second").await.unwrap(),
            server.delete_talk("A").await.unwrap(),
        ];
        for version in steps {
            assert!(version > last);
            last = version;
        }
        assert_eq!(server.version().await.unwrap(), Version(5));
    }

    #[tokio::test]
    async fn test_delete_absent_does_not_bump() {
        let server = start();
        server.put_talk("A", "Ann", "First").await.unwrap();

        assert_eq!(server.delete_talk("A").await.unwrap(), Version(2));
        assert_eq!(server.delete_talk("A").await.unwrap(), Version(2));
        assert_eq!(server.version().await.unwrap(), Version(2));
    }

    #[tokio::test]
    async fn test_failed_mutations_do_not_bump() {
        let server = start();

        assert!(matches!(
            server.put_talk("A", "Ann", "").await,
            Err(AppError::BadTalkData)
        ));
        assert!(matches!(
            server.add_comment("Nope", "Bob", "Hi").await,
            Err(AppError::TalkNotFound(_))
        ));
        assert!(matches!(
            server.get_talk("A").await,
            Err(AppError::TalkNotFound(_))
        ));
        assert_eq!(server.version().await.unwrap(), Version(0));
    }

    #[tokio::test]
    async fn test_stale_or_missing_token_answers_immediately() {
        let server = start();
        server.put_talk("A", "Ann", "First").await.unwrap();

        let outcome = server.await_change(None, None).await.unwrap();
        assert_eq!(titles(&outcome), ["A"]);

        let outcome = server
            .await_change(Some(Version(0)), Some(Duration::from_secs(30)))
            .await
            .unwrap();
        match outcome {
            WaitOutcome::Changed(snapshot) => assert_eq!(snapshot.version, Version(1)),
            WaitOutcome::NotModified => panic!("Expected a snapshot"),
        }
    }

    #[tokio::test]
    async fn test_current_token_without_wait_is_not_modified() {
        let server = start();
        let version = server.version().await.unwrap();

        for wait in [None, Some(Duration::ZERO)] {
            let outcome = server.await_change(Some(version), wait).await.unwrap();
            assert_eq!(outcome, WaitOutcome::NotModified);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_poll_wakes_on_mutation() {
        let server = start();
        let version = server.version().await.unwrap();

        let writer = server.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(1)).await;
            writer
                .put_talk("Unituning", "Jamal", "Modifying your cycle")
                .await
                .unwrap();
        });

        let started = Instant::now();
        let outcome = server
            .await_change(Some(version), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(2));
        match outcome {
            WaitOutcome::Changed(snapshot) => {
                assert_eq!(snapshot.version, version.next());
                assert_eq!(snapshot.talks[0].title, "Unituning");
            }
            WaitOutcome::NotModified => panic!("Expected a snapshot"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_poll_times_out_cleanly() {
        let server = start();
        let version = server.version().await.unwrap();

        let started = Instant::now();
        let outcome = server
            .await_change(Some(version), Some(Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(outcome, WaitOutcome::NotModified);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(6));

        // A mutation right after the timeout finds no waiter to wake and
        // the next poll with the old token sees the change.
        server.put_talk("A", "Ann", "First").await.unwrap();
        let outcome = server.await_change(Some(version), None).await.unwrap();
        assert_eq!(titles(&outcome), ["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_mutation_wakes_all_waiters() {
        let server = start();
        let version = server.version().await.unwrap();

        let mut polls = Vec::new();
        for _ in 0..3 {
            let poller = server.clone();
            polls.push(tokio::spawn(async move {
                poller
                    .await_change(Some(version), Some(Duration::from_secs(60)))
                    .await
            }));
        }
        // Let every poll get parked before mutating.
        time::sleep(Duration::from_millis(10)).await;
        server.put_talk("A", "Ann", "First").await.unwrap();

        let mut snapshots = Vec::new();
        for poll in polls {
            match poll.await.unwrap().unwrap() {
                WaitOutcome::Changed(snapshot) => snapshots.push(snapshot),
                WaitOutcome::NotModified => panic!("Expected a snapshot"),
            }
        }
        assert!(snapshots.iter().all(|s| Arc::ptr_eq(s, &snapshots[0])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_waiters() {
        let server = start();
        let version = server.version().await.unwrap();

        let poller = server.clone();
        let poll = tokio::spawn(async move {
            poller
                .await_change(Some(version), Some(Duration::from_secs(60)))
                .await
        });
        time::sleep(Duration::from_millis(10)).await;

        server.shutdown().await.unwrap();
        assert_eq!(poll.await.unwrap().unwrap(), WaitOutcome::NotModified);
        assert!(server.version().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_wait_does_not_kill_actor() {
        let server = start();
        let version = server.version().await.unwrap();

        let poller = server.clone();
        let poll = tokio::spawn(async move {
            poller
                .await_change(Some(version), Some(Duration::from_secs(u64::MAX)))
                .await
        });
        time::sleep(Duration::from_millis(10)).await;

        assert_eq!(
            server.put_talk("A", "Ann", "First").await.unwrap(),
            version.next()
        );
        assert_eq!(titles(&poll.await.unwrap().unwrap()), ["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_answers_polls_and_keeps_serving() {
        let server = start();
        let version = server.version().await.unwrap();

        let poller = server.clone();
        let poll = tokio::spawn(async move {
            poller
                .await_change(Some(version), Some(Duration::from_secs(60)))
                .await
        });
        time::sleep(Duration::from_millis(10)).await;

        server.drain().await.unwrap();
        assert_eq!(poll.await.unwrap().unwrap(), WaitOutcome::NotModified);

        // New long polls are no longer parked.
        let outcome = server
            .await_change(Some(version), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::NotModified);
        assert_eq!(server.put_talk("A", "Ann", "First").await.unwrap(), Version(1));
    }

    #[tokio::test]
    async fn test_mutations_persist_on_schedule() {
        let path = std::env::temp_dir().join(format!(
            "skillshare-actor-{}.json",
            crate::types::WaiterId::new()
        ));
        let persist = PersistHandle::spawn(path.clone(), PersistPolicy::new(10));
        let server = ServerHandle::spawn(TalkStore::new(), Some(persist));

        async fn saved_titles(path: &std::path::Path) -> usize {
            load_talks(path).await.len()
        }

        async fn wait_for_saved(path: &std::path::Path, expected: usize) {
            for _ in 0..200 {
                if saved_titles(path).await == expected {
                    return;
                }
                time::sleep(Duration::from_millis(10)).await;
            }
            panic!("File never held {} talks", expected);
        }

        // The first mutation is written.
        server.put_talk("T1", "Ann", "talk").await.unwrap();
        wait_for_saved(&path, 1).await;

        // Mutations 2 through 9 are not.
        for n in 2..=9 {
            server.put_talk(format!("T{n}"), "Ann", "talk").await.unwrap();
        }
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(saved_titles(&path).await, 1);

        // The tenth is.
        server.put_talk("T10", "Ann", "talk").await.unwrap();
        wait_for_saved(&path, 10).await;

        // Shutdown writes whatever came after.
        server.put_talk("T11", "Ann", "talk").await.unwrap();
        server.shutdown().await.unwrap();
        let saved = load_talks(&path).await;
        assert_eq!(saved.len(), 11);
        assert!(saved.get("T11").is_ok());

        let _ = std::fs::remove_file(&path);
    }
}
