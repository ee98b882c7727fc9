//! Waiter registry
//!
//! Holds long-poll requests that are parked until the next version bump.
//! Each waiter owns a one-shot resolver that is consumed when it is
//! answered, and is removed from the registry on the same call, so a
//! waiter is answered at most once whichever path reaches it first.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::talk::Talk;
use crate::types::{Version, WaiterId};

/// Full store state at a given version
///
/// Built once per mutation and shared by every waiter woken by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Version this snapshot was taken at
    pub version: Version,
    /// Every talk, ordered by title
    pub talks: Vec<Talk>,
}

/// How a long-poll request was answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The store changed; here is the fresh state
    Changed(Arc<Snapshot>),
    /// Nothing changed before the deadline
    NotModified,
}

/// A parked long-poll request
#[derive(Debug)]
struct Waiter {
    deadline: Instant,
    resolver: oneshot::Sender<WaitOutcome>,
}

impl Waiter {
    /// Answer the waiter, consuming it
    ///
    /// Returns false if the requester has already gone away.
    fn resolve(self, outcome: WaitOutcome) -> bool {
        self.resolver.send(outcome).is_ok()
    }
}

/// Registry of parked long-poll requests
#[derive(Debug, Default)]
pub struct WaiterRegistry {
    waiters: HashMap<WaiterId, Waiter>,
}

impl WaiterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a request until `deadline`
    pub fn register(
        &mut self,
        deadline: Instant,
        resolver: oneshot::Sender<WaitOutcome>,
    ) -> WaiterId {
        let id = WaiterId::new();
        self.waiters.insert(id, Waiter { deadline, resolver });
        id
    }

    /// Wake every waiter with the same snapshot and empty the registry
    ///
    /// Returns how many waiters were still listening.
    pub fn drain(&mut self, snapshot: &Arc<Snapshot>) -> usize {
        self.waiters
            .drain()
            .map(|(_, waiter)| waiter.resolve(WaitOutcome::Changed(Arc::clone(snapshot))))
            .filter(|delivered| *delivered)
            .count()
    }

    /// Answer every waiter whose deadline is at or before `now` with `NotModified`
    ///
    /// Expired waiters are removed, so a later `drain` cannot reach them.
    /// Returns how many waiters expired.
    pub fn expire(&mut self, now: Instant) -> usize {
        let expired: Vec<WaiterId> = self
            .waiters
            .iter()
            .filter(|(_, waiter)| waiter.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(waiter) = self.waiters.remove(id) {
                waiter.resolve(WaitOutcome::NotModified);
            }
        }
        expired.len()
    }

    /// Answer every waiter with `NotModified` regardless of deadline
    pub fn release_all(&mut self) -> usize {
        let count = self.waiters.len();
        for (_, waiter) in self.waiters.drain() {
            waiter.resolve(WaitOutcome::NotModified);
        }
        count
    }

    /// Drop waiters whose requester has disconnected
    pub fn prune_closed(&mut self) -> usize {
        let before = self.waiters.len();
        self.waiters.retain(|_, waiter| !waiter.resolver.is_closed());
        before - self.waiters.len()
    }

    /// Earliest deadline among parked waiters
    pub fn next_deadline(&self) -> Option<Instant> {
        self.waiters.values().map(|waiter| waiter.deadline).min()
    }

    /// Number of parked waiters
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Check if no waiters are parked
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}
