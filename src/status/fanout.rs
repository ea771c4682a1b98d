// src/status/fanout.rs

//! Status fan-out registry.
//!
//! For every attempt id with at least one listener there is exactly one
//! observer task following the scheduler's live status stream. Each change
//! is pushed to every listener's sink. The listener count is the reference
//! count: removing the last listener aborts the observer and drops its
//! stream, and a later subscribe starts a fresh one.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::errors::{BridgeError, Result};
use crate::scheduler::Scheduler;
use crate::sync::lock;
use crate::types::{AttemptId, WorkStatus};

/// One status change, as delivered to a listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    #[serde(rename = "id")]
    pub attempt_id: AttemptId,
    #[serde(flatten)]
    pub status: WorkStatus,
}

/// Where a listener receives its updates.
pub type StatusSink = mpsc::UnboundedSender<StatusUpdate>;

/// Handle identifying one listener of one attempt id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ListenerId {
    fn from(raw: u64) -> Self {
        ListenerId(raw)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

struct Observer {
    task: JoinHandle<()>,
    listeners: HashMap<ListenerId, StatusSink>,
}

type ObserverMap = Mutex<HashMap<AttemptId, Observer>>;

pub struct StatusFanout {
    scheduler: Arc<dyn Scheduler>,
    observers: Arc<ObserverMap>,
    next_listener: AtomicU64,
}

impl fmt::Debug for StatusFanout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusFanout")
            .field("observers", &self.observer_count())
            .finish_non_exhaustive()
    }
}

impl StatusFanout {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            observers: Arc::new(Mutex::new(HashMap::new())),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Add a listener for `id`.
    ///
    /// The current status is pushed into `sink` before this returns, so a
    /// subscriber never misses the state the attempt is already in.
    pub async fn subscribe(&self, id: AttemptId, sink: StatusSink) -> Result<ListenerId> {
        let rx = self
            .scheduler
            .watch(id)
            .await
            .ok_or(BridgeError::NotFound(id))?;

        let listener = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        let mut observers = lock(&self.observers);

        // Read the current value under the map lock: an observer started
        // below cannot push a newer value until we release it, so the
        // replay is never older than what follows it.
        let current = rx.borrow().clone();

        let observer = match observers.entry(id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!(attempt.id = %id, "attaching status observer");
                let task = tokio::spawn(observe(id, rx, Arc::downgrade(&self.observers)));
                entry.insert(Observer {
                    task,
                    listeners: HashMap::new(),
                })
            }
        };

        let replay = StatusUpdate {
            attempt_id: id,
            status: current,
        };
        if sink.send(replay).is_err() {
            trace!(attempt.id = %id, %listener, "sink closed before the initial status");
        }
        observer.listeners.insert(listener, sink);

        debug!(attempt.id = %id, %listener, listeners = observer.listeners.len(), "status listener added");
        Ok(listener)
    }

    /// Remove a listener. Returns `false` if it was not subscribed.
    ///
    /// When the last listener of an id goes, its observer is aborted before
    /// this returns.
    pub fn unsubscribe(&self, id: AttemptId, listener: ListenerId) -> bool {
        let mut observers = lock(&self.observers);
        let Some(observer) = observers.get_mut(&id) else {
            return false;
        };

        let removed = observer.listeners.remove(&listener).is_some();
        if observer.listeners.is_empty() {
            if let Some(observer) = observers.remove(&id) {
                observer.task.abort();
                debug!(attempt.id = %id, "status observer detached");
            }
        }
        removed
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.observers).len()
    }

    pub fn listener_count(&self, id: AttemptId) -> usize {
        lock(&self.observers)
            .get(&id)
            .map(|observer| observer.listeners.len())
            .unwrap_or(0)
    }

    pub fn is_observed(&self, id: AttemptId) -> bool {
        lock(&self.observers).contains_key(&id)
    }
}

impl Drop for StatusFanout {
    fn drop(&mut self) {
        for (_, observer) in lock(&self.observers).drain() {
            observer.task.abort();
        }
    }
}

/// Observer task body: forward every change of `rx` to the listeners.
///
/// Exits when the stream ends or when no listener is left.
async fn observe(id: AttemptId, mut rx: watch::Receiver<WorkStatus>, observers: Weak<ObserverMap>) {
    while rx.changed().await.is_ok() {
        let update = StatusUpdate {
            attempt_id: id,
            status: rx.borrow_and_update().clone(),
        };

        let Some(observers) = observers.upgrade() else {
            return;
        };
        let mut observers = lock(&observers);
        let Some(observer) = observers.get_mut(&id) else {
            return;
        };

        trace!(attempt.id = %id, state = %update.status.state, "fanning out status");
        observer
            .listeners
            .retain(|_, sink| sink.send(update.clone()).is_ok());

        if observer.listeners.is_empty() {
            observers.remove(&id);
            debug!(attempt.id = %id, "all status sinks closed; observer detached");
            return;
        }
    }

    trace!(attempt.id = %id, "status stream ended");
}
