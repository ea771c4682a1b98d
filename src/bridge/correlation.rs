// src/bridge/correlation.rs

//! Correlation table between in-flight attempts and completion signals.
//!
//! Every attempt that is waiting for the executor owns one slot in the
//! table, keyed by its [`AttemptId`]. A slot is a `oneshot` sender: the first
//! writer (a completion signal or a cancel release) takes it out of the
//! table and wakes the waiter. Anything that arrives later finds no slot and
//! is discarded.
//!
//! The waiter side is a [`PendingCorrelation`]. Dropping it, whether after a
//! resolution, on timeout or because the attempt task was aborted, removes
//! the slot, so the table never holds records nobody waits on. Every id that
//! leaves the table is remembered as resolved, so a late signal is reported
//! as [`Delivery::AlreadyResolved`] however the wait ended.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::bridge::signal::{CompletionSignal, Delivery};
use crate::errors::{BridgeError, Result};
use crate::sync::lock;
use crate::types::AttemptId;

/// Number of recently resolved ids remembered to tell a duplicate signal
/// apart from one for an id that was never dispatched.
const RESOLVED_HISTORY: usize = 1024;

/// How a waiting attempt was woken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Signalled(CompletionSignal),
    Cancelled,
}

struct Slot {
    generation: u64,
    tx: oneshot::Sender<Resolution>,
}

#[derive(Default)]
struct Tables {
    slots: HashMap<AttemptId, Slot>,
    next_generation: u64,
    resolved: HashSet<AttemptId>,
    resolved_order: VecDeque<AttemptId>,
}

impl Tables {
    fn mark_resolved(&mut self, id: AttemptId) {
        if self.resolved.insert(id) {
            self.resolved_order.push_back(id);
        }
        while self.resolved_order.len() > RESOLVED_HISTORY {
            if let Some(old) = self.resolved_order.pop_front() {
                self.resolved.remove(&old);
            }
        }
    }

    fn take(&mut self, id: AttemptId) -> Option<oneshot::Sender<Resolution>> {
        let slot = self.slots.remove(&id)?;
        self.mark_resolved(id);
        Some(slot.tx)
    }
}

/// Map of open correlation records.
#[derive(Default)]
pub struct CorrelationTable {
    tables: Mutex<Tables>,
}

impl std::fmt::Debug for CorrelationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationTable")
            .field("open", &self.open_count())
            .finish()
    }
}

impl CorrelationTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open the record for `id`.
    ///
    /// Fails with [`BridgeError::DuplicateAttempt`] if a record for the id is
    /// already open.
    pub fn open(self: &Arc<Self>, id: AttemptId) -> Result<PendingCorrelation> {
        let (tx, rx) = oneshot::channel();
        let mut tables = lock(&self.tables);

        if tables.slots.contains_key(&id) {
            return Err(BridgeError::DuplicateAttempt(id));
        }

        let generation = tables.next_generation;
        tables.next_generation += 1;
        tables.slots.insert(id, Slot { generation, tx });
        // A retry reuses the id; it is waiting again, not resolved.
        if tables.resolved.remove(&id) {
            tables.resolved_order.retain(|resolved| *resolved != id);
        }

        debug!(attempt.id = %id, "correlation record opened");

        Ok(PendingCorrelation {
            table: Arc::clone(self),
            id,
            generation,
            rx,
        })
    }

    /// Deliver a completion signal to the attempt waiting on its id.
    pub fn deliver(&self, signal: CompletionSignal) -> Delivery {
        let id = signal.attempt_id;
        let mut tables = lock(&self.tables);

        let Some(tx) = tables.take(id) else {
            return if tables.resolved.contains(&id) {
                warn!(attempt.id = %id, result = %signal.result, "duplicate completion signal discarded");
                Delivery::AlreadyResolved
            } else {
                warn!(attempt.id = %id, result = %signal.result, "completion signal for unknown attempt discarded");
                Delivery::Unknown
            };
        };
        drop(tables);

        debug!(attempt.id = %id, result = %signal.result, "delivering completion signal");
        match tx.send(Resolution::Signalled(signal)) {
            Ok(()) => Delivery::Delivered,
            Err(_) => {
                debug!(attempt.id = %id, "waiter went away before the signal arrived");
                Delivery::AlreadyResolved
            }
        }
    }

    /// Release the attempt waiting on `id` as cancelled.
    ///
    /// Returns `false` if nothing was waiting.
    pub fn release(&self, id: AttemptId) -> bool {
        let Some(tx) = lock(&self.tables).take(id) else {
            return false;
        };
        debug!(attempt.id = %id, "releasing waiting attempt as cancelled");
        tx.send(Resolution::Cancelled).is_ok()
    }

    pub fn is_open(&self, id: AttemptId) -> bool {
        lock(&self.tables).slots.contains_key(&id)
    }

    pub fn open_count(&self) -> usize {
        lock(&self.tables).slots.len()
    }

    fn close(&self, id: AttemptId, generation: u64) {
        let mut tables = lock(&self.tables);
        let ours = tables
            .slots
            .get(&id)
            .is_some_and(|slot| slot.generation == generation);
        if ours {
            tables.slots.remove(&id);
            // Timed out or abandoned: a signal arriving now is late, not unknown.
            tables.mark_resolved(id);
            debug!(attempt.id = %id, "correlation record closed without resolution");
        }
    }
}

/// Waiting side of one open correlation record.
#[must_use = "the record is removed as soon as this is dropped"]
pub struct PendingCorrelation {
    table: Arc<CorrelationTable>,
    id: AttemptId,
    generation: u64,
    rx: oneshot::Receiver<Resolution>,
}

impl std::fmt::Debug for PendingCorrelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCorrelation")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl PendingCorrelation {
    pub fn id(&self) -> AttemptId {
        self.id
    }

    /// Suspend until the record is resolved.
    ///
    /// Returns `None` if `timeout` elapses first.
    pub async fn wait(mut self, timeout: Option<Duration>) -> Option<Resolution> {
        let received = match timeout {
            Some(limit) => tokio::time::timeout(limit, &mut self.rx).await.ok()?,
            None => (&mut self.rx).await,
        };

        // The sender is only ever dropped after sending, so a closed channel
        // means the record was torn down underneath us.
        Some(received.unwrap_or(Resolution::Cancelled))
    }
}

impl Drop for PendingCorrelation {
    fn drop(&mut self) {
        self.table.close(self.id, self.generation);
    }
}
