// src/scheduler/local.rs

//! In-process scheduler.
//!
//! Each attempt gets its own Tokio task which loops:
//!
//! 1. wait until the attempt's constraints are satisfied by the current
//!    [`DeviceConditions`],
//! 2. mark it `running` and call the [`AttemptWorker`],
//! 3. apply the result: finish, back off and retry, or (periodic) sleep
//!    until the next period.
//!
//! Cancellation goes through a per-attempt oneshot. Nothing is persisted;
//! a restart forgets every attempt. Finished attempts stay queryable until
//! [`FINISHED_HISTORY`] newer attempts have finished, then they are
//! forgotten too.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tracing::{Instrument, debug, info, info_span};

use crate::constraints::Constraints;
use crate::errors::Result;
use crate::scheduler::{
    Attempt, AttemptWorker, BackoffPolicy, BoxFuture, DeviceConditions, ExistingWorkPolicy,
    RequestKind, Scheduler, WorkRequest, WorkResult,
};
use crate::sync::lock;
use crate::types::{AttemptId, WorkState, WorkStatus};

/// Number of finished attempts kept for status queries.
pub const FINISHED_HISTORY: usize = 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerOptions {
    pub backoff: BackoffPolicy,
}

/// Bookkeeping for one attempt id.
///
/// - `status` is the source of truth for the attempt's status and doubles
///   as its live status stream.
/// - `cancel` stops the attempt's task; taken on first cancel.
struct AttemptRecord {
    status: watch::Sender<WorkStatus>,
    cancel: Option<oneshot::Sender<()>>,
}

struct Inner {
    worker: Arc<dyn AttemptWorker>,
    options: SchedulerOptions,
    conditions: watch::Sender<DeviceConditions>,
    attempts: Mutex<HashMap<AttemptId, AttemptRecord>>,
    /// Unique work name -> latest attempt id. Locked before `attempts`.
    unique: Mutex<HashMap<String, AttemptId>>,
    /// Finished attempt ids, oldest first.
    finished: Mutex<VecDeque<AttemptId>>,
    history: usize,
}

/// Scheduler that runs attempts as Tokio tasks in this process.
#[derive(Clone)]
pub struct LocalScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LocalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalScheduler")
            .field("options", &self.inner.options)
            .field("attempts", &lock(&self.inner.attempts).len())
            .finish_non_exhaustive()
    }
}

impl LocalScheduler {
    pub fn new(worker: Arc<dyn AttemptWorker>, options: SchedulerOptions) -> Self {
        Self::with_conditions(worker, options, DeviceConditions::ideal())
    }

    pub fn with_conditions(
        worker: Arc<dyn AttemptWorker>,
        options: SchedulerOptions,
        conditions: DeviceConditions,
    ) -> Self {
        Self::build(worker, options, conditions, FINISHED_HISTORY)
    }

    /// Keep at most `history` finished attempts instead of
    /// [`FINISHED_HISTORY`].
    pub fn with_history(
        worker: Arc<dyn AttemptWorker>,
        options: SchedulerOptions,
        history: usize,
    ) -> Self {
        Self::build(worker, options, DeviceConditions::ideal(), history)
    }

    fn build(
        worker: Arc<dyn AttemptWorker>,
        options: SchedulerOptions,
        conditions: DeviceConditions,
        history: usize,
    ) -> Self {
        let (conditions, _) = watch::channel(conditions);
        Self {
            inner: Arc::new(Inner {
                worker,
                options,
                conditions,
                attempts: Mutex::new(HashMap::new()),
                unique: Mutex::new(HashMap::new()),
                finished: Mutex::new(VecDeque::new()),
                history,
            }),
        }
    }

    /// Report new device conditions. Attempts waiting on constraints are
    /// re-evaluated immediately.
    pub fn set_conditions(&self, conditions: DeviceConditions) {
        debug!(?conditions, "device conditions changed");
        self.inner.conditions.send_replace(conditions);
    }

    pub fn conditions(&self) -> DeviceConditions {
        *self.inner.conditions.borrow()
    }

    /// Latest attempt scheduled under a unique name, if any.
    pub fn unique_attempt(&self, name: &str) -> Option<AttemptId> {
        lock(&self.inner.unique).get(name).copied()
    }

    /// Ids of every attempt this scheduler knows about.
    pub fn attempt_ids(&self) -> Vec<AttemptId> {
        lock(&self.inner.attempts).keys().copied().collect()
    }
}

impl Inner {
    fn spawn_attempt(self: &Arc<Self>, request: WorkRequest) -> AttemptId {
        let id = AttemptId::new();
        let (status, _) = watch::channel(WorkStatus::enqueued());
        let (cancel_tx, cancel_rx) = oneshot::channel();

        lock(&self.attempts).insert(
            id,
            AttemptRecord {
                status,
                cancel: Some(cancel_tx),
            },
        );

        let span = info_span!(
            "attempt",
            attempt.id = %id,
            worker = request.input.worker.as_deref().unwrap_or("<none>"),
        );
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.run_attempt(id, request, cancel_rx).await }.instrument(span));

        id
    }

    async fn run_attempt(
        self: Arc<Self>,
        id: AttemptId,
        request: WorkRequest,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let mut conditions = self.conditions.subscribe();
        let mut run_count: u32 = 0;

        loop {
            if !request.constraints.is_unconstrained() {
                let eligible = tokio::select! {
                    eligible = wait_until_eligible(&mut conditions, &request.constraints) => eligible,
                    _ = &mut cancel_rx => false,
                };
                if !eligible {
                    debug!("attempt stopped while waiting for constraints");
                    return;
                }
            }

            let started = self.update(id, |status| {
                status.state = WorkState::Running;
                status.attempt_count = run_count;
            });
            if !started {
                return;
            }

            let attempt = Attempt {
                id,
                input: request.input.clone(),
                run_attempt_count: run_count,
            };

            let result = tokio::select! {
                result = self.worker.do_work(attempt) => result,
                _ = &mut cancel_rx => {
                    info!("attempt cancelled while running");
                    return;
                }
            };

            debug!(result = result.label(), run = run_count, "attempt run finished");

            let next_delay = match (result, request.kind) {
                (WorkResult::Retry, _) => {
                    run_count += 1;
                    self.update(id, |status| {
                        status.state = WorkState::Enqueued;
                        status.attempt_count = run_count;
                    });
                    self.options.backoff.delay(run_count)
                }
                (WorkResult::Cancelled, _) => {
                    self.finish(id, WorkState::Cancelled, None);
                    return;
                }
                (WorkResult::Success(output), RequestKind::OneTime) => {
                    self.finish(id, WorkState::Succeeded, output);
                    return;
                }
                (WorkResult::Failure(output), RequestKind::OneTime) => {
                    self.finish(id, WorkState::Failed, output);
                    return;
                }
                (WorkResult::Success(_) | WorkResult::Failure(_), RequestKind::Periodic { interval }) => {
                    run_count = 0;
                    self.update(id, |status| {
                        status.state = WorkState::Enqueued;
                        status.attempt_count = 0;
                        status.output = None;
                    });
                    interval
                }
            };

            if !self.sleep_or_cancel(next_delay, &mut cancel_rx).await {
                return;
            }
        }
    }

    /// Returns `false` if the attempt was cancelled during the sleep.
    async fn sleep_or_cancel(&self, delay: Duration, cancel_rx: &mut oneshot::Receiver<()>) -> bool {
        debug!(?delay, "attempt waiting before next run");
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = cancel_rx => false,
        }
    }

    /// Apply `f` to a non-terminal status. Returns whether it was applied.
    fn update(&self, id: AttemptId, f: impl FnOnce(&mut WorkStatus)) -> bool {
        let attempts = lock(&self.attempts);
        let Some(record) = attempts.get(&id) else {
            return false;
        };

        let mut applied = false;
        record.status.send_if_modified(|status| {
            if status.state.is_finished() {
                return false;
            }
            f(status);
            applied = true;
            true
        });
        applied
    }

    fn finish(&self, id: AttemptId, state: WorkState, output: Option<String>) {
        if self.update(id, |status| {
            status.state = state;
            status.output = output;
        }) {
            info!(%state, "attempt finished");
            self.retire(id);
        }
    }

    /// Record that `id` reached a terminal state and forget the oldest
    /// finished attempts beyond the history bound.
    ///
    /// Must not be called with `unique` or `attempts` held.
    fn retire(&self, id: AttemptId) {
        let expired: Vec<AttemptId> = {
            let mut finished = lock(&self.finished);
            finished.push_back(id);
            let excess = finished.len().saturating_sub(self.history);
            finished.drain(..excess).collect()
        };
        if expired.is_empty() {
            return;
        }

        let mut unique = lock(&self.unique);
        let mut attempts = lock(&self.attempts);
        for old in &expired {
            attempts.remove(old);
        }
        unique.retain(|_, latest| !expired.contains(latest));
        debug!(forgotten = expired.len(), "finished attempts pruned");
    }

    /// Returns whether this call moved the attempt to `cancelled`.
    fn cancel_attempt(&self, id: AttemptId) -> bool {
        let mut attempts = lock(&self.attempts);
        let Some(record) = attempts.get_mut(&id) else {
            debug!(attempt.id = %id, "cancel requested for unknown attempt");
            return false;
        };

        let cancelled = record.status.send_if_modified(|status| {
            if status.state.is_finished() {
                return false;
            }
            status.state = WorkState::Cancelled;
            true
        });

        if let Some(cancel) = record.cancel.take() {
            // The task may already have exited on its own.
            let _ = cancel.send(());
        }

        if cancelled {
            info!(attempt.id = %id, "attempt cancelled");
        }
        cancelled
    }

    fn is_finished(&self, id: AttemptId) -> bool {
        lock(&self.attempts)
            .get(&id)
            .map(|record| record.status.borrow().state.is_finished())
            .unwrap_or(true)
    }
}

/// Resolves once `constraints` hold, or `false` if the scheduler went away.
async fn wait_until_eligible(
    conditions: &mut watch::Receiver<DeviceConditions>,
    constraints: &Constraints,
) -> bool {
    conditions
        .wait_for(|c| constraints.satisfied_by(c))
        .await
        .is_ok()
}

impl Scheduler for LocalScheduler {
    fn enqueue(&self, request: WorkRequest) -> BoxFuture<'_, Result<AttemptId>> {
        Box::pin(async move { Ok(self.inner.spawn_attempt(request)) })
    }

    fn enqueue_unique(
        &self,
        name: &str,
        policy: ExistingWorkPolicy,
        request: WorkRequest,
    ) -> BoxFuture<'_, Result<AttemptId>> {
        let name = name.to_string();
        Box::pin(async move {
            let (id, replaced) = {
                let mut unique = lock(&self.inner.unique);
                let mut replaced = None;

                if let Some(existing) = unique.get(&name).copied() {
                    if !self.inner.is_finished(existing) {
                        match policy {
                            ExistingWorkPolicy::Keep => {
                                debug!(name = %name, attempt.id = %existing, "keeping existing unique work");
                                return Ok(existing);
                            }
                            ExistingWorkPolicy::Replace => {
                                info!(name = %name, attempt.id = %existing, "replacing existing unique work");
                                if self.inner.cancel_attempt(existing) {
                                    replaced = Some(existing);
                                }
                            }
                        }
                    }
                }

                let id = self.inner.spawn_attempt(request);
                unique.insert(name, id);
                (id, replaced)
            };

            if let Some(old) = replaced {
                self.inner.retire(old);
            }
            Ok(id)
        })
    }

    fn cancel(&self, id: AttemptId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.inner.cancel_attempt(id) {
                self.inner.retire(id);
            }
            Ok(())
        })
    }

    fn status(&self, id: AttemptId) -> BoxFuture<'_, Option<WorkStatus>> {
        Box::pin(async move {
            lock(&self.inner.attempts)
                .get(&id)
                .map(|record| record.status.borrow().clone())
        })
    }

    fn watch(&self, id: AttemptId) -> BoxFuture<'_, Option<watch::Receiver<WorkStatus>>> {
        Box::pin(async move {
            lock(&self.inner.attempts)
                .get(&id)
                .map(|record| record.status.subscribe())
        })
    }
}
