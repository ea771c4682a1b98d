// src/bridge/dispatch.rs

//! Dispatch-and-wait protocol.
//!
//! The scheduler calls [`DispatchBridge`] (through [`AttemptWorker`]) once
//! per run of an attempt. The bridge:
//!
//! 1. validates that the attempt names a worker and carries a payload,
//! 2. checks the executor's host state,
//! 3. opens the correlation record and sends the dispatch,
//! 4. suspends until a completion signal, a cancel release or the timeout,
//! 5. translates whatever woke it into a [`WorkResult`].
//!
//! Faults along the way are [`AttemptFault`]s: they are logged here and
//! folded into the result, never surfaced to whoever enqueued the work.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bridge::correlation::{CorrelationTable, PendingCorrelation, Resolution};
use crate::bridge::signal::{CompletionSignal, Delivery, SignalResult};
use crate::errors::AttemptFault;
use crate::exec::{Dispatch, DispatchMode, ExecutorBackend, HostState};
use crate::presentation::{NotificationAdapter, NotificationTemplate};
use crate::scheduler::{Attempt, AttemptWorker, BoxFuture, WorkResult};
use crate::types::{AttemptId, ForegroundBehaviour};

/// Wait bound used when a worker does not set its own timeout.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeOptions {
    /// `None` waits for a signal indefinitely.
    pub default_timeout: Option<Duration>,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            default_timeout: Some(DEFAULT_DISPATCH_TIMEOUT),
        }
    }
}

/// Where an attempt is in the dispatch protocol. Used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    Dispatching,
    /// Host detached or blocking in the foreground; short-circuits to retry.
    ExecutorUnavailable,
    AwaitingSignal,
    ResolvedSuccess,
    ResolvedRetry,
    ResolvedFailure,
    Cancelled,
    /// Result handed back to the scheduler.
    Terminal,
}

impl AttemptPhase {
    pub fn of(result: &WorkResult) -> Self {
        match result {
            WorkResult::Success(_) => AttemptPhase::ResolvedSuccess,
            WorkResult::Retry => AttemptPhase::ResolvedRetry,
            WorkResult::Failure(_) => AttemptPhase::ResolvedFailure,
            WorkResult::Cancelled => AttemptPhase::Cancelled,
        }
    }
}

impl fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptPhase::Dispatching => "dispatching",
            AttemptPhase::ExecutorUnavailable => "executor_unavailable",
            AttemptPhase::AwaitingSignal => "awaiting_signal",
            AttemptPhase::ResolvedSuccess => "resolved_success",
            AttemptPhase::ResolvedRetry => "resolved_retry",
            AttemptPhase::ResolvedFailure => "resolved_failure",
            AttemptPhase::Cancelled => "cancelled",
            AttemptPhase::Terminal => "terminal",
        };
        f.write_str(s)
    }
}

/// Dispatch/correlation bridge between the scheduler and the executor.
pub struct DispatchBridge {
    executor: Arc<dyn ExecutorBackend>,
    correlations: Arc<CorrelationTable>,
    presenter: NotificationAdapter,
    options: BridgeOptions,
}

impl fmt::Debug for DispatchBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchBridge")
            .field("correlations", &self.correlations)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl DispatchBridge {
    pub fn new(
        executor: Arc<dyn ExecutorBackend>,
        presenter: NotificationAdapter,
        options: BridgeOptions,
    ) -> Self {
        Self {
            executor,
            correlations: CorrelationTable::new(),
            presenter,
            options,
        }
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    pub fn presenter(&self) -> &NotificationAdapter {
        &self.presenter
    }

    /// Deliver a completion signal reported by the executor.
    pub fn signal_completion(&self, signal: CompletionSignal) -> Delivery {
        self.correlations.deliver(signal)
    }

    /// Release a waiting attempt as cancelled. Returns `false` if the
    /// attempt was not waiting.
    pub fn cancel(&self, id: AttemptId) -> bool {
        self.correlations.release(id)
    }

    pub fn is_waiting(&self, id: AttemptId) -> bool {
        self.correlations.is_open(id)
    }

    /// Number of attempts currently waiting for a signal.
    pub fn in_flight(&self) -> usize {
        self.correlations.open_count()
    }

    /// Run one attempt through the full protocol.
    pub async fn run_attempt(&self, attempt: Attempt) -> WorkResult {
        let id = attempt.id;
        let result = match self.dispatch_and_wait(&attempt).await {
            Ok(result) => result,
            Err(fault) => {
                if fault.is_transient() {
                    info!(attempt.id = %id, %fault, "attempt will be retried");
                } else {
                    warn!(attempt.id = %id, %fault, "attempt failed");
                }
                fault.into_result(None)
            }
        };

        debug!(attempt.id = %id, phase = %AttemptPhase::of(&result), "attempt resolved");
        debug!(attempt.id = %id, phase = %AttemptPhase::Terminal, result = result.label(), "returning result to scheduler");
        result
    }

    async fn dispatch_and_wait(&self, attempt: &Attempt) -> Result<WorkResult, AttemptFault> {
        let worker = attempt
            .input
            .worker
            .as_deref()
            .ok_or(AttemptFault::MalformedAttempt("worker name"))?;
        let payload = attempt
            .input
            .payload
            .as_deref()
            .ok_or(AttemptFault::MalformedAttempt("payload"))?;

        let host_state = self.executor.host_state();
        let mode = match (host_state, attempt.input.foreground_behaviour) {
            (HostState::Detached, _) => {
                return Err(executor_unavailable(attempt.id, host_state, "executor host is not attached"));
            }
            (HostState::Foreground, ForegroundBehaviour::Blocking) => {
                return Err(executor_unavailable(
                    attempt.id,
                    host_state,
                    "host is in the foreground and the worker is blocking",
                ));
            }
            (HostState::Foreground, ForegroundBehaviour::Foreground) => DispatchMode::Inline,
            _ => DispatchMode::Headless,
        };

        let pending = match self.correlations.open(attempt.id) {
            Ok(pending) => pending,
            Err(err) => {
                warn!(attempt.id = %attempt.id, error = %err, "attempt is already waiting; retrying later");
                return Ok(WorkResult::Retry);
            }
        };

        debug!(
            attempt.id = %attempt.id,
            worker,
            ?mode,
            run = attempt.run_attempt_count,
            phase = %AttemptPhase::Dispatching,
            "dispatching attempt"
        );

        let notification = match (mode, attempt.input.notification.as_ref()) {
            (DispatchMode::Headless, Some(template)) => {
                Some(ShownNotification::show(&self.presenter, worker, attempt.id, template))
            }
            _ => None,
        };

        let dispatch = Dispatch {
            attempt_id: attempt.id,
            worker: worker.to_string(),
            payload: payload.to_string(),
            mode,
            run_attempt_count: attempt.run_attempt_count,
        };

        let outcome = match self.executor.dispatch(dispatch).await {
            Ok(()) => self.await_signal(attempt, pending).await,
            Err(err) => {
                drop(pending);
                debug!(attempt.id = %attempt.id, phase = %AttemptPhase::ExecutorUnavailable, "dispatch send failed");
                Err(AttemptFault::ExecutorUnavailable(err.to_string()))
            }
        };

        if let Some(notification) = notification {
            let result = match &outcome {
                Ok(result) => result.clone(),
                Err(fault) => fault.clone().into_result(None),
            };
            notification.finish(&result);
        }

        outcome
    }

    async fn await_signal(
        &self,
        attempt: &Attempt,
        pending: PendingCorrelation,
    ) -> Result<WorkResult, AttemptFault> {
        let timeout = attempt.input.timeout.or(self.options.default_timeout);
        debug!(attempt.id = %attempt.id, ?timeout, phase = %AttemptPhase::AwaitingSignal, "waiting for completion signal");

        let resolution = pending
            .wait(timeout)
            .await
            .ok_or_else(|| AttemptFault::Timeout(timeout.unwrap_or_default()))?;

        match resolution {
            Resolution::Cancelled => Ok(WorkResult::Cancelled),
            Resolution::Signalled(signal) => match signal.result {
                SignalResult::Success => Ok(WorkResult::Success(signal.output)),
                SignalResult::Retry => Ok(WorkResult::Retry),
                SignalResult::Failure => Ok(WorkResult::Failure(signal.output)),
                SignalResult::Unrecognized(raw) => {
                    let fault = AttemptFault::UnrecognizedSignal(raw);
                    warn!(attempt.id = %attempt.id, %fault, "treating unrecognized result as failure");
                    Ok(fault.into_result(signal.output))
                }
            },
        }
    }
}

fn executor_unavailable(id: AttemptId, host: HostState, reason: &str) -> AttemptFault {
    debug!(attempt.id = %id, %host, phase = %AttemptPhase::ExecutorUnavailable, reason, "not dispatching");
    AttemptFault::ExecutorUnavailable(reason.to_string())
}

/// Notification shown for one headless attempt.
///
/// The scheduler drops the attempt future when the attempt is cancelled or
/// replaced, so the notification is cleared on drop as well as on
/// [`finish`](Self::finish).
struct ShownNotification<'a> {
    presenter: &'a NotificationAdapter,
    attempt_id: AttemptId,
    finished: bool,
}

impl<'a> ShownNotification<'a> {
    fn show(
        presenter: &'a NotificationAdapter,
        worker: &str,
        attempt_id: AttemptId,
        template: &NotificationTemplate,
    ) -> Self {
        presenter.attempt_started(worker, attempt_id, Some(template));
        Self {
            presenter,
            attempt_id,
            finished: false,
        }
    }

    fn finish(mut self, result: &WorkResult) {
        self.finished = true;
        self.presenter.attempt_finished(self.attempt_id, result);
    }
}

impl Drop for ShownNotification<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.presenter
                .attempt_finished(self.attempt_id, &WorkResult::Cancelled);
        }
    }
}

impl AttemptWorker for DispatchBridge {
    fn do_work(&self, attempt: Attempt) -> BoxFuture<'_, WorkResult> {
        Box::pin(self.run_attempt(attempt))
    }
}
