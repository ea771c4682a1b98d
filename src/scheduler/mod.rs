// src/scheduler/mod.rs

//! Scheduler collaborator interface.
//!
//! The bridge does not decide *when* work runs. That is the job of an
//! external scheduler which owns the durable queue, evaluates run
//! constraints, applies retry backoff and reports live status. This module
//! defines the seam:
//!
//! - [`Scheduler`] is what the registry, entry surface and status fan-out
//!   talk to (enqueue, cancel, status, live status stream).
//! - [`AttemptWorker`] is what the scheduler calls when an attempt becomes
//!   eligible; the dispatch bridge implements it.
//! - [`LocalScheduler`] in [`local`] is an in-process implementation used by
//!   the binary and the tests.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::constraints::Constraints;
use crate::errors::Result;
use crate::presentation::NotificationTemplate;
use crate::types::{AttemptId, ForegroundBehaviour, WorkStatus};

pub mod backoff;
pub mod conditions;
pub mod local;

pub use backoff::{BackoffKind, BackoffPolicy};
pub use conditions::{DeviceConditions, NetworkState};
pub use local::{LocalScheduler, SchedulerOptions};

/// Boxed future returned by the collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Input data carried by every attempt of a request.
///
/// `worker` and `payload` are optional on purpose: a collaborator that
/// rebuilds attempts from durable storage may hand back incomplete records,
/// and the bridge must classify those as malformed rather than crash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptInput {
    pub worker: Option<String>,
    pub payload: Option<String>,
    /// Hard bound on waiting for the completion signal.
    pub timeout: Option<Duration>,
    pub foreground_behaviour: ForegroundBehaviour,
    pub notification: Option<NotificationTemplate>,
}

/// Scheduling shape of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    OneTime,
    Periodic { interval: Duration },
}

/// A unit of work handed to the scheduler.
#[derive(Debug, Clone)]
pub struct WorkRequest {
    pub input: AttemptInput,
    pub constraints: Constraints,
    pub kind: RequestKind,
}

/// What to do when unique work with the same name already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingWorkPolicy {
    /// Cancel the existing work and schedule the new request.
    Replace,
    /// Keep the existing work if it is still pending or running.
    Keep,
}

/// One invocation of an attempt by the scheduler.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub id: AttemptId,
    pub input: AttemptInput,
    /// Number of previous runs of this attempt id.
    pub run_attempt_count: u32,
}

/// Terminal answer of a single invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkResult {
    Success(Option<String>),
    Retry,
    Failure(Option<String>),
    /// The wait was released by a cancel request.
    Cancelled,
}

impl WorkResult {
    pub fn label(&self) -> &'static str {
        match self {
            WorkResult::Success(_) => "success",
            WorkResult::Retry => "retry",
            WorkResult::Failure(_) => "failure",
            WorkResult::Cancelled => "cancelled",
        }
    }
}

/// The scheduler as seen by the bridge's callers.
pub trait Scheduler: Send + Sync {
    /// Enqueue a request as a new attempt and return its id.
    fn enqueue(&self, request: WorkRequest) -> BoxFuture<'_, Result<AttemptId>>;

    /// Enqueue a request that is unique per `name`.
    fn enqueue_unique(
        &self,
        name: &str,
        policy: ExistingWorkPolicy,
        request: WorkRequest,
    ) -> BoxFuture<'_, Result<AttemptId>>;

    /// Cancel an attempt. Unknown or already finished ids are ignored.
    fn cancel(&self, id: AttemptId) -> BoxFuture<'_, Result<()>>;

    /// Current status of an attempt, if the scheduler knows it.
    fn status(&self, id: AttemptId) -> BoxFuture<'_, Option<WorkStatus>>;

    /// Live status stream of an attempt.
    ///
    /// The receiver only reports changes made after it was created; callers
    /// that need the current value must read it themselves.
    fn watch(&self, id: AttemptId) -> BoxFuture<'_, Option<watch::Receiver<WorkStatus>>>;
}

/// Called by the scheduler for every run of an attempt.
pub trait AttemptWorker: Send + Sync {
    fn do_work(&self, attempt: Attempt) -> BoxFuture<'_, WorkResult>;
}
