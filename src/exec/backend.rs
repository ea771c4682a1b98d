// src/exec/backend.rs

//! Executor backend abstraction.
//!
//! The dispatch bridge talks to an `ExecutorBackend` instead of a concrete
//! transport. Production wiring uses the channel backend from
//! [`channel`](super::channel), drained by the stdio process host; tests
//! provide their own backend that records dispatches and reports whatever
//! host state the test needs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::scheduler::BoxFuture;
use crate::types::AttemptId;

/// Lifecycle state of the executor's host context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    /// No executor is attached; nothing can be dispatched.
    #[default]
    Detached,
    /// Attached, host app not in the foreground.
    Background,
    /// Attached, host app in the foreground.
    Foreground,
}

impl HostState {
    pub fn is_attached(&self) -> bool {
        !matches!(self, HostState::Detached)
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostState::Detached => "detached",
            HostState::Background => "background",
            HostState::Foreground => "foreground",
        };
        f.write_str(s)
    }
}

/// How the executor should run a dispatched attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// As a headless task, independent of any UI.
    Headless,
    /// Inside the running foreground app.
    Inline,
}

/// One unit of work sent to the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispatch {
    #[serde(rename = "id")]
    pub attempt_id: AttemptId,
    pub worker: String,
    pub payload: String,
    pub mode: DispatchMode,
    /// Number of previous runs of this attempt id.
    #[serde(rename = "attempt")]
    pub run_attempt_count: u32,
}

/// Trait abstracting how dispatches reach the executor.
pub trait ExecutorBackend: Send + Sync {
    /// Current state of the executor's host context.
    fn host_state(&self) -> HostState;

    /// Hand one dispatch to the executor.
    ///
    /// Must not wait for the work itself; completion is reported later as a
    /// completion signal.
    fn dispatch(&self, dispatch: Dispatch) -> BoxFuture<'_, Result<()>>;
}
