use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of one enqueued unit of work.
///
/// Assigned by the scheduler. A one-time enqueue gets a fresh id; a periodic
/// series keeps one id for its whole lifetime; retries keep the id of the
/// attempt they retry. Completion signals are matched purely on this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(Uuid);

impl AttemptId {
    pub fn new() -> Self {
        AttemptId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for AttemptId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(AttemptId)
    }
}

/// How a registered worker is scheduled.
///
/// - `Queued`: every enqueue becomes an independent attempt.
/// - `OneTime`: enqueue is unique per worker name; while an attempt for the
///   name is still pending or running, enqueue returns that attempt.
/// - `Periodic`: scheduled at registration time as a repeating series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Queued,
    OneTime,
    Periodic,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queued" | "queue" => Ok(ExecutionMode::Queued),
            "onetime" | "one_time" | "one-time" => Ok(ExecutionMode::OneTime),
            "periodic" => Ok(ExecutionMode::Periodic),
            other => Err(format!(
                "incompatible worker type: {other} (expected \"queued\", \"oneTime\" or \"periodic\")"
            )),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionMode::Queued => "queued",
            ExecutionMode::OneTime => "oneTime",
            ExecutionMode::Periodic => "periodic",
        };
        f.write_str(s)
    }
}

/// What to do with a dispatch that arrives while the host app is in the
/// foreground.
///
/// - `HeadlessTask`: always run as a headless task.
/// - `Foreground`: run inline in the foreground app.
/// - `Blocking`: do not run while in the foreground; the attempt is retried
///   later (default behaviour).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForegroundBehaviour {
    HeadlessTask,
    Foreground,
    #[default]
    Blocking,
}

impl FromStr for ForegroundBehaviour {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "headlesstask" | "headless_task" | "headless" => Ok(ForegroundBehaviour::HeadlessTask),
            "foreground" => Ok(ForegroundBehaviour::Foreground),
            "blocking" => Ok(ForegroundBehaviour::Blocking),
            other => Err(format!(
                "invalid foreground behaviour: {other} (expected \"headlessTask\", \"foreground\" or \"blocking\")"
            )),
        }
    }
}

/// Lifecycle state of an attempt as reported by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkState {
    Enqueued,
    Running,
    Blocked,
    Succeeded,
    Failed,
    Cancelled,
}

impl WorkState {
    /// Terminal states never change again.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            WorkState::Succeeded | WorkState::Failed | WorkState::Cancelled
        )
    }
}

impl fmt::Display for WorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkState::Enqueued => "enqueued",
            WorkState::Running => "running",
            WorkState::Blocked => "blocked",
            WorkState::Succeeded => "succeeded",
            WorkState::Failed => "failed",
            WorkState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Snapshot pushed to status subscribers and returned by status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkStatus {
    pub state: WorkState,
    /// How many times this attempt has already been run.
    pub attempt_count: u32,
    /// Output value, present only once the attempt finished.
    #[serde(rename = "value")]
    pub output: Option<String>,
}

impl WorkStatus {
    pub fn enqueued() -> Self {
        Self {
            state: WorkState::Enqueued,
            attempt_count: 0,
            output: None,
        }
    }
}
