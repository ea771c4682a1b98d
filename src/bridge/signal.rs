// src/bridge/signal.rs

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::AttemptId;

/// Result string reported by the executor, classified.
///
/// Parsing never fails: anything outside the known set is kept as
/// [`SignalResult::Unrecognized`] so the bridge can log it and fail the
/// attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalResult {
    Success,
    Retry,
    Failure,
    Unrecognized(String),
}

impl SignalResult {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "success" => SignalResult::Success,
            "retry" => SignalResult::Retry,
            "failure" => SignalResult::Failure,
            other => SignalResult::Unrecognized(other.to_string()),
        }
    }
}

impl From<&str> for SignalResult {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for SignalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalResult::Success => f.write_str("success"),
            SignalResult::Retry => f.write_str("retry"),
            SignalResult::Failure => f.write_str("failure"),
            SignalResult::Unrecognized(raw) => write!(f, "unrecognized({raw})"),
        }
    }
}

/// Completion message emitted by the executor for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSignal {
    pub attempt_id: AttemptId,
    pub result: SignalResult,
    pub output: Option<String>,
}

impl CompletionSignal {
    pub fn new(attempt_id: AttemptId, result: &str, output: Option<String>) -> Self {
        Self {
            attempt_id,
            result: SignalResult::parse(result),
            output,
        }
    }
}

/// What happened to a delivered completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Woke the attempt waiting on this id.
    Delivered,
    /// The id was already resolved; the signal was discarded.
    AlreadyResolved,
    /// No attempt is waiting on this id.
    Unknown,
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}
