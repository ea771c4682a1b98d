// src/errors.rs

//! Crate-wide error types.
//!
//! [`BridgeError`] covers everything that is reported synchronously to a
//! caller (registration, enqueue, status queries, config loading).
//! [`AttemptFault`] covers problems that happen while an attempt is being
//! dispatched; those never reach the caller of `enqueue` and are instead
//! folded into the attempt's terminal [`WorkResult`](crate::scheduler::WorkResult).

use std::time::Duration;

use thiserror::Error;

use crate::scheduler::WorkResult;
use crate::types::AttemptId;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Invalid worker definition: {0}")]
    InvalidDefinition(String),

    #[error("Worker not registered: {0}")]
    NotRegistered(String),

    #[error("Worker '{0}' is periodic and cannot be enqueued")]
    PeriodicWorker(String),

    #[error("Work not found: {0}")]
    NotFound(AttemptId),

    #[error("Attempt {0} already has an open correlation record")]
    DuplicateAttempt(AttemptId),

    #[error("Executor unavailable: {0}")]
    ExecutorUnavailable(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Dispatch-time fault of a single attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptFault {
    /// The executor's host context is not attached. Always transient.
    #[error("executor unavailable: {0}")]
    ExecutorUnavailable(String),

    /// The attempt is missing a field it cannot run without.
    #[error("malformed attempt: missing {0}")]
    MalformedAttempt(&'static str),

    /// The executor reported a result string outside the known set.
    #[error("unrecognized completion result '{0}'")]
    UnrecognizedSignal(String),

    /// No completion signal arrived within the wait bound.
    #[error("no completion signal within {0:?}")]
    Timeout(Duration),
}

impl AttemptFault {
    /// Scheduler outcome for this fault.
    ///
    /// Transient faults retry; structural ones fail permanently.
    pub fn into_result(self, output: Option<String>) -> WorkResult {
        match self {
            AttemptFault::ExecutorUnavailable(_) | AttemptFault::Timeout(_) => WorkResult::Retry,
            AttemptFault::MalformedAttempt(_) | AttemptFault::UnrecognizedSignal(_) => {
                WorkResult::Failure(output)
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AttemptFault::ExecutorUnavailable(_) | AttemptFault::Timeout(_)
        )
    }
}
