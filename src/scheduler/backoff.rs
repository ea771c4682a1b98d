// src/scheduler/backoff.rs

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_BACKOFF_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Exponential,
    Linear,
}

impl FromStr for BackoffKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exponential" => Ok(BackoffKind::Exponential),
            "linear" => Ok(BackoffKind::Linear),
            other => Err(format!(
                "invalid backoff: {other} (expected \"exponential\" or \"linear\")"
            )),
        }
    }
}

/// Delay applied by the scheduler before re-running a retried attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub kind: BackoffKind,
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            kind: BackoffKind::Exponential,
            initial: DEFAULT_BACKOFF_DELAY,
            max: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl BackoffPolicy {
    /// Delay before run number `retry` (1 for the first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        let delay = match self.kind {
            BackoffKind::Linear => self.initial.saturating_mul(retry),
            BackoffKind::Exponential => {
                let factor = 1u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
                self.initial.saturating_mul(factor)
            }
        };
        delay.min(self.max)
    }
}
