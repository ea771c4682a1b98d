// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::bridge::{BridgeOptions, DEFAULT_DISPATCH_TIMEOUT};
use crate::exec::DEFAULT_CHANNEL_CAPACITY;
use crate::registry::{MIN_PERIODIC_INTERVAL, RawWorkerDefinition, WorkerDefinition};
use crate::scheduler::{BackoffPolicy, SchedulerOptions};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [bridge]
/// default_timeout = "10m"
/// min_periodic_interval = "15m"
///
/// [scheduler]
/// backoff = "exponential"
/// backoff_delay = "30s"
/// max_backoff = "5h"
///
/// [executor]
/// cmd = "node worker-host.js"
///
/// [worker.upload]
/// type = "queued"
/// ```
///
/// All sections are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub bridge: RawBridgeSection,

    #[serde(default)]
    pub scheduler: RawSchedulerSection,

    /// Executor process to host. Without it nothing is dispatched.
    #[serde(default)]
    pub executor: Option<ExecutorSection>,

    /// Worker definitions from `[worker.<name>]`, keyed by name.
    #[serde(default)]
    pub worker: BTreeMap<String, RawWorkerDefinition>,
}

/// `[bridge]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBridgeSection {
    /// Duration string, or `"off"` to wait for signals without a bound.
    #[serde(default)]
    pub default_timeout: Option<String>,

    #[serde(default)]
    pub min_periodic_interval: Option<String>,
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSchedulerSection {
    /// `"exponential"` (default) or `"linear"`.
    #[serde(default)]
    pub backoff: Option<String>,

    #[serde(default)]
    pub backoff_delay: Option<String>,

    #[serde(default)]
    pub max_backoff: Option<String>,
}

/// `[executor]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutorSection {
    /// Shell command that starts the executor.
    pub cmd: String,

    /// Dispatches buffered while the executor is busy.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub bridge: BridgeSection,
    pub scheduler: SchedulerOptions,
    pub executor: Option<ExecutorSection>,
    pub worker: BTreeMap<String, WorkerDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSection {
    pub default_timeout: Option<Duration>,
    pub min_periodic_interval: Duration,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            default_timeout: Some(DEFAULT_DISPATCH_TIMEOUT),
            min_periodic_interval: MIN_PERIODIC_INTERVAL,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            bridge: BridgeSection::default(),
            scheduler: SchedulerOptions {
                backoff: BackoffPolicy::default(),
            },
            executor: None,
            worker: BTreeMap::new(),
        }
    }
}

impl ConfigFile {
    /// Build a config from parts that were already validated.
    pub fn new_unchecked(
        bridge: BridgeSection,
        scheduler: SchedulerOptions,
        executor: Option<ExecutorSection>,
        worker: BTreeMap<String, WorkerDefinition>,
    ) -> Self {
        Self {
            bridge,
            scheduler,
            executor,
            worker,
        }
    }

    pub fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            default_timeout: self.bridge.default_timeout,
        }
    }
}

/// Parse duration strings like `"500ms"`, `"3s"`, `"10m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    match unit_part.trim().to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(value.saturating_mul(60 * 60))),
        unit => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}
