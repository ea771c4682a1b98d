// src/registry/definition.rs

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::model::parse_duration;
use crate::constraints::{ConstraintSpec, Constraints, translate};
use crate::errors::{BridgeError, Result};
use crate::presentation::NotificationTemplate;
use crate::scheduler::AttemptInput;
use crate::types::{ExecutionMode, ForegroundBehaviour};

/// Worker definition as supplied by the host, before validation.
///
/// The same shape is read from `[worker.<name>]` config sections and from
/// `register` messages sent by the executor:
///
/// ```toml
/// [worker.sync]
/// type = "periodic"
/// repeat_interval = "30m"
/// timeout = "2m"
/// foreground_behaviour = "headlessTask"
///
/// [worker.sync.notification]
/// title = "Syncing"
/// text = "Fetching new items"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawWorkerDefinition {
    /// Filled in from the section key when read from config.
    #[serde(default)]
    pub name: Option<String>,

    /// `queued`, `oneTime` or `periodic`.
    #[serde(default, rename = "type", alias = "mode")]
    pub mode: Option<String>,

    #[serde(default)]
    pub constraints: ConstraintSpec,

    #[serde(default)]
    pub notification: Option<NotificationTemplate>,

    /// Duration string such as `"30m"`. Periodic workers only.
    #[serde(default, alias = "repeatInterval")]
    pub repeat_interval: Option<String>,

    /// Wait bound for the completion signal, e.g. `"2m"`.
    #[serde(default)]
    pub timeout: Option<String>,

    /// `headlessTask`, `foreground` or `blocking`.
    #[serde(default, alias = "foregroundBehaviour")]
    pub foreground_behaviour: Option<String>,
}

/// Validated worker definition held by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerDefinition {
    pub name: String,
    pub mode: ExecutionMode,
    pub constraints: ConstraintSpec,
    pub notification: Option<NotificationTemplate>,
    /// Requested period; clamped by the registry when scheduling.
    pub repeat_interval: Option<Duration>,
    pub timeout: Option<Duration>,
    pub foreground_behaviour: ForegroundBehaviour,
}

impl WorkerDefinition {
    pub fn new(name: impl Into<String>, mode: ExecutionMode) -> Self {
        Self {
            name: name.into(),
            mode,
            constraints: ConstraintSpec::default(),
            notification: None,
            repeat_interval: None,
            timeout: None,
            foreground_behaviour: ForegroundBehaviour::default(),
        }
    }

    pub fn constraints(&self) -> Constraints {
        translate(&self.constraints)
    }

    /// Input carried by every attempt of this worker.
    pub fn attempt_input(&self, payload: impl Into<String>) -> AttemptInput {
        AttemptInput {
            worker: Some(self.name.clone()),
            payload: Some(payload.into()),
            timeout: self.timeout,
            foreground_behaviour: self.foreground_behaviour,
            notification: self.notification.clone(),
        }
    }
}

/// Check that a worker name can be used as a channel id and log field.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BridgeError::InvalidDefinition(
            "worker name must not be empty".to_string(),
        ));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(BridgeError::InvalidDefinition(format!(
            "worker name {name:?} must not contain whitespace or control characters"
        )));
    }
    Ok(())
}

fn parse_optional_duration(field: &str, name: &str, value: Option<&str>) -> Result<Option<Duration>> {
    value
        .map(|raw| {
            parse_duration(raw).map_err(|e| {
                BridgeError::InvalidDefinition(format!("worker '{name}': invalid {field}: {e}"))
            })
        })
        .transpose()
}

impl TryFrom<RawWorkerDefinition> for WorkerDefinition {
    type Error = BridgeError;

    fn try_from(raw: RawWorkerDefinition) -> std::result::Result<Self, Self::Error> {
        let name = raw
            .name
            .map(|name| name.trim().to_string())
            .unwrap_or_default();
        validate_name(&name)?;

        let mode = raw
            .mode
            .as_deref()
            .ok_or_else(|| {
                BridgeError::InvalidDefinition(format!("worker '{name}': missing type"))
            })?
            .parse::<ExecutionMode>()
            .map_err(|e| BridgeError::InvalidDefinition(format!("worker '{name}': {e}")))?;

        let foreground_behaviour = match raw.foreground_behaviour.as_deref() {
            Some(raw) => raw
                .parse()
                .map_err(|e| BridgeError::InvalidDefinition(format!("worker '{name}': {e}")))?,
            None => ForegroundBehaviour::default(),
        };

        let repeat_interval =
            parse_optional_duration("repeat_interval", &name, raw.repeat_interval.as_deref())?;
        let timeout = parse_optional_duration("timeout", &name, raw.timeout.as_deref())?;

        if timeout.is_some_and(|t| t.is_zero()) {
            return Err(BridgeError::InvalidDefinition(format!(
                "worker '{name}': timeout must be greater than zero"
            )));
        }

        Ok(WorkerDefinition {
            name,
            mode,
            constraints: raw.constraints,
            notification: raw.notification,
            repeat_interval,
            timeout,
            foreground_behaviour,
        })
    }
}
