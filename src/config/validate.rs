// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::model::{
    BridgeSection, ConfigFile, ExecutorSection, RawBridgeSection, RawConfigFile,
    RawSchedulerSection, parse_duration,
};
use crate::errors::{BridgeError, Result};
use crate::registry::{RawWorkerDefinition, WorkerDefinition};
use crate::scheduler::{BackoffKind, BackoffPolicy, SchedulerOptions};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = BridgeError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let bridge = validate_bridge(&raw.bridge)?;
        let scheduler = validate_scheduler(&raw.scheduler)?;
        if let Some(executor) = &raw.executor {
            validate_executor(executor)?;
        }
        let worker = validate_workers(raw.worker)?;

        Ok(ConfigFile::new_unchecked(
            bridge,
            scheduler,
            raw.executor,
            worker,
        ))
    }
}

fn duration_field(section: &str, key: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| BridgeError::ConfigError(format!("[{section}].{key}: {e}")))
}

fn validate_bridge(raw: &RawBridgeSection) -> Result<BridgeSection> {
    let mut bridge = BridgeSection::default();

    match raw.default_timeout.as_deref().map(str::trim) {
        None => {}
        Some("off") | Some("none") => bridge.default_timeout = None,
        Some(value) => {
            let timeout = duration_field("bridge", "default_timeout", value)?;
            if timeout.is_zero() {
                return Err(BridgeError::ConfigError(
                    "[bridge].default_timeout must be > 0 (use \"off\" to disable)".to_string(),
                ));
            }
            bridge.default_timeout = Some(timeout);
        }
    }

    if let Some(value) = raw.min_periodic_interval.as_deref() {
        bridge.min_periodic_interval = duration_field("bridge", "min_periodic_interval", value)?;
    }

    Ok(bridge)
}

fn validate_scheduler(raw: &RawSchedulerSection) -> Result<SchedulerOptions> {
    let mut backoff = BackoffPolicy::default();

    if let Some(kind) = raw.backoff.as_deref() {
        backoff.kind = kind
            .parse::<BackoffKind>()
            .map_err(|e| BridgeError::ConfigError(format!("[scheduler].backoff: {e}")))?;
    }
    if let Some(value) = raw.backoff_delay.as_deref() {
        backoff.initial = duration_field("scheduler", "backoff_delay", value)?;
    }
    if let Some(value) = raw.max_backoff.as_deref() {
        backoff.max = duration_field("scheduler", "max_backoff", value)?;
    }

    if backoff.initial.is_zero() {
        return Err(BridgeError::ConfigError(
            "[scheduler].backoff_delay must be > 0".to_string(),
        ));
    }
    if backoff.max < backoff.initial {
        return Err(BridgeError::ConfigError(format!(
            "[scheduler].max_backoff ({:?}) must not be shorter than backoff_delay ({:?})",
            backoff.max, backoff.initial
        )));
    }

    Ok(SchedulerOptions { backoff })
}

fn validate_executor(executor: &ExecutorSection) -> Result<()> {
    if executor.cmd.trim().is_empty() {
        return Err(BridgeError::ConfigError(
            "[executor].cmd must not be empty".to_string(),
        ));
    }
    if executor.channel_capacity == 0 {
        return Err(BridgeError::ConfigError(
            "[executor].channel_capacity must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_workers(
    raw: BTreeMap<String, RawWorkerDefinition>,
) -> Result<BTreeMap<String, WorkerDefinition>> {
    let mut workers = BTreeMap::new();

    for (key, mut definition) in raw {
        if let Some(name) = definition.name.as_deref().filter(|name| *name != key) {
            return Err(BridgeError::ConfigError(format!(
                "[worker.{key}] has conflicting name '{name}'"
            )));
        }
        definition.name = Some(key.clone());

        let definition = WorkerDefinition::try_from(definition)
            .map_err(|e| BridgeError::ConfigError(format!("[worker.{key}]: {e}")))?;
        workers.insert(key, definition);
    }

    Ok(workers)
}
