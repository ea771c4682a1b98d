// src/registry/mod.rs

//! Work registry: worker name -> definition.
//!
//! Registering a periodic worker schedules it right away as unique work
//! under its own name with the `Replace` policy, so re-registering cancels
//! the previous series and exactly one series exists per name.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, info};

use crate::errors::{BridgeError, Result};
use crate::scheduler::{ExistingWorkPolicy, RequestKind, Scheduler, WorkRequest};
use crate::sync::{read, write};
use crate::types::{AttemptId, ExecutionMode};

pub mod definition;

pub use definition::{RawWorkerDefinition, WorkerDefinition, validate_name};

/// Period used when a periodic worker does not request one.
pub const DEFAULT_REPEAT_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Shortest period a periodic worker may run at.
pub const MIN_PERIODIC_INTERVAL: Duration = Duration::from_secs(15 * 60);

pub struct WorkRegistry {
    scheduler: Arc<dyn Scheduler>,
    definitions: RwLock<HashMap<String, Arc<WorkerDefinition>>>,
    min_periodic_interval: Duration,
}

impl std::fmt::Debug for WorkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkRegistry")
            .field("workers", &self.names())
            .field("min_periodic_interval", &self.min_periodic_interval)
            .finish_non_exhaustive()
    }
}

impl WorkRegistry {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_min_interval(scheduler, MIN_PERIODIC_INTERVAL)
    }

    pub fn with_min_interval(scheduler: Arc<dyn Scheduler>, min_periodic_interval: Duration) -> Self {
        Self {
            scheduler,
            definitions: RwLock::new(HashMap::new()),
            min_periodic_interval,
        }
    }

    /// Validate and register a raw definition.
    pub async fn register(&self, raw: RawWorkerDefinition) -> Result<Option<AttemptId>> {
        let definition = WorkerDefinition::try_from(raw)?;
        self.register_definition(definition).await
    }

    /// Insert or replace a definition.
    ///
    /// Returns the id of the periodic series for periodic workers.
    pub async fn register_definition(&self, definition: WorkerDefinition) -> Result<Option<AttemptId>> {
        validate_name(&definition.name)?;

        let definition = Arc::new(definition);
        let replaced = write(&self.definitions)
            .insert(definition.name.clone(), Arc::clone(&definition))
            .is_some();

        info!(
            worker = %definition.name,
            mode = %definition.mode,
            replaced,
            "worker registered"
        );

        if definition.mode != ExecutionMode::Periodic {
            return Ok(None);
        }

        let interval = self.periodic_interval(&definition);
        let request = WorkRequest {
            // Periodic runs have no caller to supply a payload.
            input: definition.attempt_input(String::new()),
            constraints: definition.constraints(),
            kind: RequestKind::Periodic { interval },
        };

        let id = self
            .scheduler
            .enqueue_unique(&definition.name, ExistingWorkPolicy::Replace, request)
            .await?;

        debug!(worker = %definition.name, attempt.id = %id, ?interval, "periodic series scheduled");
        Ok(Some(id))
    }

    /// Effective period of a periodic worker after clamping.
    pub fn periodic_interval(&self, definition: &WorkerDefinition) -> Duration {
        definition
            .repeat_interval
            .unwrap_or(DEFAULT_REPEAT_INTERVAL)
            .max(self.min_periodic_interval)
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<WorkerDefinition>> {
        read(&self.definitions)
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::NotRegistered(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        read(&self.definitions).contains_key(name)
    }

    /// Registered worker names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.definitions).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        read(&self.definitions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
