// src/manager.rs

//! Entry surface.
//!
//! [`WorkManager`] is what hosts call: register workers, enqueue and cancel
//! work, query status, subscribe to live status and report completion.
//! It owns the registry and the status fan-out and shares the scheduler and
//! the dispatch bridge with the scheduler's attempt tasks.

use std::sync::Arc;

use tracing::{debug, info};

use crate::bridge::{BridgeOptions, CompletionSignal, Delivery, DispatchBridge};
use crate::errors::{BridgeError, Result};
use crate::exec::ExecutorBackend;
use crate::presentation::NotificationAdapter;
use crate::registry::{RawWorkerDefinition, WorkRegistry, WorkerDefinition};
use crate::scheduler::{
    ExistingWorkPolicy, LocalScheduler, RequestKind, Scheduler, SchedulerOptions, WorkRequest,
};
use crate::status::{ListenerId, StatusFanout, StatusSink};
use crate::types::{AttemptId, ExecutionMode, WorkStatus};

pub struct WorkManager {
    registry: WorkRegistry,
    scheduler: Arc<dyn Scheduler>,
    bridge: Arc<DispatchBridge>,
    status: StatusFanout,
}

impl std::fmt::Debug for WorkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkManager")
            .field("registry", &self.registry)
            .field("bridge", &self.bridge)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl WorkManager {
    /// Assemble a manager from already wired parts.
    ///
    /// `bridge` must be the attempt worker `scheduler` invokes, otherwise
    /// completion signals never reach the waiting attempts.
    pub fn new(
        registry: WorkRegistry,
        scheduler: Arc<dyn Scheduler>,
        bridge: Arc<DispatchBridge>,
    ) -> Self {
        let status = StatusFanout::new(Arc::clone(&scheduler));
        Self {
            registry,
            scheduler,
            bridge,
            status,
        }
    }

    /// Wire a manager on top of an in-process [`LocalScheduler`].
    ///
    /// Returns the scheduler too so callers can feed it device conditions.
    pub fn local(
        executor: Arc<dyn ExecutorBackend>,
        presenter: NotificationAdapter,
        bridge_options: BridgeOptions,
        scheduler_options: SchedulerOptions,
        min_periodic_interval: std::time::Duration,
    ) -> (Self, LocalScheduler) {
        let bridge = Arc::new(DispatchBridge::new(executor, presenter, bridge_options));
        let local = LocalScheduler::new(bridge.clone(), scheduler_options);
        let scheduler: Arc<dyn Scheduler> = Arc::new(local.clone());
        let registry = WorkRegistry::with_min_interval(Arc::clone(&scheduler), min_periodic_interval);
        (Self::new(registry, scheduler, bridge), local)
    }

    pub fn registry(&self) -> &WorkRegistry {
        &self.registry
    }

    pub fn bridge(&self) -> &Arc<DispatchBridge> {
        &self.bridge
    }

    pub fn status(&self) -> &StatusFanout {
        &self.status
    }

    /// Register (or re-register) a worker.
    pub async fn register(&self, raw: RawWorkerDefinition) -> Result<Option<AttemptId>> {
        self.registry.register(raw).await
    }

    pub async fn register_definition(&self, definition: WorkerDefinition) -> Result<Option<AttemptId>> {
        self.registry.register_definition(definition).await
    }

    /// Enqueue work for a registered worker.
    ///
    /// One-time workers are unique per name: while an earlier attempt is
    /// still pending or running, its id is returned instead of a new one.
    pub async fn enqueue(&self, worker: &str, payload: impl Into<String>) -> Result<AttemptId> {
        let definition = self.registry.lookup(worker)?;
        let request = WorkRequest {
            input: definition.attempt_input(payload),
            constraints: definition.constraints(),
            kind: RequestKind::OneTime,
        };

        let id = match definition.mode {
            ExecutionMode::Queued => self.scheduler.enqueue(request).await?,
            ExecutionMode::OneTime => {
                self.scheduler
                    .enqueue_unique(&definition.name, ExistingWorkPolicy::Keep, request)
                    .await?
            }
            ExecutionMode::Periodic => {
                return Err(BridgeError::PeriodicWorker(definition.name.clone()));
            }
        };

        info!(worker = %definition.name, attempt.id = %id, "work enqueued");
        Ok(id)
    }

    /// Cancel an attempt and release it if it is waiting on the executor.
    pub async fn cancel(&self, id: AttemptId) -> Result<()> {
        if self.bridge.cancel(id) {
            debug!(attempt.id = %id, "released waiting attempt");
        }
        self.scheduler.cancel(id).await
    }

    pub async fn query_status(&self, id: AttemptId) -> Result<WorkStatus> {
        self.scheduler
            .status(id)
            .await
            .ok_or(BridgeError::NotFound(id))
    }

    pub async fn subscribe(&self, id: AttemptId, sink: StatusSink) -> Result<ListenerId> {
        self.status.subscribe(id, sink).await
    }

    pub fn unsubscribe(&self, id: AttemptId, listener: ListenerId) -> bool {
        self.status.unsubscribe(id, listener)
    }

    /// Report the executor's completion for an attempt.
    pub fn signal_completion(&self, id: AttemptId, result: &str, output: Option<String>) -> Delivery {
        self.bridge
            .signal_completion(CompletionSignal::new(id, result, output))
    }
}
