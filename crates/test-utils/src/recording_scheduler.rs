use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::watch;
use workbridge::errors::Result;
use workbridge::scheduler::{BoxFuture, ExistingWorkPolicy, Scheduler, WorkRequest};
use workbridge::types::{AttemptId, WorkStatus};

/// One call made against the [`RecordingScheduler`].
#[derive(Debug, Clone)]
pub enum SchedulerCall {
    Enqueue {
        id: AttemptId,
        request: WorkRequest,
    },
    EnqueueUnique {
        id: AttemptId,
        name: String,
        policy: ExistingWorkPolicy,
        request: WorkRequest,
    },
    Cancel(AttemptId),
}

/// A scheduler that never runs anything.
///
/// It records every call and keeps a status stream per attempt id that the
/// test drives by hand with [`set_status`](Self::set_status).
#[derive(Default)]
pub struct RecordingScheduler {
    calls: Mutex<Vec<SchedulerCall>>,
    statuses: Mutex<HashMap<AttemptId, watch::Sender<WorkStatus>>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SchedulerCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Names and policies of every `enqueue_unique` call, in order.
    pub fn unique_calls(&self) -> Vec<(String, ExistingWorkPolicy)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SchedulerCall::EnqueueUnique { name, policy, .. } => Some((name, policy)),
                _ => None,
            })
            .collect()
    }

    /// Make `id` known with the given status, or push a new status for it.
    pub fn set_status(&self, id: AttemptId, status: WorkStatus) {
        let mut statuses = self.statuses.lock().unwrap();
        match statuses.get(&id) {
            Some(tx) => {
                tx.send_replace(status);
            }
            None => {
                let (tx, _) = watch::channel(status);
                statuses.insert(id, tx);
            }
        }
    }

    /// Number of live receivers on the status stream of `id`.
    pub fn watchers(&self, id: AttemptId) -> usize {
        self.statuses
            .lock()
            .unwrap()
            .get(&id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    fn record(&self, call: SchedulerCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Scheduler for RecordingScheduler {
    fn enqueue(&self, request: WorkRequest) -> BoxFuture<'_, Result<AttemptId>> {
        Box::pin(async move {
            let id = AttemptId::new();
            self.set_status(id, WorkStatus::enqueued());
            self.record(SchedulerCall::Enqueue { id, request });
            Ok(id)
        })
    }

    fn enqueue_unique(
        &self,
        name: &str,
        policy: ExistingWorkPolicy,
        request: WorkRequest,
    ) -> BoxFuture<'_, Result<AttemptId>> {
        let name = name.to_string();
        Box::pin(async move {
            let id = AttemptId::new();
            self.set_status(id, WorkStatus::enqueued());
            self.record(SchedulerCall::EnqueueUnique {
                id,
                name,
                policy,
                request,
            });
            Ok(id)
        })
    }

    fn cancel(&self, id: AttemptId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.record(SchedulerCall::Cancel(id));
            Ok(())
        })
    }

    fn status(&self, id: AttemptId) -> BoxFuture<'_, Option<WorkStatus>> {
        Box::pin(async move {
            self.statuses
                .lock()
                .unwrap()
                .get(&id)
                .map(|tx| tx.borrow().clone())
        })
    }

    fn watch(&self, id: AttemptId) -> BoxFuture<'_, Option<watch::Receiver<WorkStatus>>> {
        Box::pin(async move {
            self.statuses
                .lock()
                .unwrap()
                .get(&id)
                .map(|tx| tx.subscribe())
        })
    }
}
