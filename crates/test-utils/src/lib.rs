pub mod builders;
pub mod fake_executor;
pub mod recording_presenter;
pub mod recording_scheduler;

use std::sync::{Arc, Once};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt};
use workbridge::bridge::BridgeOptions;
use workbridge::exec::Dispatch;
use workbridge::manager::WorkManager;
use workbridge::presentation::NotificationAdapter;
use workbridge::registry::MIN_PERIODIC_INTERVAL;
use workbridge::scheduler::{BackoffKind, BackoffPolicy, LocalScheduler, SchedulerOptions};

use crate::fake_executor::FakeExecutor;
use crate::recording_presenter::RecordingPresenter;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Poll `check` every 10ms until it returns `Some`, for at most 5 seconds.
pub async fn eventually<T, F, Fut>(mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    with_timeout(async {
        loop {
            if let Some(value) = check().await {
                return value;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}

/// Poll `check` every 10ms until it holds, for at most 5 seconds.
pub async fn wait_until<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    with_timeout(async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}

/// A work manager on a [`LocalScheduler`] with a [`FakeExecutor`].
pub struct Harness {
    pub manager: Arc<WorkManager>,
    pub scheduler: LocalScheduler,
    pub executor: Arc<FakeExecutor>,
    pub presenter: Arc<RecordingPresenter>,
    pub dispatches: mpsc::UnboundedReceiver<Dispatch>,
}

/// Backoff short enough for retries to happen within a test.
pub fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy {
        kind: BackoffKind::Linear,
        initial: Duration::from_millis(20),
        max: Duration::from_millis(100),
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(BridgeOptions::default())
    }

    pub fn with_options(options: BridgeOptions) -> Self {
        let (executor, dispatches) = FakeExecutor::attached();
        let executor = Arc::new(executor);
        let presenter = Arc::new(RecordingPresenter::new());
        let (manager, scheduler) = WorkManager::local(
            executor.clone(),
            NotificationAdapter::new(presenter.clone()),
            options,
            SchedulerOptions {
                backoff: fast_backoff(),
            },
            MIN_PERIODIC_INTERVAL,
        );

        Self {
            manager: Arc::new(manager),
            scheduler,
            executor,
            presenter,
            dispatches,
        }
    }

    /// Wait for the next dispatch sent to the executor.
    pub async fn next_dispatch(&mut self) -> Dispatch {
        with_timeout(self.dispatches.recv())
            .await
            .expect("dispatch channel closed")
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
