// tests/dispatch_bridge.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use workbridge::bridge::{AttemptPhase, BridgeOptions, CompletionSignal, Delivery, DispatchBridge};
use workbridge::exec::{DispatchMode, HostState};
use workbridge::presentation::{NotificationAdapter, NotificationTemplate};
use workbridge::scheduler::{Attempt, AttemptInput, AttemptWorker, WorkResult};
use workbridge::types::{AttemptId, ForegroundBehaviour};
use workbridge_test_utils::fake_executor::FakeExecutor;
use workbridge_test_utils::recording_presenter::{PresenterEvent, RecordingPresenter};
use workbridge_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn bridge_with(state: HostState, options: BridgeOptions) -> (
    Arc<DispatchBridge>,
    Arc<FakeExecutor>,
    tokio::sync::mpsc::UnboundedReceiver<workbridge::exec::Dispatch>,
) {
    let (executor, dispatches) = FakeExecutor::new(state);
    let executor = Arc::new(executor);
    let bridge = Arc::new(DispatchBridge::new(
        executor.clone(),
        NotificationAdapter::default(),
        options,
    ));
    (bridge, executor, dispatches)
}

fn attempt(worker: Option<&str>, payload: Option<&str>) -> Attempt {
    Attempt {
        id: AttemptId::new(),
        input: AttemptInput {
            worker: worker.map(str::to_string),
            payload: payload.map(str::to_string),
            ..AttemptInput::default()
        },
        run_attempt_count: 0,
    }
}

#[tokio::test]
async fn success_signal_resolves_with_output() -> TestResult {
    init_tracing();
    let (bridge, _executor, mut dispatches) = bridge_with(HostState::Background, BridgeOptions::default());
    let attempt = attempt(Some("sync"), Some("{}"));
    let id = attempt.id;

    let run = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.do_work(attempt).await }
    });

    let dispatch = with_timeout(dispatches.recv()).await.expect("dispatch");
    assert_eq!(dispatch.attempt_id, id);
    assert_eq!(dispatch.worker, "sync");
    assert_eq!(dispatch.payload, "{}");
    assert_eq!(dispatch.mode, DispatchMode::Headless);
    assert!(bridge.is_waiting(id));

    let delivery = bridge.signal_completion(CompletionSignal::new(id, "success", Some("done".into())));
    assert_eq!(delivery, Delivery::Delivered);

    let result = with_timeout(run).await?;
    assert_eq!(result, WorkResult::Success(Some("done".into())));
    assert_eq!(bridge.in_flight(), 0);
    Ok(())
}

#[tokio::test]
async fn unrecognized_result_fails_the_attempt() -> TestResult {
    let (bridge, _executor, mut dispatches) = bridge_with(HostState::Background, BridgeOptions::default());
    let attempt = attempt(Some("sync"), Some(""));
    let id = attempt.id;

    let run = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.run_attempt(attempt).await }
    });
    with_timeout(dispatches.recv()).await.expect("dispatch");

    bridge.signal_completion(CompletionSignal::new(id, "done-ish", Some("partial".into())));

    assert_eq!(
        with_timeout(run).await?,
        WorkResult::Failure(Some("partial".into()))
    );
    Ok(())
}

#[tokio::test]
async fn retry_signal_maps_to_retry() -> TestResult {
    let (bridge, _executor, mut dispatches) = bridge_with(HostState::Background, BridgeOptions::default());
    let attempt = attempt(Some("sync"), Some(""));
    let id = attempt.id;

    let run = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.run_attempt(attempt).await }
    });
    with_timeout(dispatches.recv()).await.expect("dispatch");
    bridge.signal_completion(CompletionSignal::new(id, "retry", Some("ignored".into())));

    assert_eq!(with_timeout(run).await?, WorkResult::Retry);
    Ok(())
}

#[tokio::test]
async fn missing_worker_or_payload_is_a_permanent_failure() {
    let (bridge, _executor, mut dispatches) = bridge_with(HostState::Background, BridgeOptions::default());

    let no_worker = bridge.run_attempt(attempt(None, Some("x"))).await;
    let no_payload = bridge.run_attempt(attempt(Some("sync"), None)).await;

    assert_eq!(no_worker, WorkResult::Failure(None));
    assert_eq!(no_payload, WorkResult::Failure(None));
    assert!(dispatches.try_recv().is_err());
    assert_eq!(bridge.in_flight(), 0);
}

#[tokio::test]
async fn detached_executor_retries_without_dispatching() {
    let (bridge, _executor, mut dispatches) = bridge_with(HostState::Detached, BridgeOptions::default());

    let result = bridge.run_attempt(attempt(Some("sync"), Some(""))).await;

    assert_eq!(result, WorkResult::Retry);
    assert!(dispatches.try_recv().is_err());
}

#[tokio::test]
async fn rejected_dispatch_is_retried_and_leaves_no_record() {
    let (bridge, executor, _dispatches) = bridge_with(HostState::Background, BridgeOptions::default());
    executor.reject_dispatches(true);

    let result = bridge.run_attempt(attempt(Some("sync"), Some(""))).await;

    assert_eq!(result, WorkResult::Retry);
    assert_eq!(bridge.in_flight(), 0);
}

#[tokio::test]
async fn blocking_worker_is_not_run_while_in_foreground() {
    let (bridge, _executor, mut dispatches) = bridge_with(HostState::Foreground, BridgeOptions::default());
    let mut blocking = attempt(Some("sync"), Some(""));
    blocking.input.foreground_behaviour = ForegroundBehaviour::Blocking;

    assert_eq!(bridge.run_attempt(blocking).await, WorkResult::Retry);
    assert!(dispatches.try_recv().is_err());
}

#[tokio::test]
async fn foreground_dispatch_modes_follow_the_worker_behaviour() -> TestResult {
    let (bridge, _executor, mut dispatches) = bridge_with(HostState::Foreground, BridgeOptions::default());

    for (behaviour, expected) in [
        (ForegroundBehaviour::Foreground, DispatchMode::Inline),
        (ForegroundBehaviour::HeadlessTask, DispatchMode::Headless),
    ] {
        let mut attempt = attempt(Some("sync"), Some(""));
        attempt.input.foreground_behaviour = behaviour;
        let id = attempt.id;

        let run = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.run_attempt(attempt).await }
        });

        let dispatch = with_timeout(dispatches.recv()).await.expect("dispatch");
        assert_eq!(dispatch.mode, expected);

        bridge.signal_completion(CompletionSignal::new(id, "success", None));
        assert_eq!(with_timeout(run).await?, WorkResult::Success(None));
    }
    Ok(())
}

#[tokio::test]
async fn missing_signal_times_out_as_retry() -> TestResult {
    let options = BridgeOptions {
        default_timeout: Some(Duration::from_millis(30)),
    };
    let (bridge, _executor, mut dispatches) = bridge_with(HostState::Background, options);
    let attempt = attempt(Some("sync"), Some(""));
    let id = attempt.id;

    let result = with_timeout(bridge.run_attempt(attempt)).await;
    assert_eq!(result, WorkResult::Retry);
    assert!(dispatches.try_recv().is_ok());

    // The late signal finds nothing to wake.
    assert_ne!(
        bridge.signal_completion(CompletionSignal::new(id, "success", None)),
        Delivery::Delivered
    );
    Ok(())
}

#[tokio::test]
async fn worker_timeout_overrides_the_default() -> TestResult {
    let (bridge, _executor, _dispatches) = bridge_with(HostState::Background, BridgeOptions {
        default_timeout: None,
    });
    let mut attempt = attempt(Some("sync"), Some(""));
    attempt.input.timeout = Some(Duration::from_millis(30));

    assert_eq!(with_timeout(bridge.run_attempt(attempt)).await, WorkResult::Retry);
    Ok(())
}

#[tokio::test]
async fn cancel_releases_the_waiting_attempt() -> TestResult {
    let (bridge, _executor, mut dispatches) = bridge_with(HostState::Background, BridgeOptions {
        default_timeout: None,
    });
    let attempt = attempt(Some("sync"), Some(""));
    let id = attempt.id;

    let run = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.run_attempt(attempt).await }
    });
    with_timeout(dispatches.recv()).await.expect("dispatch");

    assert!(bridge.cancel(id));
    assert_eq!(with_timeout(run).await?, WorkResult::Cancelled);
    assert!(!bridge.is_waiting(id));
    Ok(())
}

fn presented_bridge() -> (
    Arc<DispatchBridge>,
    Arc<RecordingPresenter>,
    tokio::sync::mpsc::UnboundedReceiver<workbridge::exec::Dispatch>,
) {
    let presenter = Arc::new(RecordingPresenter::new());
    let (executor, dispatches) = FakeExecutor::new(HostState::Background);
    let bridge = Arc::new(DispatchBridge::new(
        Arc::new(executor),
        NotificationAdapter::new(presenter.clone()),
        BridgeOptions::default(),
    ));
    (bridge, presenter, dispatches)
}

fn templated(worker: &str) -> Attempt {
    let mut with_template = attempt(Some(worker), Some(""));
    with_template.input.notification = Some(NotificationTemplate {
        title: "Syncing".to_string(),
        ..Default::default()
    });
    with_template
}

#[tokio::test]
async fn headless_attempts_with_a_template_are_presented() -> TestResult {
    let (bridge, presenter, mut dispatches) = presented_bridge();
    let shown = templated("sync");
    let id = shown.id;

    let run = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.run_attempt(shown).await }
    });
    with_timeout(dispatches.recv()).await.expect("dispatch");
    bridge.signal_completion(CompletionSignal::new(id, "success", None));
    with_timeout(run).await?;

    assert_eq!(
        presenter.events(),
        vec![
            PresenterEvent::Presented {
                attempt_id: id,
                title: "Syncing".to_string(),
            },
            PresenterEvent::Dismissed(id),
        ]
    );

    // Without a template nothing is shown.
    let plain = attempt(Some("sync"), Some(""));
    let plain_id = plain.id;
    let run = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.run_attempt(plain).await }
    });
    with_timeout(dispatches.recv()).await.expect("dispatch");
    bridge.signal_completion(CompletionSignal::new(plain_id, "success", None));
    with_timeout(run).await?;
    assert_eq!(presenter.events().len(), 2);
    Ok(())
}

#[tokio::test]
async fn dropping_a_waiting_attempt_clears_its_notification() -> TestResult {
    let (bridge, presenter, mut dispatches) = presented_bridge();
    let waiting = templated("sync");
    let id = waiting.id;

    // The scheduler drops the attempt future on cancel; aborting the task
    // does the same.
    let run = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.run_attempt(waiting).await }
    });
    with_timeout(dispatches.recv()).await.expect("dispatch");
    assert_eq!(presenter.presented(), 1);

    run.abort();
    assert!(with_timeout(run).await.is_err_and(|e| e.is_cancelled()));

    assert!(presenter.was_dismissed(id));
    assert!(presenter.still_shown().is_empty());
    assert_eq!(bridge.in_flight(), 0);
    Ok(())
}

#[tokio::test]
async fn executor_unavailable_and_terminal_phases_are_named() {
    assert_eq!(AttemptPhase::ExecutorUnavailable.to_string(), "executor_unavailable");
    assert_eq!(AttemptPhase::Terminal.to_string(), "terminal");
    assert_eq!(AttemptPhase::of(&WorkResult::Retry), AttemptPhase::ResolvedRetry);
    assert_eq!(AttemptPhase::of(&WorkResult::Cancelled), AttemptPhase::Cancelled);
}
