// tests/manager_round_trip.rs

use std::error::Error;
use std::time::Duration;

use workbridge::bridge::{BridgeOptions, Delivery};
use workbridge::errors::BridgeError;
use workbridge::exec::HostState;
use workbridge::types::{AttemptId, WorkState, WorkStatus};
use workbridge_test_utils::builders::WorkerDefinitionBuilder;
use workbridge_test_utils::{Harness, eventually, init_tracing, wait_until};

type TestResult = Result<(), Box<dyn Error>>;

/// Wait until the attempt reaches `state`.
async fn wait_for_state(harness: &Harness, id: AttemptId, state: WorkState) -> WorkStatus {
    let manager = harness.manager.clone();
    eventually(move || {
        let manager = manager.clone();
        async move {
            manager
                .query_status(id)
                .await
                .ok()
                .filter(|status| status.state == state)
        }
    })
    .await
}

#[tokio::test]
async fn register_enqueue_signal_query_round_trip() -> TestResult {
    init_tracing();
    let mut harness = Harness::new();
    harness
        .manager
        .register(WorkerDefinitionBuilder::queued("sync").build())
        .await?;

    let id = harness.manager.enqueue("sync", "{\"page\":1}").await?;

    let dispatch = harness.next_dispatch().await;
    assert_eq!(dispatch.attempt_id, id);
    assert_eq!(dispatch.worker, "sync");
    assert_eq!(dispatch.payload, "{\"page\":1}");
    assert_eq!(dispatch.run_attempt_count, 0);
    assert_eq!(harness.manager.query_status(id).await?.state, WorkState::Running);

    let delivery = harness
        .manager
        .signal_completion(id, "success", Some("done".to_string()));
    assert_eq!(delivery, Delivery::Delivered);

    let status = wait_for_state(&harness, id, WorkState::Succeeded).await;
    assert_eq!(status.output.as_deref(), Some("done"));
    assert_eq!(harness.manager.bridge().in_flight(), 0);
    Ok(())
}

#[tokio::test]
async fn failure_signal_marks_the_attempt_failed() -> TestResult {
    let mut harness = Harness::new();
    harness
        .manager
        .register(WorkerDefinitionBuilder::queued("sync").build())
        .await?;

    let id = harness.manager.enqueue("sync", "").await?;
    harness.next_dispatch().await;
    harness
        .manager
        .signal_completion(id, "failure", Some("boom".to_string()));

    let status = wait_for_state(&harness, id, WorkState::Failed).await;
    assert_eq!(status.output.as_deref(), Some("boom"));
    Ok(())
}

#[tokio::test]
async fn queued_workers_get_a_fresh_id_per_enqueue() -> TestResult {
    let harness = Harness::new();
    harness
        .manager
        .register(WorkerDefinitionBuilder::queued("upload").build())
        .await?;

    let a = harness.manager.enqueue("upload", "a").await?;
    let b = harness.manager.enqueue("upload", "b").await?;

    assert_ne!(a, b);
    Ok(())
}

#[tokio::test]
async fn one_time_worker_keeps_pending_work() -> TestResult {
    let mut harness = Harness::new();
    harness
        .manager
        .register(WorkerDefinitionBuilder::one_time("refresh").build())
        .await?;

    let first = harness.manager.enqueue("refresh", "a").await?;
    let again = harness.manager.enqueue("refresh", "b").await?;
    assert_eq!(first, again);

    harness.next_dispatch().await;
    harness.manager.signal_completion(first, "success", None);
    wait_for_state(&harness, first, WorkState::Succeeded).await;

    let after = harness.manager.enqueue("refresh", "c").await?;
    assert_ne!(after, first);
    Ok(())
}

#[tokio::test]
async fn enqueue_errors_for_unknown_and_periodic_workers() -> TestResult {
    let harness = Harness::new();
    harness
        .manager
        .register(WorkerDefinitionBuilder::periodic("tick").build())
        .await?;

    match harness.manager.enqueue("ghost", "").await {
        Err(BridgeError::NotRegistered(name)) => assert_eq!(name, "ghost"),
        other => panic!("expected NotRegistered, got {other:?}"),
    }
    match harness.manager.enqueue("tick", "").await {
        Err(BridgeError::PeriodicWorker(name)) => assert_eq!(name, "tick"),
        other => panic!("expected PeriodicWorker, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn query_of_unknown_attempt_is_not_found() {
    let harness = Harness::new();
    let id = AttemptId::new();

    match harness.manager.query_status(id).await {
        Err(BridgeError::NotFound(missing)) => assert_eq!(missing, id),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn cancel_releases_a_waiting_attempt() -> TestResult {
    let mut harness = Harness::with_options(BridgeOptions {
        default_timeout: None,
    });
    harness
        .manager
        .register(WorkerDefinitionBuilder::queued("sync").build())
        .await?;

    let id = harness.manager.enqueue("sync", "").await?;
    harness.next_dispatch().await;
    assert!(harness.manager.bridge().is_waiting(id));

    harness.manager.cancel(id).await?;

    wait_for_state(&harness, id, WorkState::Cancelled).await;
    wait_until(|| harness.manager.bridge().in_flight() == 0).await;

    // The executor finishing afterwards changes nothing.
    harness.manager.signal_completion(id, "success", Some("late".to_string()));
    let status = harness.manager.query_status(id).await?;
    assert_eq!(status.state, WorkState::Cancelled);
    assert_eq!(status.output, None);
    Ok(())
}

#[tokio::test]
async fn retry_signal_redispatches_the_same_attempt() -> TestResult {
    let mut harness = Harness::new();
    harness
        .manager
        .register(WorkerDefinitionBuilder::queued("sync").build())
        .await?;

    let id = harness.manager.enqueue("sync", "").await?;
    let first = harness.next_dispatch().await;
    harness.manager.signal_completion(id, "retry", None);

    let second = harness.next_dispatch().await;
    assert_eq!(second.attempt_id, first.attempt_id);
    assert_eq!(second.run_attempt_count, 1);

    harness.manager.signal_completion(id, "success", None);
    let status = wait_for_state(&harness, id, WorkState::Succeeded).await;
    assert_eq!(status.attempt_count, 1);
    Ok(())
}

#[tokio::test]
async fn timeout_is_retried() -> TestResult {
    let mut harness = Harness::with_options(BridgeOptions {
        default_timeout: Some(Duration::from_millis(30)),
    });
    harness
        .manager
        .register(WorkerDefinitionBuilder::queued("slow").build())
        .await?;

    let id = harness.manager.enqueue("slow", "").await?;
    harness.next_dispatch().await;

    // No signal: the wait times out and the scheduler runs it again.
    let again = harness.next_dispatch().await;
    assert_eq!(again.attempt_id, id);
    assert!(again.run_attempt_count >= 1);
    Ok(())
}

#[tokio::test]
async fn detached_executor_never_fails_work() -> TestResult {
    let mut harness = Harness::new();
    harness.executor.set_state(HostState::Detached);
    harness
        .manager
        .register(WorkerDefinitionBuilder::queued("sync").build())
        .await?;

    let id = harness.manager.enqueue("sync", "").await?;

    let manager = harness.manager.clone();
    eventually(move || {
        let manager = manager.clone();
        async move {
            manager
                .query_status(id)
                .await
                .ok()
                .filter(|status| status.attempt_count >= 2)
        }
    })
    .await;
    let status = harness.manager.query_status(id).await?;
    assert!(!status.state.is_finished());
    assert!(harness.dispatches.try_recv().is_err());

    harness.executor.set_state(HostState::Background);
    let dispatch = harness.next_dispatch().await;
    assert_eq!(dispatch.attempt_id, id);

    harness.manager.signal_completion(id, "success", None);
    wait_for_state(&harness, id, WorkState::Succeeded).await;
    Ok(())
}

#[tokio::test]
async fn re_registering_a_periodic_worker_keeps_one_series() -> TestResult {
    let mut harness = Harness::new();

    let first = harness
        .manager
        .register(WorkerDefinitionBuilder::periodic("tick").build())
        .await?
        .expect("periodic series id");
    let dispatch = harness.next_dispatch().await;
    assert_eq!(dispatch.attempt_id, first);
    assert_eq!(dispatch.payload, "");

    let second = harness
        .manager
        .register(WorkerDefinitionBuilder::periodic("tick").build())
        .await?
        .expect("periodic series id");
    assert_ne!(first, second);

    wait_for_state(&harness, first, WorkState::Cancelled).await;
    assert_eq!(harness.scheduler.unique_attempt("tick"), Some(second));

    let dispatch = harness.next_dispatch().await;
    assert_eq!(dispatch.attempt_id, second);

    // A periodic run goes back to enqueued after it completes.
    harness.manager.signal_completion(second, "success", None);
    wait_for_state(&harness, second, WorkState::Enqueued).await;
    Ok(())
}

#[tokio::test]
async fn subscribers_see_the_full_lifecycle() -> TestResult {
    let mut harness = Harness::new();
    harness
        .manager
        .register(WorkerDefinitionBuilder::queued("sync").build())
        .await?;

    let id = harness.manager.enqueue("sync", "").await?;
    harness.next_dispatch().await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let listener = harness.manager.subscribe(id, tx).await?;
    assert_eq!(rx.try_recv()?.status.state, WorkState::Running);

    harness.manager.signal_completion(id, "success", Some("ok".to_string()));

    let update = workbridge_test_utils::with_timeout(rx.recv())
        .await
        .expect("terminal update");
    assert_eq!(update.status.state, WorkState::Succeeded);
    assert_eq!(update.status.output.as_deref(), Some("ok"));

    assert!(harness.manager.unsubscribe(id, listener));
    assert_eq!(harness.manager.status().observer_count(), 0);
    Ok(())
}

#[tokio::test]
async fn subscribing_after_success_replays_the_terminal_status() -> TestResult {
    let mut harness = Harness::new();
    harness
        .manager
        .register(WorkerDefinitionBuilder::queued("sync").build())
        .await?;

    let id = harness.manager.enqueue("sync", "payload1").await?;
    harness.next_dispatch().await;
    harness
        .manager
        .signal_completion(id, "success", Some("done".to_string()));
    wait_for_state(&harness, id, WorkState::Succeeded).await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    harness.manager.subscribe(id, tx).await?;

    // No further transition is coming; the replay is all there is.
    let update = rx.try_recv()?;
    assert_eq!(update.attempt_id, id);
    assert_eq!(update.status.state, WorkState::Succeeded);
    assert_eq!(update.status.output.as_deref(), Some("done"));
    Ok(())
}

#[tokio::test]
async fn cancelled_and_replaced_attempts_clear_their_notifications() -> TestResult {
    let mut harness = Harness::new();
    harness
        .manager
        .register(
            WorkerDefinitionBuilder::queued("upload")
                .notification("Uploading", "")
                .build(),
        )
        .await?;

    for _ in 0..20 {
        let id = harness.manager.enqueue("upload", "").await?;
        harness.next_dispatch().await;
        harness.manager.cancel(id).await?;
        wait_until(|| harness.presenter.was_dismissed(id)).await;
    }

    // Replacing a periodic series only goes through the scheduler.
    let tick = || {
        WorkerDefinitionBuilder::periodic("tick")
            .notification("Ticking", "")
            .build()
    };
    let first = harness.manager.register(tick()).await?.expect("series id");
    harness.next_dispatch().await;
    let second = harness.manager.register(tick()).await?.expect("series id");
    harness.next_dispatch().await;
    wait_until(|| harness.presenter.was_dismissed(first)).await;

    assert_eq!(harness.presenter.still_shown(), vec![second]);
    assert_eq!(harness.presenter.presented(), 22);
    Ok(())
}
