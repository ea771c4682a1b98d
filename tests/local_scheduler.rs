// tests/local_scheduler.rs

use std::error::Error;
use std::sync::Arc;

use workbridge::constraints::Constraints;
use workbridge::scheduler::{
    Attempt, AttemptInput, AttemptWorker, BoxFuture, ExistingWorkPolicy, LocalScheduler, RequestKind,
    Scheduler, SchedulerOptions, WorkRequest, WorkResult,
};
use workbridge::types::{AttemptId, WorkState};
use workbridge_test_utils::{eventually, init_tracing, wait_until};

type TestResult = Result<(), Box<dyn Error>>;

struct Succeeds;

impl AttemptWorker for Succeeds {
    fn do_work(&self, _attempt: Attempt) -> BoxFuture<'_, WorkResult> {
        Box::pin(async { WorkResult::Success(Some("ok".to_string())) })
    }
}

struct NeverFinishes;

impl AttemptWorker for NeverFinishes {
    fn do_work(&self, _attempt: Attempt) -> BoxFuture<'_, WorkResult> {
        Box::pin(std::future::pending())
    }
}

fn one_time() -> WorkRequest {
    WorkRequest {
        input: AttemptInput {
            worker: Some("sync".to_string()),
            ..AttemptInput::default()
        },
        constraints: Constraints::none(),
        kind: RequestKind::OneTime,
    }
}

async fn finished(scheduler: &LocalScheduler, id: AttemptId) -> WorkState {
    eventually(|| async move {
        scheduler
            .status(id)
            .await
            .map(|status| status.state)
            .filter(|state| state.is_finished())
    })
    .await
}

#[tokio::test]
async fn finished_attempts_beyond_the_history_are_forgotten() -> TestResult {
    init_tracing();
    let scheduler = LocalScheduler::with_history(Arc::new(Succeeds), SchedulerOptions::default(), 4);

    let mut ids = Vec::new();
    for _ in 0..6 {
        let id = scheduler.enqueue(one_time()).await?;
        finished(&scheduler, id).await;
        ids.push(id);
    }

    wait_until(|| scheduler.attempt_ids().len() == 4).await;
    assert_eq!(scheduler.status(ids[0]).await, None);
    assert_eq!(scheduler.status(ids[1]).await, None);
    assert!(scheduler.watch(ids[0]).await.is_none());

    let newest = scheduler.status(ids[5]).await.expect("kept in history");
    assert_eq!(newest.state, WorkState::Succeeded);
    assert_eq!(newest.output.as_deref(), Some("ok"));
    Ok(())
}

#[tokio::test]
async fn replaced_unique_work_counts_towards_the_history() -> TestResult {
    let scheduler = LocalScheduler::with_history(Arc::new(NeverFinishes), SchedulerOptions::default(), 1);

    let first = scheduler
        .enqueue_unique("sync", ExistingWorkPolicy::Replace, one_time())
        .await?;
    let second = scheduler
        .enqueue_unique("sync", ExistingWorkPolicy::Replace, one_time())
        .await?;
    let third = scheduler
        .enqueue_unique("sync", ExistingWorkPolicy::Replace, one_time())
        .await?;

    assert_eq!(scheduler.status(first).await, None);
    assert_eq!(finished(&scheduler, second).await, WorkState::Cancelled);
    assert_eq!(scheduler.unique_attempt("sync"), Some(third));

    let mut live = scheduler.attempt_ids();
    live.sort();
    let mut expected = vec![second, third];
    expected.sort();
    assert_eq!(live, expected);
    Ok(())
}

#[tokio::test]
async fn expired_unique_names_are_released() -> TestResult {
    let scheduler = LocalScheduler::with_history(Arc::new(Succeeds), SchedulerOptions::default(), 1);

    let once = scheduler
        .enqueue_unique("once", ExistingWorkPolicy::Keep, one_time())
        .await?;
    finished(&scheduler, once).await;
    assert_eq!(scheduler.unique_attempt("once"), Some(once));

    let other = scheduler.enqueue(one_time()).await?;
    finished(&scheduler, other).await;

    wait_until(|| scheduler.unique_attempt("once").is_none()).await;
    assert_eq!(scheduler.status(once).await, None);
    Ok(())
}

#[tokio::test]
async fn cancelling_twice_retires_the_attempt_once() -> TestResult {
    let scheduler = LocalScheduler::with_history(Arc::new(NeverFinishes), SchedulerOptions::default(), 2);

    let kept = scheduler.enqueue(one_time()).await?;
    let cancelled = scheduler.enqueue(one_time()).await?;
    scheduler.cancel(kept).await?;
    scheduler.cancel(cancelled).await?;
    scheduler.cancel(cancelled).await?;
    scheduler.cancel(AttemptId::new()).await?;

    assert_eq!(finished(&scheduler, kept).await, WorkState::Cancelled);
    assert_eq!(finished(&scheduler, cancelled).await, WorkState::Cancelled);
    assert_eq!(scheduler.attempt_ids().len(), 2);
    Ok(())
}
