// tests/signal_property.rs

use std::time::Duration;

use proptest::prelude::*;
use workbridge::bridge::SignalResult;
use workbridge::errors::AttemptFault;
use workbridge::scheduler::{BackoffKind, BackoffPolicy, WorkResult};

fn known(raw: &str) -> bool {
    matches!(raw, "success" | "retry" | "failure")
}

#[test]
fn known_result_strings_are_classified() {
    assert_eq!(SignalResult::parse("success"), SignalResult::Success);
    assert_eq!(SignalResult::parse("retry"), SignalResult::Retry);
    assert_eq!(SignalResult::parse("failure"), SignalResult::Failure);
    // Matching is exact.
    assert_eq!(
        SignalResult::parse("Success"),
        SignalResult::Unrecognized("Success".to_string())
    );
}

#[test]
fn transient_faults_retry_and_structural_faults_fail() {
    let output = Some("partial".to_string());

    assert_eq!(
        AttemptFault::ExecutorUnavailable("detached".into()).into_result(output.clone()),
        WorkResult::Retry
    );
    assert_eq!(
        AttemptFault::Timeout(Duration::from_secs(1)).into_result(output.clone()),
        WorkResult::Retry
    );
    assert_eq!(
        AttemptFault::MalformedAttempt("worker").into_result(None),
        WorkResult::Failure(None)
    );
    assert_eq!(
        AttemptFault::UnrecognizedSignal("maybe".into()).into_result(output.clone()),
        WorkResult::Failure(output)
    );
}

proptest! {
    #[test]
    fn unknown_strings_are_unrecognized_and_fail(raw in ".{0,24}", output in proptest::option::of("[a-z]{0,8}")) {
        prop_assume!(!known(&raw));

        let parsed = SignalResult::parse(&raw);
        prop_assert_eq!(&parsed, &SignalResult::Unrecognized(raw.clone()));

        let fault = AttemptFault::UnrecognizedSignal(raw);
        prop_assert!(!fault.is_transient());
        prop_assert_eq!(fault.into_result(output.clone()), WorkResult::Failure(output));
    }

    #[test]
    fn backoff_is_monotone_and_capped(
        linear in any::<bool>(),
        initial_ms in 1u64..10_000,
        extra_ms in 0u64..1_000_000,
        retry in 1u32..64,
    ) {
        let policy = BackoffPolicy {
            kind: if linear { BackoffKind::Linear } else { BackoffKind::Exponential },
            initial: Duration::from_millis(initial_ms),
            max: Duration::from_millis(initial_ms + extra_ms),
        };

        let current = policy.delay(retry);
        let next = policy.delay(retry + 1);

        prop_assert!(current >= policy.initial);
        prop_assert!(current <= policy.max);
        prop_assert!(next >= current);
    }
}
