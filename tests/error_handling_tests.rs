//! # Error Handling Unit Tests
//!
//! Unit tests for error classification and retry scheduling.
//!
//! These tests verify:
//! - Exponential backoff doubling from the base up to the cap
//! - Requeue actions derived from reconciler errors and outcomes
//! - Transient vs permanent target failures
//! - Watch stream error classification

use declaration_controller::controller::backoff::ExponentialBackoff;
use declaration_controller::controller::reconciler::{Outcome, ReconcilerError};
use declaration_controller::provider::ProviderError;
use declaration_controller::runtime::error_policy::{classify_watch_error, WatchErrorKind};
use declaration_controller::store::StoreError;
use kube_runtime::controller::Action;
use std::time::Duration;

#[test]
fn test_backoff_doubles_from_base() {
    let backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(6 * 3600));
    let test_cases = vec![
        (1, 1),
        (2, 2),
        (3, 4),
        (4, 8),
        (5, 16),
        (10, 512),
        (15, 16384),
    ];

    for (failures, expected_seconds) in test_cases {
        let delay = backoff.delay_for(failures);
        assert_eq!(
            delay.as_secs(),
            expected_seconds,
            "Delay after {} failures should be {} seconds, got {}",
            failures,
            expected_seconds,
            delay.as_secs()
        );
    }
}

#[test]
fn test_backoff_capped_at_ceiling() {
    let cap = Duration::from_secs(6 * 3600);
    let backoff = ExponentialBackoff::new(Duration::from_secs(1), cap);

    for failures in [16, 20, 32, 100, u32::MAX] {
        assert_eq!(
            backoff.delay_for(failures),
            cap,
            "Delay after {failures} failures should be capped"
        );
    }
}

#[test]
fn test_stateful_backoff_resets() {
    let mut backoff = ExponentialBackoff::new(Duration::from_secs(2), Duration::from_secs(60));
    assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
    assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
    backoff.reset();
    assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
}

#[test]
fn test_reconciler_error_requeue_actions() {
    let fallback = Duration::from_secs(1);

    let transient = ReconcilerError::Transient {
        message: "503 Service Unavailable".to_string(),
        retry_after: Duration::from_secs(8),
    };
    assert_eq!(
        transient.requeue_action(fallback),
        Action::requeue(Duration::from_secs(8))
    );
    assert_eq!(transient.kind(), "transient");

    let permanent = ReconcilerError::Permanent("value must be numeric".to_string());
    assert_eq!(permanent.requeue_action(fallback), Action::await_change());
    assert_eq!(permanent.kind(), "permanent");

    let store = ReconcilerError::Store(StoreError::Backend("connection refused".to_string()));
    assert_eq!(store.requeue_action(fallback), Action::requeue(fallback));
    assert_eq!(store.kind(), "store");
}

#[test]
fn test_outcome_actions() {
    assert_eq!(Outcome::Done.into_action(), Action::await_change());
    assert_eq!(Outcome::RequeueNow.into_action(), Action::requeue(Duration::ZERO));
    assert_eq!(
        Outcome::RequeueAfter(Duration::from_secs(600)).into_action(),
        Action::requeue(Duration::from_secs(600))
    );
}

#[test]
fn test_provider_error_classification() {
    let transient = ProviderError::Transient("connection reset".to_string());
    assert!(!transient.is_permanent());
    assert_eq!(transient.message(), "connection reset");

    let permanent = ProviderError::Permanent("scope is read-only".to_string());
    assert!(permanent.is_permanent());
    assert_eq!(permanent.to_string(), "scope is read-only");
}

#[test]
fn test_watch_error_classification() {
    let test_cases = vec![
        ("Api(ErrorResponse { code: 401 })", WatchErrorKind::Unauthorized),
        ("Unauthorized", WatchErrorKind::Unauthorized),
        ("too old resource version: 1 (2)", WatchErrorKind::Expired),
        ("410 Gone", WatchErrorKind::Expired),
        ("429 TooManyRequests", WatchErrorKind::Throttled),
        ("ObjectNotFound", WatchErrorKind::NotFound),
        ("broken pipe", WatchErrorKind::Other),
    ];

    for (error, expected) in test_cases {
        assert_eq!(
            classify_watch_error(error),
            expected,
            "Watch error '{}' misclassified",
            error
        );
    }
}

#[test]
fn test_not_found_wins_over_unauthorized() {
    // A 404 body can mention 401 in passing; it is still a missing resource
    assert_eq!(
        classify_watch_error("ObjectNotFound: 401 retries exhausted"),
        WatchErrorKind::NotFound
    );
}
