//! Tests for backoff, classification and the retry loop

use super::retry::*;
use crate::client::ClientError;
use crate::telemetry::RecordingLogger;
use proptest::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn no_jitter(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries, 500, 2.0)
        .unwrap()
        .with_jitter(false)
}

fn http(status: u16) -> ClientError {
    ClientError::Http {
        status,
        body: "error".to_string(),
    }
}

#[test]
fn test_default_policy() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_retries(), 2);
    assert_eq!(policy.max_attempts(), 3);
    assert_eq!(policy.base_ms(), 500);
    assert_eq!(policy.factor(), 2.0);
    assert!(policy.jitter());
    assert_eq!(policy.timeout(), Duration::from_millis(20_000));
}

#[test]
fn test_policy_validation() {
    assert!(RetryPolicy::new(11, 500, 2.0).is_err());
    assert!(RetryPolicy::new(2, 500, 0.5).is_err());
    assert!(RetryPolicy::new(2, 500, f64::NAN).is_err());
    assert!(RetryPolicy::new(0, 0, 1.0).is_ok());
}

#[test]
fn test_backoff_sequence() {
    let policy = no_jitter(5);
    assert_eq!(calculate_backoff(&policy, 0), 500);
    assert_eq!(calculate_backoff(&policy, 1), 1000);
    assert_eq!(calculate_backoff(&policy, 2), 2000);
    assert_eq!(calculate_backoff(&policy, 3), 4000);
}

#[test]
fn test_backoff_is_capped() {
    let policy = no_jitter(10);
    assert_eq!(calculate_backoff(&policy, 10), MAX_BACKOFF_MS);
    assert_eq!(calculate_backoff(&policy, u32::MAX), MAX_BACKOFF_MS);
}

#[test]
fn test_jitter_of_small_values_is_identity() {
    assert_eq!(apply_jitter(0), 0);
    assert_eq!(apply_jitter(4), 4);
}

proptest! {
    #[test]
    fn prop_jitter_stays_within_twenty_percent(ms in 0u64..1_000_000) {
        let jittered = apply_jitter(ms);
        let spread = ms / 5;
        prop_assert!(jittered >= ms - spread);
        prop_assert!(jittered <= ms + spread);
    }
}

#[test]
fn test_classification_by_code() {
    for status in [429, 500, 502, 503, 504] {
        assert!(is_retryable(&AttemptError::Client(http(status))), "{}", status);
    }
    assert!(is_retryable(&AttemptError::Timeout { timeout_ms: 10 }));
    assert!(is_retryable(&AttemptError::Client(ClientError::Timeout(
        "deadline".into()
    ))));
    assert!(is_retryable(&AttemptError::Client(ClientError::Connection(
        "reset".into()
    ))));
    assert!(!is_retryable(&AttemptError::Client(http(400))));
}

#[test]
fn test_classification_by_message() {
    let rate_limited = ClientError::Http {
        status: 400,
        body: "Rate limit reached for requests".to_string(),
    };
    assert!(is_retryable(&AttemptError::Client(rate_limited)));

    let temporary = ClientError::Other("Service Temporarily unavailable".to_string());
    assert!(is_retryable(&AttemptError::Client(temporary)));

    let plain = ClientError::Other("bad input".to_string());
    assert!(!is_retryable(&AttemptError::Client(plain)));
}

#[test]
fn test_fatal_errors_are_never_retried() {
    assert!(!is_retryable(&AttemptError::Client(
        ClientError::MissingCredentials
    )));
    let malformed = ClientError::MalformedResponse("timeout field missing".to_string());
    assert!(!is_retryable(&AttemptError::Client(malformed)));
}

#[tokio::test(start_paused = true)]
async fn test_retry_until_success() {
    let calls = AtomicU32::new(0);
    let logger = RecordingLogger::new();
    let policy = no_jitter(2);

    let result = retry_with_timeout(&policy, &logger, |attempt| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt < 2 {
                Err(http(429))
            } else {
                Ok("done")
            }
        }
    })
    .await
    .expect("third attempt succeeds");

    assert_eq!(result.value, "done");
    assert_eq!(result.attempts(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        result.outcomes,
        vec![
            AttemptOutcome::RetryableError,
            AttemptOutcome::RetryableError,
            AttemptOutcome::Success
        ]
    );

    let retries = logger.events("adviser_retry");
    assert_eq!(retries.len(), 2);
    assert_eq!(retries[0].field("backoff_ms"), Some("500"));
    assert_eq!(retries[1].field("backoff_ms"), Some("1000"));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_sleeps_elapse_in_order() {
    let logger = RecordingLogger::new();
    let policy = no_jitter(2);
    let start = tokio::time::Instant::now();

    let result: Result<Retried<()>, _> =
        retry_with_timeout(&policy, &logger, |_| async { Err(http(503)) }).await;

    let failure = result.expect_err("always fails");
    assert_eq!(failure.attempts(), 3);
    assert_eq!(start.elapsed(), Duration::from_millis(1500));
    assert_eq!(logger.count("adviser_attempts_failed"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_error_stops_immediately() {
    let calls = AtomicU32::new(0);
    let logger = RecordingLogger::new();

    let result: Result<Retried<()>, _> = retry_with_timeout(&no_jitter(2), &logger, |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(http(401)) }
    })
    .await;

    let failure = result.expect_err("non-retryable");
    assert_eq!(failure.attempts(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(failure.outcomes, vec![AttemptOutcome::FatalError]);
    assert_eq!(logger.count("adviser_retry"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_is_enforced() {
    let logger = RecordingLogger::new();
    let policy = no_jitter(0).with_timeout(Duration::from_millis(250));
    let start = tokio::time::Instant::now();

    let result: Result<Retried<()>, _> = retry_with_timeout(&policy, &logger, |_| async {
        std::future::pending::<Result<(), ClientError>>().await
    })
    .await;

    let failure = result.expect_err("never resolves");
    assert!(matches!(failure.error, AttemptError::Timeout { timeout_ms: 250 }));
    assert_eq!(failure.error.code(), "TIMEOUT");
    assert_eq!(failure.outcomes, vec![AttemptOutcome::Timeout]);
    assert_eq!(start.elapsed(), Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_are_retried() {
    let logger = RecordingLogger::new();
    let policy = no_jitter(1).with_timeout(Duration::from_millis(100));

    let result = retry_with_timeout(&policy, &logger, |attempt| async move {
        if attempt == 0 {
            std::future::pending::<Result<u32, ClientError>>().await
        } else {
            Ok(attempt)
        }
    })
    .await
    .expect("second attempt succeeds");

    assert_eq!(result.value, 1);
    assert_eq!(
        result.outcomes,
        vec![AttemptOutcome::Timeout, AttemptOutcome::Success]
    );
}
