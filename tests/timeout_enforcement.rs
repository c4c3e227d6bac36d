//! Integration tests for per-attempt timeout enforcement

mod common;

use common::{ScriptedClient, ScriptedFactory, Step, options, remote_request};
use std::sync::Arc;
use std::time::Duration;
use tarot_adviser::adviser::AdviserService;
use tarot_adviser::adviser::retry::AttemptOutcome;
use tarot_adviser::metrics::Metrics;
use tarot_adviser::result::{Backend, ReasonTag};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_hanging_backend_times_out_and_falls_back() {
    let client = ScriptedClient::new(vec![Step::Hang, Step::Hang, Step::Hang]);
    let metrics = Arc::new(Metrics::new().unwrap());
    let adviser = AdviserService::new(options(2, 1_000))
        .with_client_factory(ScriptedFactory::new(client.clone()))
        .with_metrics(metrics.clone());

    let start = Instant::now();
    let result = adviser.generate(remote_request("q")).await;

    assert_eq!(client.calls(), 3);
    // three 1s timeouts plus 500ms and 1000ms of backoff
    assert_eq!(start.elapsed(), Duration::from_millis(4_500));
    assert_eq!(result.meta().backend, Backend::Stub);
    assert_eq!(result.meta().reason, Some(ReasonTag::OpenaiError));
    assert_eq!(metrics.attempts_count(AttemptOutcome::Timeout), 3);
}

#[tokio::test(start_paused = true)]
async fn test_slow_attempt_is_abandoned_and_retried() {
    let client = ScriptedClient::new(vec![Step::Delay(Duration::from_secs(5))]);
    let adviser = AdviserService::new(options(1, 2_000))
        .with_client_factory(ScriptedFactory::new(client.clone()));

    let start = Instant::now();
    let result = adviser.generate(remote_request("q")).await;

    assert_eq!(client.calls(), 2);
    assert_eq!(start.elapsed(), Duration::from_millis(2_500));
    assert_eq!(result.meta().backend, Backend::Remote);
    assert_eq!(result.meta().reason, None);
}

#[tokio::test(start_paused = true)]
async fn test_attempt_within_timeout_succeeds() {
    let client = ScriptedClient::new(vec![Step::Delay(Duration::from_millis(900))]);
    let adviser = AdviserService::new(options(0, 1_000))
        .with_client_factory(ScriptedFactory::new(client.clone()));

    let result = adviser.generate(remote_request("q")).await;

    assert_eq!(client.calls(), 1);
    assert_eq!(result.meta().backend, Backend::Remote);
    assert!(result.meta().duration_ms >= 900);
}
