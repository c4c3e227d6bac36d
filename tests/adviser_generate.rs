//! End-to-end tests for `AdviserService::generate`
//!
//! Covers backend selection, remote output that fails parsing, credential
//! defaults and input coercion.

mod common;

use common::{ScriptedClient, ScriptedFactory, Step, options, remote_request};
use std::sync::Arc;
use tarot_adviser::adviser::{AdviseRequest, AdviserOptions, AdviserService, CardInput, RequestDefaults};
use tarot_adviser::config::Config;
use tarot_adviser::domain::{BackendPreference, Position};
use tarot_adviser::metrics::{Metrics, Outcome};
use tarot_adviser::result::{Backend, ReasonTag};

#[tokio::test]
async fn test_auto_without_key_uses_local_reading() {
    let client = ScriptedClient::new(vec![]);
    let factory = ScriptedFactory::new(client.clone());
    let adviser = AdviserService::new(options(2, 20_000)).with_client_factory(factory.clone());

    let mut request = remote_request("q");
    request.api_key = None;
    let result = adviser.generate(request).await;

    assert_eq!(client.calls(), 0);
    assert!(factory.seen().is_empty());
    assert_eq!(result.meta().backend, Backend::Stub);
    assert_eq!(result.meta().reason, None);
}

#[tokio::test]
async fn test_auto_with_key_uses_remote_backend() {
    let client = ScriptedClient::new(vec![]);
    let factory = ScriptedFactory::new(client.clone());
    let adviser = AdviserService::new(options(2, 20_000)).with_client_factory(factory.clone());

    let result = adviser.generate(remote_request("q")).await;

    assert_eq!(client.calls(), 1);
    assert_eq!(result.meta().backend, Backend::Remote);
    assert!(result.meta().approx_tokens > 0);
    let seen = factory.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0.key, "sk-test");
    assert_eq!(seen[0].0.model, "gpt-4o-mini");
    assert_eq!(seen[0].1, "en");
}

#[tokio::test]
async fn test_configured_key_and_model_are_used_when_request_omits_them() {
    let client = ScriptedClient::new(vec![]);
    let factory = ScriptedFactory::new(client.clone());
    let adviser = AdviserService::new(AdviserOptions {
        defaults: RequestDefaults {
            api_key: Some("sk-configured".to_string()),
            model: "gpt-4o".to_string(),
            locale: "ja".to_string(),
        },
        ..options(0, 20_000)
    })
    .with_client_factory(factory.clone());

    let request = AdviseRequest {
        question: Some("q".to_string()),
        cards: Some(vec![CardInput::new("The Moon", "reversed")]),
        ..AdviseRequest::default()
    };
    let result = adviser.generate(request).await;

    assert_eq!(result.meta().backend, Backend::Remote);
    let (credentials, locale) = &factory.seen()[0];
    assert_eq!(credentials.key, "sk-configured");
    assert_eq!(credentials.model, "gpt-4o");
    assert_eq!(locale, "ja");
}

#[tokio::test]
async fn test_explicit_stub_ignores_key() {
    let client = ScriptedClient::new(vec![]);
    let adviser = AdviserService::new(options(2, 20_000))
        .with_client_factory(ScriptedFactory::new(client.clone()));

    let mut request = remote_request("q");
    request.backend = Some("stub".to_string());
    let result = adviser.generate(request).await;

    assert_eq!(client.calls(), 0);
    assert_eq!(result.meta().backend, Backend::Stub);
}

#[tokio::test]
async fn test_explicit_remote_without_key_falls_back() {
    let client = ScriptedClient::new(vec![]);
    let adviser = AdviserService::new(options(2, 20_000))
        .with_client_factory(ScriptedFactory::new(client.clone()));

    let mut request = remote_request("q");
    request.api_key = None;
    request.backend = Some("openai".to_string());
    let result = adviser.generate(request).await;

    assert_eq!(client.calls(), 0);
    assert!(result.is_valid());
    assert_eq!(result.meta().backend, Backend::Stub);
    assert_eq!(result.meta().reason, Some(ReasonTag::OpenaiError));
}

#[tokio::test]
async fn test_remote_non_json_output_keeps_remote_backend() {
    let client = ScriptedClient::new(vec![Step::Reply("This is not JSON".to_string())]);
    let metrics = Arc::new(Metrics::new().unwrap());
    let adviser = AdviserService::new(options(2, 20_000))
        .with_client_factory(ScriptedFactory::new(client.clone()))
        .with_metrics(metrics.clone());

    let result = adviser.generate(remote_request("q")).await;

    assert_eq!(client.calls(), 1, "parse failures are not retried");
    assert!(result.is_valid());
    assert_eq!(result.meta().backend, Backend::Remote);
    assert_eq!(result.meta().reason, Some(ReasonTag::NonJson));
    let reading = result.reading().unwrap();
    assert_eq!(reading.cards[0].card_name, "The Fool");
    assert_eq!(metrics.requests_count(Outcome::Fallback), 1);
}

#[tokio::test]
async fn test_remote_schema_mismatch_is_tagged() {
    let client = ScriptedClient::new(vec![Step::Reply(
        r#"{"summary": 42, "cards": "none"}"#.to_string(),
    )]);
    let adviser = AdviserService::new(options(2, 20_000))
        .with_client_factory(ScriptedFactory::new(client.clone()));

    let result = adviser.generate(remote_request("q")).await;

    assert_eq!(result.meta().backend, Backend::Remote);
    assert_eq!(result.meta().reason, Some(ReasonTag::SchemaMismatch));
}

#[tokio::test]
async fn test_remote_reply_missing_cards_gets_one_entry_per_card() {
    let client = ScriptedClient::new(vec![Step::Reply(
        r#"{"summary": "s", "cards": []}"#.to_string(),
    )]);
    let adviser = AdviserService::new(options(2, 20_000))
        .with_client_factory(ScriptedFactory::new(client.clone()));

    let result = adviser.generate(remote_request("q")).await;

    assert!(result.is_valid());
    assert_eq!(result.meta().reason, Some(ReasonTag::SchemaMismatch));
    let cards = &result.reading().unwrap().cards;
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].card_name, "The Fool");
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_fallback_covers_every_card_in_order() {
    let adviser = AdviserService::new(AdviserOptions::default());
    let request = AdviseRequest {
        question: Some("Career?".to_string()),
        cards: Some(vec![
            CardInput::new("The Tower", "Reversed"),
            CardInput::default(),
            CardInput::new("The World", "sideways"),
        ]),
        locale: Some("en".to_string()),
        ..AdviseRequest::default()
    };

    let result = adviser.generate(request).await;

    let cards = &result.reading().unwrap().cards;
    assert_eq!(cards.len(), 3);
    assert_eq!(cards[0].card_name, "The Tower");
    assert_eq!(cards[0].position, Position::Reversed);
    assert_eq!(cards[1].card_name, "Unknown");
    assert_eq!(cards[2].position, Position::Upright);
}

#[tokio::test]
async fn test_lenient_json_request() {
    let adviser = AdviserService::new(AdviserOptions::default());
    let request: AdviseRequest = serde_json::from_str(
        r#"{"question": 7, "cards": [{"cardName": "The Lovers", "slot": 3}], "spread": "bad"}"#,
    )
    .unwrap();

    let result = adviser.generate(request).await;

    assert!(result.is_valid());
    assert_eq!(result.reading().unwrap().cards[0].card_name, "The Lovers");
}

#[tokio::test]
async fn test_from_config_honors_configured_backend() {
    let config: Config = "[adviser]\nbackend = \"stub\"\n".parse().unwrap();
    let adviser = AdviserService::from_config(&config);
    assert_eq!(adviser.options().backend, BackendPreference::Stub);

    let result = adviser.generate(remote_request("q")).await;
    assert_eq!(result.meta().backend, Backend::Stub);
    assert_eq!(result.meta().reason, None);
}
