//! Generation use case: cache, prompt, generate, parse
//!
//! The inner composition layer. It has no retry or timeout logic and can be
//! driven standalone (the `read` CLI command does exactly that). Client
//! errors propagate to the caller; cache errors are logged and ignored.

use crate::cache::ResultCache;
use crate::client::{ClientError, TextGenerator};
use crate::domain::{Card, DEFAULT_LOCALE, NormalizedRequest, Spread};
use crate::parser::{ReadingContext, parse_reading};
use crate::prompt::build_prompt;
use crate::result::{GenerationResult, ResultMeta};
use crate::telemetry::{Logger, TracingLogger};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

/// Input to [`GenerateReadingUseCase::execute`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadingRequest {
    pub question: String,
    pub cards: Vec<Card>,
    pub spread: Option<Spread>,
    pub user_id: Option<String>,
}

impl From<NormalizedRequest> for ReadingRequest {
    fn from(request: NormalizedRequest) -> Self {
        Self {
            question: request.question,
            cards: request.cards,
            spread: request.spread,
            user_id: request.user_id,
        }
    }
}

#[derive(Serialize)]
struct CacheKey<'a> {
    question: &'a str,
    cards: &'a [Card],
    spread: Option<&'a Spread>,
}

/// Inner generation pipeline
pub struct GenerateReadingUseCase {
    client: Arc<dyn TextGenerator>,
    cache: Arc<dyn ResultCache>,
    logger: Arc<dyn Logger>,
    locale: String,
    namespace: Option<String>,
    cache_parse_failures: bool,
}

impl GenerateReadingUseCase {
    pub fn new(client: Arc<dyn TextGenerator>, cache: Arc<dyn ResultCache>) -> Self {
        Self {
            client,
            cache,
            logger: Arc::new(TracingLogger),
            locale: DEFAULT_LOCALE.to_string(),
            namespace: None,
            cache_parse_failures: true,
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Locale used for fallback readings
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Prefix for cache keys, keeping entries for different settings apart
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Whether results whose backend output failed parsing are stored
    ///
    /// Long-lived shared caches turn this off so one bad reply is not
    /// replayed until the process restarts.
    pub fn with_parse_failure_caching(mut self, enabled: bool) -> Self {
        self.cache_parse_failures = enabled;
        self
    }

    /// Cache key for a request: `{question, cards, spread}` as JSON
    pub fn cache_key(&self, request: &ReadingRequest) -> String {
        let key = CacheKey {
            question: &request.question,
            cards: &request.cards,
            spread: request.spread.as_ref(),
        };
        let json = serde_json::to_string(&key).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialize cache key");
            format!("{:?}", request)
        });
        match &self.namespace {
            Some(ns) => format!("{}|{}", ns, json),
            None => json,
        }
    }

    /// Generate (or recall) a reading for the request
    ///
    /// Hits are returned with `meta.cached = true`. Backend output that
    /// fails parsing still yields `Ok`: the result carries the fallback
    /// reading with `valid = false` and a reason tag.
    ///
    /// # Errors
    ///
    /// Propagates the client's error unchanged.
    pub async fn execute(&self, request: &ReadingRequest) -> Result<GenerationResult, ClientError> {
        let key = self.cache_key(request);

        match self.cache.get(&key).await {
            Ok(Some(hit)) => {
                self.logger.debug(
                    "usecase_cache_hit",
                    &[("inference_id", hit.meta().inference_id.clone())],
                );
                return Ok(hit.with_cached(true));
            }
            Ok(None) => {}
            Err(e) => {
                self.logger
                    .warn("usecase_cache_get_failed", &[("error", e.to_string())]);
            }
        }

        let prompt = build_prompt(&request.question, &request.cards, request.spread.as_ref());
        let started = Instant::now();
        let raw = self.client.generate(&prompt).await?;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let ctx = ReadingContext {
            cards: &request.cards,
            question: &request.question,
            locale: &self.locale,
        };
        let outcome = parse_reading(&raw, ctx);

        let mut meta = ResultMeta::new(Uuid::new_v4().to_string(), self.client.backend());
        meta.duration_ms = duration_ms;
        meta.approx_tokens = approx_tokens(&prompt, &raw);
        meta.reason = outcome.reason.map(Into::into);
        meta.user_id = request.user_id.clone();

        self.logger.info(
            "usecase_generated",
            &[
                ("inference_id", meta.inference_id.clone()),
                ("backend", meta.backend.as_str().to_string()),
                ("valid", outcome.valid.to_string()),
                ("duration_ms", duration_ms.to_string()),
                ("approx_tokens", meta.approx_tokens.to_string()),
            ],
        );

        let parse_failed = outcome.reason.is_some();
        let result = GenerationResult::reading_result(outcome.valid, outcome.reading, meta);

        if parse_failed && !self.cache_parse_failures {
            self.logger.debug(
                "usecase_cache_skip_parse_failure",
                &[("inference_id", result.meta().inference_id.clone())],
            );
        } else if let Err(e) = self.cache.set(&key, result.clone(), None).await {
            self.logger
                .warn("usecase_cache_set_failed", &[("error", e.to_string())]);
        }

        Ok(result)
    }
}

/// Rough token estimate: one token per four characters, rounded up
pub fn approx_tokens(prompt: &str, raw: &str) -> u64 {
    let chars = prompt.chars().count() + raw.chars().count();
    chars.div_ceil(4) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::client::{StubClient, StubMode};
    use crate::domain::Position;

    fn request() -> ReadingRequest {
        ReadingRequest {
            question: "Q".to_string(),
            cards: vec![Card::new("The Moon", Position::Reversed, None)],
            spread: None,
            user_id: None,
        }
    }

    #[test]
    fn test_approx_tokens_rounds_up() {
        assert_eq!(approx_tokens("abcd", ""), 1);
        assert_eq!(approx_tokens("abcd", "e"), 2);
        assert_eq!(approx_tokens("", ""), 0);
    }

    #[test]
    fn test_cache_key_is_order_sensitive() {
        let usecase = GenerateReadingUseCase::new(
            Arc::new(StubClient::new(StubMode::Valid)),
            Arc::new(InMemoryCache::new()),
        );
        let mut a = request();
        a.cards.push(Card::new("The Sun", Position::Upright, None));
        let mut b = a.clone();
        b.cards.reverse();
        assert_ne!(usecase.cache_key(&a), usecase.cache_key(&b));
    }

    #[test]
    fn test_cache_key_ignores_user_id() {
        let usecase = GenerateReadingUseCase::new(
            Arc::new(StubClient::new(StubMode::Valid)),
            Arc::new(InMemoryCache::new()),
        );
        let mut with_user = request();
        with_user.user_id = Some("u1".to_string());
        assert_eq!(usecase.cache_key(&request()), usecase.cache_key(&with_user));
    }

    #[test]
    fn test_namespace_prefixes_key() {
        let usecase = GenerateReadingUseCase::new(
            Arc::new(StubClient::new(StubMode::Valid)),
            Arc::new(InMemoryCache::new()),
        )
        .with_namespace("gpt-4o-mini:en");
        let key = usecase.cache_key(&request());
        assert!(key.starts_with("gpt-4o-mini:en|{"));
        assert!(key.contains("\"question\":\"Q\""));
    }

    #[tokio::test]
    async fn test_parse_failures_are_cached_by_default() {
        let cache = Arc::new(InMemoryCache::new());
        let usecase =
            GenerateReadingUseCase::new(Arc::new(StubClient::new(StubMode::Invalid)), cache.clone());

        let first = usecase.execute(&request()).await.unwrap();
        let second = usecase.execute(&request()).await.unwrap();

        assert!(!first.is_valid());
        assert!(second.meta().cached);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_parse_failures_skip_cache_when_disabled() {
        let cache = Arc::new(InMemoryCache::new());
        let usecase =
            GenerateReadingUseCase::new(Arc::new(StubClient::new(StubMode::Invalid)), cache.clone())
                .with_parse_failure_caching(false);

        let first = usecase.execute(&request()).await.unwrap();
        let second = usecase.execute(&request()).await.unwrap();

        assert!(!second.meta().cached);
        assert_ne!(first.meta().inference_id, second.meta().inference_id);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_valid_results_are_cached_when_failure_caching_disabled() {
        let cache = Arc::new(InMemoryCache::new());
        let usecase =
            GenerateReadingUseCase::new(Arc::new(StubClient::new(StubMode::Valid)), cache.clone())
                .with_parse_failure_caching(false);

        usecase.execute(&request()).await.unwrap();
        let second = usecase.execute(&request()).await.unwrap();

        assert!(second.meta().cached);
        assert_eq!(cache.len().await, 1);
    }
}
