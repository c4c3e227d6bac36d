//! Adviser orchestration service
//!
//! The contract callers actually use. [`AdviserService::generate`] always
//! resolves to a [`GenerationResult`]: a reading from the selected backend,
//! a deterministic fallback reading (with `meta.reason` explaining why), or
//! a `NO_CARDS` invalid-input notice. Backend failures never surface as
//! errors.
//!
//! Per call:
//! 1. normalize the request; empty card list short-circuits to `NO_CARDS`
//! 2. select the backend
//! 3. consult the outer cache
//! 4. dispatch: remote through the timeout/retry wrapper, or the fallback
//! 5. write the outer cache and return

pub mod fingerprint;
pub mod normalize;
pub mod retry;

#[cfg(test)]
mod retry_tests;

pub use fingerprint::fingerprint;
pub use normalize::{
    AdviseRequest, CardInput, RequestDefaults, SpreadInput, normalize, parse_preference,
    select_backend,
};
pub use retry::{RetryPolicy, retry_with_timeout};

use crate::cache::{InMemoryCache, ResultCache};
use crate::client::{ClientFactory, OpenAiClientFactory};
use crate::config::Config;
use crate::domain::{BackendPreference, NormalizedRequest, is_japanese};
use crate::metrics::{CacheLayer, Metrics, Outcome};
use crate::parser::fallback_reading;
use crate::result::{Backend, ErrorCode, ErrorInfo, GenerationResult, ReasonTag, ResultMeta};
use crate::telemetry::{Logger, TracingLogger};
use crate::usecase::{GenerateReadingUseCase, ReadingRequest};
use retry::AttemptOutcome;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Default time-to-live for outer cache entries
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Service-wide settings
#[derive(Debug, Clone)]
pub struct AdviserOptions {
    /// Used when the request does not name a backend
    pub backend: BackendPreference,
    pub defaults: RequestDefaults,
    pub retry: RetryPolicy,
    pub cache_ttl: Duration,
}

impl Default for AdviserOptions {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            defaults: RequestDefaults::default(),
            retry: RetryPolicy::default(),
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// Orchestrates normalization, backend selection, caching and fallback
pub struct AdviserService {
    options: AdviserOptions,
    client_factory: Option<Arc<dyn ClientFactory>>,
    cache: Option<Arc<dyn ResultCache>>,
    inner_cache: Arc<dyn ResultCache>,
    logger: Arc<dyn Logger>,
    metrics: Option<Arc<Metrics>>,
}

impl AdviserService {
    /// Service with an in-memory outer cache and no remote capability
    pub fn new(options: AdviserOptions) -> Self {
        Self {
            options,
            client_factory: None,
            cache: Some(Arc::new(InMemoryCache::new())),
            inner_cache: Arc::new(InMemoryCache::new()),
            logger: Arc::new(TracingLogger),
            metrics: None,
        }
    }

    /// Fully wired service for the given configuration
    pub fn from_config(config: &Config) -> Self {
        let options = AdviserOptions {
            backend: config.adviser.backend,
            defaults: config.request_defaults(),
            retry: config.retry_policy(),
            cache_ttl: Duration::from_secs(config.cache.ttl_seconds),
        };
        let mut service = Self::new(options);
        match OpenAiClientFactory::new(&config.openai.base_url, config.openai.temperature) {
            Ok(factory) => service = service.with_client_factory(Arc::new(factory)),
            Err(e) => tracing::error!(
                error = %e,
                "Failed to build HTTP client, remote backend unavailable"
            ),
        }
        if config.cache.enabled {
            service
        } else {
            service.without_cache()
        }
    }

    /// Enable the remote backend
    pub fn with_client_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.client_factory = Some(factory);
        self
    }

    /// Replace the outer cache
    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Disable the outer cache
    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn options(&self) -> &AdviserOptions {
        &self.options
    }

    /// True when remote generation can be dispatched
    pub fn remote_available(&self) -> bool {
        self.client_factory.is_some()
    }

    /// Generate a reading; never fails
    pub async fn generate(&self, request: AdviseRequest) -> GenerationResult {
        let started = Instant::now();
        let inference_id = Uuid::new_v4().to_string();

        let preference =
            parse_preference(request.backend.as_deref()).unwrap_or(self.options.backend);
        let normalized = normalize(request, &self.options.defaults);
        let backend = select_backend(preference, &normalized.credentials);

        if normalized.cards.is_empty() {
            self.logger.info(
                "adviser_invalid_input",
                &[
                    ("inference_id", inference_id.clone()),
                    ("code", "NO_CARDS".to_string()),
                ],
            );
            let mut meta = ResultMeta::new(inference_id, Backend::Stub);
            meta.duration_ms = elapsed_ms(started);
            meta.user_id = normalized.user_id.clone();
            let result = GenerationResult::invalid(no_cards_error(&normalized.locale), meta);
            self.record_completion(&result, started);
            return result;
        }

        let key = fingerprint(&normalized, backend);

        if let Some(hit) = self.cache_get(&key).await {
            self.logger.debug(
                "adviser_cache_hit",
                &[
                    ("inference_id", hit.meta().inference_id.clone()),
                    ("cache_key", key.clone()),
                ],
            );
            self.record("record_cache_hit", |m| m.record_cache_hit(CacheLayer::Outer));
            let mut hit = hit.with_cached(true);
            hit.meta_mut().user_id = normalized.user_id.clone();
            self.record_completion(&hit, started);
            return hit;
        }

        let mut result = match (backend, &self.client_factory) {
            (Backend::Remote, Some(factory)) => {
                self.run_remote(factory.as_ref(), &normalized, inference_id, started)
                    .await
            }
            (Backend::Remote, None) => {
                self.logger.warn(
                    "adviser_remote_unavailable",
                    &[("inference_id", inference_id.clone())],
                );
                self.fallback(
                    &normalized,
                    inference_id,
                    started,
                    Some(ReasonTag::OpenaiNotAvailable),
                )
            }
            (Backend::Stub, _) => self.fallback(&normalized, inference_id, started, None),
        };
        result.meta_mut().user_id = normalized.user_id.clone();

        self.cache_set(&key, &result).await;
        self.record_completion(&result, started);

        self.logger.info(
            "adviser_generated",
            &[
                ("inference_id", result.meta().inference_id.clone()),
                ("backend", result.meta().backend.as_str().to_string()),
                (
                    "reason",
                    result
                        .meta()
                        .reason
                        .map(|r| r.as_str().to_string())
                        .unwrap_or_default(),
                ),
                ("duration_ms", result.meta().duration_ms.to_string()),
            ],
        );

        result
    }

    async fn run_remote(
        &self,
        factory: &dyn ClientFactory,
        normalized: &NormalizedRequest,
        inference_id: String,
        started: Instant,
    ) -> GenerationResult {
        let client = match factory.create(&normalized.credentials, &normalized.locale) {
            Ok(client) => client,
            Err(e) => {
                self.logger.warn(
                    "adviser_client_build_failed",
                    &[
                        ("inference_id", inference_id.clone()),
                        ("code", e.code()),
                        ("error", e.to_string()),
                    ],
                );
                self.record("record_attempt", |m| {
                    m.record_attempt(AttemptOutcome::FatalError)
                });
                return self.fallback(
                    normalized,
                    inference_id,
                    started,
                    Some(ReasonTag::OpenaiError),
                );
            }
        };

        let usecase = GenerateReadingUseCase::new(client, Arc::clone(&self.inner_cache))
            .with_logger(Arc::clone(&self.logger))
            .with_locale(normalized.locale.as_str())
            .with_parse_failure_caching(false)
            .with_namespace(format!(
                "{}:{}",
                normalized.credentials.model, normalized.locale
            ));
        let request = ReadingRequest {
            question: normalized.question.clone(),
            cards: normalized.cards.clone(),
            spread: normalized.spread.clone(),
            user_id: normalized.user_id.clone(),
        };

        let outcome = retry_with_timeout(&self.options.retry, self.logger.as_ref(), |_| {
            usecase.execute(&request)
        })
        .await;

        match outcome {
            Ok(retried) => {
                self.record_attempts(&retried.outcomes);
                if retried.value.meta().cached {
                    self.record("record_cache_hit", |m| m.record_cache_hit(CacheLayer::Inner));
                }
                match retried.value {
                    GenerationResult::Reading(inner) => {
                        let mut meta = ResultMeta::new(inference_id, Backend::Remote);
                        meta.duration_ms = elapsed_ms(started);
                        meta.approx_tokens = inner.meta.approx_tokens;
                        meta.reason = inner.meta.reason;
                        meta.cached = inner.meta.cached;
                        GenerationResult::reading_result(true, inner.reading, meta)
                    }
                    GenerationResult::Invalid(inner) => {
                        self.logger.warn(
                            "adviser_remote_invalid",
                            &[
                                ("inference_id", inference_id.clone()),
                                ("message", inner.error.message),
                            ],
                        );
                        self.fallback(
                            normalized,
                            inference_id,
                            started,
                            Some(ReasonTag::OpenaiError),
                        )
                    }
                }
            }
            Err(exhausted) => {
                self.record_attempts(&exhausted.outcomes);
                self.logger.warn(
                    "adviser_remote_failed",
                    &[
                        ("inference_id", inference_id.clone()),
                        ("attempts", exhausted.attempts().to_string()),
                        ("code", exhausted.error.code()),
                        ("error", exhausted.error.to_string()),
                    ],
                );
                self.fallback(
                    normalized,
                    inference_id,
                    started,
                    Some(ReasonTag::OpenaiError),
                )
            }
        }
    }

    fn fallback(
        &self,
        normalized: &NormalizedRequest,
        inference_id: String,
        started: Instant,
        reason: Option<ReasonTag>,
    ) -> GenerationResult {
        let reading = fallback_reading(&normalized.cards, &normalized.question, &normalized.locale);
        let mut meta = ResultMeta::new(inference_id, Backend::Stub);
        meta.duration_ms = elapsed_ms(started);
        meta.reason = reason;
        GenerationResult::reading_result(true, reading, meta)
    }

    async fn cache_get(&self, key: &str) -> Option<GenerationResult> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                self.logger.warn(
                    "adviser_cache_get_failed",
                    &[("cache_key", key.to_string()), ("error", e.to_string())],
                );
                None
            }
        }
    }

    async fn cache_set(&self, key: &str, result: &GenerationResult) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(e) = cache
            .set(key, result.clone(), Some(self.options.cache_ttl))
            .await
        {
            self.logger.warn(
                "adviser_cache_set_failed",
                &[("cache_key", key.to_string()), ("error", e.to_string())],
            );
        }
    }

    fn record_completion(&self, result: &GenerationResult, started: Instant) {
        let outcome = match result {
            GenerationResult::Invalid(_) => Outcome::Invalid,
            GenerationResult::Reading(r) if r.meta.reason.is_some() => Outcome::Fallback,
            GenerationResult::Reading(_) => Outcome::Ok,
        };
        self.record("record_request", |m| m.record_request(outcome));
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.record("record_duration", |m| m.record_duration(duration_ms));
    }

    fn record_attempts(&self, outcomes: &[AttemptOutcome]) {
        for outcome in outcomes {
            self.record("record_attempt", |m| m.record_attempt(*outcome));
        }
    }

    fn record<F>(&self, operation: &str, f: F)
    where
        F: FnOnce(&Metrics) -> Result<(), prometheus::Error>,
    {
        let Some(metrics) = &self.metrics else {
            return;
        };
        if let Err(e) = f(metrics) {
            tracing::warn!(
                operation = %operation,
                error = %e,
                "Failed to record metric, continuing"
            );
            metrics.metrics_recording_failure(operation);
        }
    }
}

fn no_cards_error(locale: &str) -> ErrorInfo {
    let message = if is_japanese(locale) {
        "カードが選択されていません"
    } else {
        "No cards were selected"
    };
    ErrorInfo {
        code: ErrorCode::NoCards,
        message: message.to_string(),
        retryable: false,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
