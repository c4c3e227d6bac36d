//! Prometheus metrics collection for the adviser
//!
//! This module provides metrics instrumentation for tracking:
//! - Request outcomes (backend success, fallback, invalid input)
//! - Cache hits by layer
//! - Backend attempts by result
//! - End-to-end request latency
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.

use crate::adviser::retry::AttemptOutcome;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Terminal state of a generation call, as a metrics label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Reading produced by the selected backend
    Ok,
    /// Deterministic substitute delivered
    Fallback,
    /// No cards supplied
    Invalid,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Fallback => "fallback",
            Outcome::Invalid => "invalid",
        }
    }
}

/// Cache layer label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLayer {
    Outer,
    Inner,
}

impl CacheLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheLayer::Outer => "outer",
            CacheLayer::Inner => "inner",
        }
    }
}

/// Metrics collector for the adviser
///
/// All label values come from enums, so cardinality is fixed:
/// 3 outcomes, 2 cache layers, 4 attempt results.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    requests_total: IntCounterVec,
    cache_hits: IntCounterVec,
    backend_attempts: IntCounterVec,
    request_duration: Histogram,
    metrics_recording_failures: IntCounterVec,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "tarot_adviser_requests_total",
                "Total number of generation requests by outcome",
            ),
            &["outcome"],
        )?;

        let cache_hits = IntCounterVec::new(
            Opts::new(
                "tarot_adviser_cache_hits_total",
                "Total number of cache hits by cache layer",
            ),
            &["layer"],
        )?;

        let backend_attempts = IntCounterVec::new(
            Opts::new(
                "tarot_adviser_backend_attempts_total",
                "Total number of remote backend attempts by result",
            ),
            &["result"],
        )?;

        let request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "tarot_adviser_request_duration_ms",
                "End-to-end generation latency in milliseconds",
            )
            .buckets(vec![
                1.0, 5.0, 25.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 20000.0,
                60000.0,
            ]),
        )?;

        // Failures here never affect a call's result; they are only counted
        let metrics_recording_failures = IntCounterVec::new(
            Opts::new(
                "tarot_adviser_metrics_recording_failures_total",
                "Total number of metrics recording failures by operation",
            ),
            &["operation"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(backend_attempts.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(metrics_recording_failures.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            cache_hits,
            backend_attempts,
            request_duration,
            metrics_recording_failures,
        })
    }

    /// Record a completed request
    ///
    /// # Errors
    ///
    /// Returns an error if the metric is not registered.
    pub fn record_request(&self, outcome: Outcome) -> Result<(), prometheus::Error> {
        self.requests_total
            .get_metric_with_label_values(&[outcome.as_str()])?
            .inc();
        Ok(())
    }

    /// Record a cache hit
    ///
    /// # Errors
    ///
    /// Returns an error if the metric is not registered.
    pub fn record_cache_hit(&self, layer: CacheLayer) -> Result<(), prometheus::Error> {
        self.cache_hits
            .get_metric_with_label_values(&[layer.as_str()])?
            .inc();
        Ok(())
    }

    /// Record one remote backend attempt
    ///
    /// # Errors
    ///
    /// Returns an error if the metric is not registered.
    pub fn record_attempt(&self, outcome: AttemptOutcome) -> Result<(), prometheus::Error> {
        self.backend_attempts
            .get_metric_with_label_values(&[outcome.as_str()])?
            .inc();
        Ok(())
    }

    /// Record request duration
    ///
    /// # Errors
    ///
    /// Returns an error if `duration_ms` is NaN, infinite or negative;
    /// such values would corrupt every percentile of the histogram.
    pub fn record_duration(&self, duration_ms: f64) -> Result<(), prometheus::Error> {
        if !duration_ms.is_finite() {
            return Err(prometheus::Error::Msg(format!(
                "Histogram value must be finite (not NaN or Infinity), got: {}",
                duration_ms
            )));
        }
        if duration_ms < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "Histogram value must be non-negative, got: {}",
                duration_ms
            )));
        }
        self.request_duration.observe(duration_ms);
        Ok(())
    }

    /// Count a failed recording operation
    pub fn metrics_recording_failure(&self, operation: &str) {
        self.metrics_recording_failures
            .with_label_values(&[operation])
            .inc();
    }

    /// Requests recorded for `outcome` since startup
    pub fn requests_count(&self, outcome: Outcome) -> u64 {
        self.requests_total
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    /// Cache hits recorded for `layer` since startup
    pub fn cache_hits_count(&self, layer: CacheLayer) -> u64 {
        self.cache_hits.with_label_values(&[layer.as_str()]).get()
    }

    /// Backend attempts recorded for `outcome` since startup
    pub fn attempts_count(&self, outcome: AttemptOutcome) -> u64 {
        self.backend_attempts
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    /// Total metrics recording failures across all operations
    pub fn metrics_recording_failures_count(&self) -> u64 {
        ["record_request", "record_cache_hit", "record_attempt", "record_duration"]
            .iter()
            .map(|op| {
                self.metrics_recording_failures
                    .with_label_values(&[*op])
                    .get()
            })
            .sum()
    }

    /// Gather all metrics and encode them in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or produces invalid UTF-8.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let metric_count = metric_families.len();

        tracing::debug!(
            metric_family_count = metric_count,
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();

        encoder.encode(&metric_families, &mut buffer).map_err(|e| {
            tracing::error!(
                error = %e,
                metric_family_count = metric_count,
                "Prometheus text encoder failed"
            );
            prometheus::Error::Msg(format!(
                "Failed to encode {} metric families: {}",
                metric_count, e
            ))
        })?;

        String::from_utf8(buffer).map_err(|e| {
            let valid_up_to = e.utf8_error().valid_up_to();
            tracing::error!(
                invalid_byte_index = valid_up_to,
                "Prometheus encoder produced invalid UTF-8"
            );
            prometheus::Error::Msg(format!(
                "Failed to convert metrics to UTF-8 at byte {}: {}",
                valid_up_to, e
            ))
        })
    }
}
