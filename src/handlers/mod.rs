//! HTTP request handlers for the tarot adviser API

use crate::adviser::AdviserService;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::middleware::request_id::request_id_middleware;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod health;
pub mod metrics;
pub mod readings;

/// Application state shared across all handlers
///
/// All fields are Arc'd for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    adviser: Arc<AdviserService>,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Create a new AppState from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics registry cannot be created.
    pub fn new(config: Config) -> AppResult<Self> {
        let metrics = Arc::new(Metrics::new().map_err(|e| {
            AppError::Internal(format!("Failed to initialize metrics: {}", e))
        })?);
        let adviser = AdviserService::from_config(&config).with_metrics(metrics.clone());
        Ok(Self::with_adviser(config, adviser, metrics))
    }

    /// Assemble state around an existing service
    ///
    /// The service should record into the same `metrics` for `/metrics`
    /// and `/health` to reflect its activity.
    pub fn with_adviser(config: Config, adviser: AdviserService, metrics: Arc<Metrics>) -> Self {
        Self {
            config: Arc::new(config),
            adviser: Arc::new(adviser),
            metrics,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn adviser(&self) -> &AdviserService {
        &self.adviser
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Build the application router with request ids and HTTP tracing
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/v1/readings", post(readings::handler))
        .route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
