//! Error types for the tarot adviser
//!
//! `AppError` covers failures outside a generation call (configuration,
//! CLI input, I/O). Errors raised while talking to a backend live in
//! [`crate::client::ClientError`] and never escape the orchestration layer.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Failed to read input file {path}: {source}")]
    InputRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Input file {path} is not a valid request: {source}")]
    InputParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Generation failed: {0}")]
    Generation(#[from] crate::client::ClientError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) | Self::InputParse { .. } => StatusCode::BAD_REQUEST,
            Self::Generation(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_creates() {
        let err = AppError::Config("test error".to_string());
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_validation_error_creates() {
        let err = AppError::Validation("invalid input".to_string());
        assert_eq!(err.to_string(), "Invalid request: invalid input");
    }

    #[test]
    fn test_generation_error_wraps_client_error() {
        let err = AppError::from(crate::client::ClientError::MissingCredentials);
        assert!(err.to_string().starts_with("Generation failed:"));
    }

    #[test]
    fn test_validation_error_response_status() {
        let err = AppError::Validation("test".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_generation_error_response_status() {
        let err = AppError::Generation(crate::client::ClientError::Http {
            status: 503,
            body: "busy".to_string(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_internal_error_response_status() {
        let err = AppError::Internal("test".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
