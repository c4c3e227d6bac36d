//! Text-generation client abstraction
//!
//! A [`TextGenerator`] turns a prompt into raw text. Two implementations
//! exist: [`StubClient`] (deterministic, offline) and [`OpenAiClient`]
//! (chat-completions over HTTP). Callers hold `Arc<dyn TextGenerator>` and
//! never branch on the concrete type.

pub mod openai;
pub mod stub;

pub use openai::{OpenAiClient, OpenAiClientFactory, OpenAiOptions};
pub use stub::{StubClient, StubMode};

use crate::domain::Credentials;
use crate::result::Backend;
use async_trait::async_trait;
use std::sync::Arc;

/// Capability interface over a text-generation backend
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate raw text for a prompt
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] classified as transient, fatal or other;
    /// see [`ClientError::kind`].
    async fn generate(&self, prompt: &str) -> Result<String, ClientError>;

    /// Backend kind reported in result metadata
    fn backend(&self) -> Backend;
}

/// Builds a remote client for one call from that call's credentials
///
/// The orchestration layer holds this as an optional capability: when it
/// is absent, remote generation is unavailable and calls fall back to the
/// deterministic stub path.
pub trait ClientFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns `ClientError::MissingCredentials` when no key is present.
    fn create(
        &self,
        credentials: &Credentials,
        locale: &str,
    ) -> Result<Arc<dyn TextGenerator>, ClientError>;
}

/// Error classification used by retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rate limiting, server errors, timeouts, connection failures
    Transient,
    /// Missing credentials, malformed responses, unknown backend kinds
    Fatal,
    /// Anything else (e.g. 4xx client errors); not retried
    Other,
}

/// HTTP statuses treated as transient
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Errors raised by text-generation clients
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No API key available when constructing a remote client
    #[error(
        "Remote backend requires an API key. Set apiKey in the request, \
         openai.api_key in config, or the OPENAI_API_KEY env var."
    )]
    MissingCredentials,

    /// Requested backend kind is not known
    #[error("Unknown text-generation backend: {0}")]
    UnknownBackend(String),

    /// Backend answered with a non-success HTTP status
    #[error("Backend API error {status}: {body}")]
    Http { status: u16, body: String },

    /// Transport-level timeout
    #[error("Backend request timed out: {0}")]
    Timeout(String),

    /// Connection could not be established or was reset
    #[error("Backend connection failed: {0}")]
    Connection(String),

    /// Response did not have the expected shape
    #[error("Backend response malformed: {0}")]
    MalformedResponse(String),

    /// HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Backend request failed: {0}")]
    Other(String),
}

impl ClientError {
    /// Type-based classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http { status, .. } if RETRYABLE_STATUSES.contains(status) => {
                ErrorKind::Transient
            }
            Self::Timeout(_) | Self::Connection(_) => ErrorKind::Transient,
            Self::MissingCredentials
            | Self::UnknownBackend(_)
            | Self::MalformedResponse(_)
            | Self::ClientBuild(_) => ErrorKind::Fatal,
            Self::Http { .. } | Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Short code for logs and retry classification
    ///
    /// HTTP errors use the status number; network conditions use the
    /// conventional socket error names.
    pub fn code(&self) -> String {
        match self {
            Self::Http { status, .. } => status.to_string(),
            Self::Timeout(_) => "ETIMEDOUT".to_string(),
            Self::Connection(_) => "ECONNRESET".to_string(),
            Self::MissingCredentials => "MISSING_CREDENTIALS".to_string(),
            Self::UnknownBackend(_) => "UNKNOWN_BACKEND".to_string(),
            Self::MalformedResponse(_) => "MALFORMED_RESPONSE".to_string(),
            Self::ClientBuild(_) => "CLIENT_BUILD".to_string(),
            Self::Other(_) => "UNKNOWN".to_string(),
        }
    }

    /// True for transient errors
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

/// Options for [`create_client`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f64,
    pub locale: String,
    pub stub_mode: StubMode,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            model: crate::domain::DEFAULT_MODEL.to_string(),
            base_url: openai::DEFAULT_BASE_URL.to_string(),
            temperature: openai::DEFAULT_TEMPERATURE,
            locale: crate::domain::DEFAULT_LOCALE.to_string(),
            stub_mode: StubMode::Valid,
        }
    }
}

/// Construct a client by kind name ("stub" or "openai")
///
/// # Errors
///
/// `UnknownBackend` for any other kind; `MissingCredentials` for "openai"
/// without a key.
pub fn create_client(
    kind: &str,
    options: ClientOptions,
) -> Result<Arc<dyn TextGenerator>, ClientError> {
    match kind {
        "stub" => Ok(Arc::new(StubClient::new(options.stub_mode))),
        "openai" => {
            let client = OpenAiClient::new(OpenAiOptions {
                api_key: options.api_key.unwrap_or_default(),
                model: options.model,
                base_url: options.base_url,
                temperature: options.temperature,
                locale: options.locale,
                request_timeout: None,
            })?;
            Ok(Arc::new(client))
        }
        other => Err(ClientError::UnknownBackend(other.to_string())),
    }
}
