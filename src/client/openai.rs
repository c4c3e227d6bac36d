//! Chat-completions client for OpenAI-compatible endpoints
//!
//! Sends one request per `generate` call. Retries, timeouts around the
//! whole attempt and fallback are the caller's job; this client only maps
//! transport and HTTP failures onto [`ClientError`] variants so they can be
//! classified.

use super::{ClientError, ClientFactory, TextGenerator};
use crate::domain::{Credentials, is_japanese, truncate_chars};
use crate::result::Backend;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TEMPERATURE: f64 = 0.2;

/// Longest error body carried in `ClientError::Http`
const MAX_ERROR_BODY_CHARS: usize = 500;

const SYSTEM_PROMPT_JA: &str =
    "あなたは思いやりのあるタロットアドバイザーです。出力は必ず日本語の有効なJSONのみで返してください。";
const SYSTEM_PROMPT_EN: &str =
    "You are a compassionate tarot adviser. Respond only with valid JSON.";

/// Construction options for [`OpenAiClient`]
#[derive(Clone)]
pub struct OpenAiOptions {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f64,
    pub locale: String,
    /// Transport-level timeout; `None` leaves it to the caller
    pub request_timeout: Option<Duration>,
}

impl fmt::Debug for OpenAiOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiOptions")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("locale", &self.locale)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Remote text generator speaking the chat-completions protocol
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    temperature: f64,
    system_prompt: &'static str,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    /// # Errors
    ///
    /// `MissingCredentials` when the key is blank, `ClientBuild` when the
    /// HTTP client cannot be constructed.
    pub fn new(options: OpenAiOptions) -> Result<Self, ClientError> {
        if options.api_key.trim().is_empty() {
            return Err(ClientError::MissingCredentials);
        }
        let http = build_http(options.request_timeout)?;
        Self::with_http(http, options)
    }

    /// Client sharing an existing connection pool
    ///
    /// `options.request_timeout` is ignored; the pool's own settings apply.
    ///
    /// # Errors
    ///
    /// `MissingCredentials` when the key is blank.
    pub fn with_http(http: reqwest::Client, options: OpenAiOptions) -> Result<Self, ClientError> {
        if options.api_key.trim().is_empty() {
            return Err(ClientError::MissingCredentials);
        }

        let endpoint = format!(
            "{}/chat/completions",
            options.base_url.trim_end_matches('/')
        );
        let system_prompt = if is_japanese(&options.locale) {
            SYSTEM_PROMPT_JA
        } else {
            SYSTEM_PROMPT_EN
        };

        Ok(Self {
            http,
            api_key: options.api_key,
            model: options.model,
            endpoint,
            temperature: options.temperature,
            system_prompt,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ClientError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        tracing::debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            prompt_length = prompt.len(),
            "Sending chat completion request"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            tracing::warn!(
                status = status.as_u16(),
                model = %self.model,
                "Chat completion request failed"
            );
            return Err(ClientError::Http {
                status: status.as_u16(),
                body: truncate_chars(&text, MAX_ERROR_BODY_CHARS),
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| ClientError::MalformedResponse(format!("invalid response JSON: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                ClientError::MalformedResponse(
                    "response missing choices[0].message.content".to_string(),
                )
            })
    }

    fn backend(&self) -> Backend {
        Backend::Remote
    }
}

fn build_http(request_timeout: Option<Duration>) -> Result<reqwest::Client, ClientError> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = request_timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| ClientError::ClientBuild(e.to_string()))
}

fn map_transport_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout(err.to_string())
    } else if err.is_connect() {
        ClientError::Connection(err.to_string())
    } else {
        let message = format!("{:?}", err).to_ascii_lowercase();
        if message.contains("reset") || message.contains("closed") {
            ClientError::Connection(err.to_string())
        } else {
            ClientError::Other(err.to_string())
        }
    }
}

/// Builds an [`OpenAiClient`] per call from the call's credentials
///
/// Every client handed out shares the factory's connection pool; only the
/// key, model and locale vary per call.
#[derive(Debug, Clone)]
pub struct OpenAiClientFactory {
    http: reqwest::Client,
    base_url: String,
    temperature: f64,
}

impl OpenAiClientFactory {
    /// # Errors
    ///
    /// `ClientBuild` when the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>, temperature: f64) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_http(None)?,
            base_url: base_url.into(),
            temperature,
        })
    }

    /// Rebuild the shared pool with a transport-level timeout
    ///
    /// # Errors
    ///
    /// `ClientBuild` when the HTTP client cannot be constructed.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, ClientError> {
        self.http = build_http(Some(timeout))?;
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl ClientFactory for OpenAiClientFactory {
    fn create(
        &self,
        credentials: &Credentials,
        locale: &str,
    ) -> Result<Arc<dyn crate::client::TextGenerator>, ClientError> {
        let client = OpenAiClient::with_http(
            self.http.clone(),
            OpenAiOptions {
                api_key: credentials.key.clone(),
                model: credentials.model.clone(),
                base_url: self.base_url.clone(),
                temperature: self.temperature,
                locale: locale.to_string(),
                request_timeout: None,
            },
        )?;
        Ok(Arc::new(client))
    }
}
