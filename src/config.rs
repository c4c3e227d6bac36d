//! Configuration management for the tarot adviser
//!
//! Parses TOML configuration files and provides typed access to settings.
//! Every section is optional; a missing file section takes its defaults.

use crate::adviser::{RequestDefaults, RetryPolicy};
use crate::adviser::retry::{DEFAULT_BASE_MS, DEFAULT_FACTOR, DEFAULT_MAX_RETRIES, MAX_RETRIES_LIMIT};
use crate::client::openai::{DEFAULT_BASE_URL, DEFAULT_TEMPERATURE};
use crate::domain::{BackendPreference, DEFAULT_LOCALE, DEFAULT_MODEL};
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for `adviser.timeout_ms` (5 minutes)
pub const MAX_TIMEOUT_MS: u64 = 300_000;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub adviser: AdviserConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Orchestration defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdviserConfig {
    /// "auto", "stub" or "openai"
    #[serde(default)]
    pub backend: BackendPreference,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Per-attempt timeout for remote generation
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for AdviserConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            model: default_model(),
            locale: default_locale(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

fn default_timeout_ms() -> u64 {
    20_000
}

/// Retry settings for remote generation
///
/// Fields are private and validated at deserialization time through
/// [`RetryConfig::new`], so an invalid instance never exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRetryConfig")]
pub struct RetryConfig {
    max_retries: u32,
    base_ms: u64,
    factor: f64,
    jitter: bool,
}

#[derive(Deserialize)]
struct RawRetryConfig {
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default = "default_base_ms")]
    base_ms: u64,
    #[serde(default = "default_factor")]
    factor: f64,
    #[serde(default = "default_jitter")]
    jitter: bool,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_base_ms() -> u64 {
    DEFAULT_BASE_MS
}

fn default_factor() -> f64 {
    DEFAULT_FACTOR
}

fn default_jitter() -> bool {
    true
}

impl TryFrom<RawRetryConfig> for RetryConfig {
    type Error = AppError;

    fn try_from(raw: RawRetryConfig) -> Result<Self, Self::Error> {
        RetryConfig::new(raw.max_retries, raw.base_ms, raw.factor, raw.jitter)
    }
}

impl RetryConfig {
    /// Create validated retry settings
    ///
    /// # Errors
    ///
    /// Returns an error if `max_retries` exceeds 10 or `factor` is below 1.0.
    pub fn new(max_retries: u32, base_ms: u64, factor: f64, jitter: bool) -> AppResult<Self> {
        if max_retries > MAX_RETRIES_LIMIT {
            return Err(AppError::Config(format!(
                "retry.max_retries cannot exceed {}, got {}",
                MAX_RETRIES_LIMIT, max_retries
            )));
        }
        if !factor.is_finite() || factor < 1.0 {
            return Err(AppError::Config(format!(
                "retry.factor must be a finite number >= 1.0, got {}",
                factor
            )));
        }
        Ok(Self {
            max_retries,
            base_ms,
            factor,
            jitter,
        })
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn base_ms(&self) -> u64 {
        self.base_ms
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn jitter(&self) -> bool {
        self.jitter
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_ms: DEFAULT_BASE_MS,
            factor: DEFAULT_FACTOR,
            jitter: true,
        }
    }
}

/// Outer cache settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_seconds: default_ttl_seconds(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_ttl_seconds() -> u64 {
    60
}

/// Remote backend settings
#[derive(Clone, Deserialize, Serialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Never written back out
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            temperature: default_temperature(),
            api_key: None,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let config: Self = toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
            path: path_display.clone(),
            source,
        })?;

        // Phase 3: Validate parsed config (provides contextual reason)
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(
                path = %path.as_ref().display(),
                "Config file not found, using defaults"
            );
            Ok(Self::default())
        }
    }

    /// Apply `OPENAI_API_KEY`, `OPENAI_MODEL` and `OPENAI_BASE_URL`
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply environment overrides from an arbitrary lookup
    ///
    /// The key fills `openai.api_key` only when the file left it unset.
    /// Model and base URL replace the configured value only while it is
    /// still the built-in default.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if self.openai.api_key.is_none()
            && let Some(key) = non_empty("OPENAI_API_KEY")
        {
            self.openai.api_key = Some(key.trim().to_string());
        }
        if self.adviser.model == DEFAULT_MODEL
            && let Some(model) = non_empty("OPENAI_MODEL")
        {
            self.adviser.model = model.trim().to_string();
        }
        if self.openai.base_url == DEFAULT_BASE_URL
            && let Some(url) = non_empty("OPENAI_BASE_URL")
        {
            self.openai.base_url = url.trim().to_string();
        }
    }

    /// Per-attempt timeout for remote generation
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.adviser.timeout_ms)
    }

    /// Retry policy built from `[retry]` and `adviser.timeout_ms`
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries(),
            self.retry.base_ms(),
            self.retry.factor(),
        )
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Invalid retry settings, using defaults");
            RetryPolicy::default()
        })
        .with_jitter(self.retry.jitter())
        .with_timeout(self.timeout())
    }

    /// Values used when a request leaves key, model or locale empty
    pub fn request_defaults(&self) -> RequestDefaults {
        RequestDefaults {
            api_key: self.openai.api_key.clone(),
            model: self.adviser.model.clone(),
            locale: self.adviser.locale.clone(),
        }
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()`, but can also be called
    /// explicitly when constructing Config via other means (e.g., in tests).
    pub fn validate(&self) -> AppResult<()> {
        if self.adviser.timeout_ms == 0 {
            return Err(AppError::Config(
                "adviser.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.adviser.timeout_ms > MAX_TIMEOUT_MS {
            return Err(AppError::Config(format!(
                "adviser.timeout_ms cannot exceed {} (5 minutes), got {}",
                MAX_TIMEOUT_MS, self.adviser.timeout_ms
            )));
        }
        if self.adviser.model.trim().is_empty() {
            return Err(AppError::Config(
                "adviser.model cannot be empty".to_string(),
            ));
        }
        if self.adviser.locale.trim().is_empty() {
            return Err(AppError::Config(
                "adviser.locale cannot be empty".to_string(),
            ));
        }

        if self.cache.ttl_seconds == 0 {
            return Err(AppError::Config(
                "cache.ttl_seconds must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.openai.temperature) {
            return Err(AppError::Config(format!(
                "openai.temperature must be between 0.0 and 2.0, got {}",
                self.openai.temperature
            )));
        }
        let base_url = self.openai.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(AppError::Config(format!(
                "openai.base_url must start with http:// or https://, got '{}'",
                self.openai.base_url
            )));
        }

        if self.server.host.trim().is_empty() {
            return Err(AppError::Config("server.host cannot be empty".to_string()));
        }

        let level = self.observability.log_level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(AppError::Config(format!(
                "observability.log_level must be one of {:?}, got '{}'",
                LOG_LEVELS, self.observability.log_level
            )));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        // Validate config before returning
        config.validate()?;
        Ok(config)
    }
}
