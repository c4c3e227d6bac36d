//! Result envelope returned by both generation layers
//!
//! A [`GenerationResult`] is either a reading (successful or fallback; the
//! two differ only in `meta`) or a structured invalid-input notice.

use crate::domain::Reading;
use serde::{Deserialize, Serialize};

/// Backend that actually produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    #[serde(rename = "stub")]
    Stub,
    #[serde(rename = "openai")]
    Remote,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stub => "stub",
            Self::Remote => "openai",
        }
    }
}

/// Why a result is not a plain backend success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonTag {
    /// Backend text was not JSON
    #[serde(rename = "non_json")]
    NonJson,
    /// Backend JSON did not match the reading schema
    #[serde(rename = "schema_mismatch")]
    SchemaMismatch,
    /// Remote backend requested but no client capability is wired
    #[serde(rename = "OPENAI_NOT_AVAILABLE")]
    OpenaiNotAvailable,
    /// Remote backend failed after retries (or failed fatally)
    #[serde(rename = "OPENAI_ERROR")]
    OpenaiError,
}

impl ReasonTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonJson => "non_json",
            Self::SchemaMismatch => "schema_mismatch",
            Self::OpenaiNotAvailable => "OPENAI_NOT_AVAILABLE",
            Self::OpenaiError => "OPENAI_ERROR",
        }
    }
}

/// Machine-readable code of an invalid result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoCards,
}

/// Structured failure reported to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

/// Provenance and accounting for a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMeta {
    pub inference_id: String,
    pub backend: Backend,
    pub duration_ms: u64,
    #[serde(default)]
    pub approx_tokens: u64,
    pub cached: bool,
    #[serde(default)]
    pub reason: Option<ReasonTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ResultMeta {
    pub fn new(inference_id: impl Into<String>, backend: Backend) -> Self {
        Self {
            inference_id: inference_id.into(),
            backend,
            duration_ms: 0,
            approx_tokens: 0,
            cached: false,
            reason: None,
            user_id: None,
        }
    }
}

/// A reading, successful or substituted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingResult {
    pub valid: bool,
    pub reading: Reading,
    pub meta: ResultMeta,
}

/// An invalid-input notice; `valid` is always false
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidResult {
    valid: bool,
    pub error: ErrorInfo,
    pub meta: ResultMeta,
}

impl InvalidResult {
    pub fn new(error: ErrorInfo, meta: ResultMeta) -> Self {
        Self {
            valid: false,
            error,
            meta,
        }
    }
}

/// Tagged union returned by every generation entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerationResult {
    Reading(ReadingResult),
    Invalid(InvalidResult),
}

impl GenerationResult {
    pub fn reading_result(valid: bool, reading: Reading, meta: ResultMeta) -> Self {
        Self::Reading(ReadingResult {
            valid,
            reading,
            meta,
        })
    }

    pub fn invalid(error: ErrorInfo, meta: ResultMeta) -> Self {
        Self::Invalid(InvalidResult::new(error, meta))
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Self::Reading(r) => r.valid,
            Self::Invalid(_) => false,
        }
    }

    pub fn reading(&self) -> Option<&Reading> {
        match self {
            Self::Reading(r) => Some(&r.reading),
            Self::Invalid(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Reading(_) => None,
            Self::Invalid(i) => Some(&i.error),
        }
    }

    pub fn meta(&self) -> &ResultMeta {
        match self {
            Self::Reading(r) => &r.meta,
            Self::Invalid(i) => &i.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ResultMeta {
        match self {
            Self::Reading(r) => &mut r.meta,
            Self::Invalid(i) => &mut i.meta,
        }
    }

    /// Copy of this result with `meta.cached` set as given
    pub fn with_cached(mut self, cached: bool) -> Self {
        self.meta_mut().cached = cached;
        self
    }
}
