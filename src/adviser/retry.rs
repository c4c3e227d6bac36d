//! Timeout and retry wrapper for remote generation
//!
//! Each attempt races the operation against a fixed timeout; losing the
//! race drops the in-flight future. Failed attempts are classified and
//! retried with exponential backoff until the attempt budget runs out.

use crate::client::{ClientError, ErrorKind};
use crate::telemetry::Logger;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default backoff before the first retry, in milliseconds
pub const DEFAULT_BASE_MS: u64 = 500;
/// Default backoff growth factor
pub const DEFAULT_FACTOR: f64 = 2.0;
/// Default per-attempt timeout, in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 20_000;
/// Upper bound for a single backoff, in milliseconds
pub const MAX_BACKOFF_MS: u64 = 30_000;
/// Upper bound for `max_retries`
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Error codes treated as transient
const RETRYABLE_CODES: [&str; 8] = [
    "429",
    "500",
    "502",
    "503",
    "504",
    "ETIMEDOUT",
    "ECONNRESET",
    "TIMEOUT",
];

/// Message fragments treated as transient (matched case-insensitively)
const RETRYABLE_MESSAGE_PATTERNS: [&str; 3] = ["rate", "timeout", "temporar"];

/// Retry and timeout settings
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_ms: u64,
    factor: f64,
    jitter: bool,
    timeout: Duration,
}

impl RetryPolicy {
    /// Create a retry policy
    ///
    /// # Errors
    /// Returns an error if `max_retries` exceeds [`MAX_RETRIES_LIMIT`] or
    /// `factor` is below 1.0 (or not finite).
    pub fn new(max_retries: u32, base_ms: u64, factor: f64) -> Result<Self, &'static str> {
        if max_retries > MAX_RETRIES_LIMIT {
            return Err("max_retries must be at most 10");
        }
        if !factor.is_finite() || factor < 1.0 {
            return Err("factor must be a finite number >= 1.0");
        }
        Ok(Self {
            max_retries,
            base_ms,
            factor,
            jitter: true,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        })
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts allowed (`max_retries + 1`)
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
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

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_ms: DEFAULT_BASE_MS,
            factor: DEFAULT_FACTOR,
            jitter: true,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

/// Backoff before retrying after failed attempt `attempt` (0-indexed)
///
/// `base_ms * factor^attempt`, rounded, capped at [`MAX_BACKOFF_MS`].
///
/// With the defaults (500ms, factor 2):
/// - after attempt 0: 500ms
/// - after attempt 1: 1000ms
/// - after attempt 2: 2000ms
pub fn calculate_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let raw = policy.base_ms as f64 * policy.factor.powi(exponent);
    if !raw.is_finite() || raw >= MAX_BACKOFF_MS as f64 {
        return MAX_BACKOFF_MS;
    }
    raw.round() as u64
}

/// Spread `ms` uniformly over `[ms - 20%, ms + 20%]`
pub fn apply_jitter(ms: u64) -> u64 {
    let spread = ms / 5;
    if spread == 0 {
        return ms;
    }
    let offset = rand::rng().random_range(0..=spread.saturating_mul(2));
    ms - spread + offset
}

/// Why a single attempt failed
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The attempt did not finish within the per-attempt timeout
    #[error("timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl AttemptError {
    /// Code used for classification
    pub fn code(&self) -> String {
        match self {
            Self::Client(e) => e.code(),
            Self::Timeout { .. } => "TIMEOUT".to_string(),
        }
    }
}

/// Whether a failed attempt should be retried
///
/// Fatal client errors never are. Otherwise an error is retryable when its
/// code is one of the transient codes or its message mentions rate
/// limiting, timeouts or temporary conditions.
pub fn is_retryable(error: &AttemptError) -> bool {
    if let AttemptError::Client(e) = error
        && e.kind() == ErrorKind::Fatal
    {
        return false;
    }

    let code = error.code();
    if RETRYABLE_CODES.contains(&code.as_str()) {
        return true;
    }

    let message = error.to_string().to_lowercase();
    RETRYABLE_MESSAGE_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
}

/// How one attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RetryableError,
    FatalError,
    Timeout,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RetryableError => "retryable_error",
            Self::FatalError => "fatal_error",
            Self::Timeout => "timeout",
        }
    }
}

/// Loop state threaded through [`retry_with_timeout`]
#[derive(Debug, Default)]
pub struct RetryState {
    /// Index of the attempt about to run (0-indexed)
    pub attempt: u32,
    pub last_error: Option<AttemptError>,
    pub outcomes: Vec<AttemptOutcome>,
}

/// Successful completion of [`retry_with_timeout`]
#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    pub outcomes: Vec<AttemptOutcome>,
}

impl<T> Retried<T> {
    pub fn attempts(&self) -> usize {
        self.outcomes.len()
    }
}

/// Terminal failure of [`retry_with_timeout`]
#[derive(Debug, thiserror::Error)]
#[error("{error} (after {} attempt(s))", .outcomes.len())]
pub struct RetryExhausted {
    pub error: AttemptError,
    pub outcomes: Vec<AttemptOutcome>,
}

impl RetryExhausted {
    pub fn attempts(&self) -> usize {
        self.outcomes.len()
    }
}

/// Run `operation` under the policy's timeout, retrying transient failures
///
/// `operation` receives the 0-indexed attempt number. Attempts are strictly
/// sequential; at most `policy.max_attempts()` are made.
///
/// # Errors
///
/// Returns the last attempt's error once it is not retryable or the
/// attempt budget is spent.
pub async fn retry_with_timeout<T, F, Fut>(
    policy: &RetryPolicy,
    logger: &dyn Logger,
    mut operation: F,
) -> Result<Retried<T>, RetryExhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let timeout_ms = u64::try_from(policy.timeout.as_millis()).unwrap_or(u64::MAX);
    let mut state = RetryState::default();

    loop {
        let error = match tokio::time::timeout(policy.timeout, operation(state.attempt)).await {
            Ok(Ok(value)) => {
                state.outcomes.push(AttemptOutcome::Success);
                return Ok(Retried {
                    value,
                    outcomes: state.outcomes,
                });
            }
            Ok(Err(e)) => AttemptError::Client(e),
            Err(_elapsed) => AttemptError::Timeout { timeout_ms },
        };

        let retryable = is_retryable(&error);
        state.outcomes.push(match (&error, retryable) {
            (AttemptError::Timeout { .. }, _) => AttemptOutcome::Timeout,
            (_, true) => AttemptOutcome::RetryableError,
            (_, false) => AttemptOutcome::FatalError,
        });

        let exhausted = state.attempt >= policy.max_retries;
        if exhausted || !retryable {
            logger.warn(
                "adviser_attempts_failed",
                &[
                    ("attempt", (state.attempt + 1).to_string()),
                    ("max_attempts", policy.max_attempts().to_string()),
                    ("code", error.code()),
                    ("retryable", retryable.to_string()),
                    ("error", error.to_string()),
                ],
            );
            return Err(RetryExhausted {
                error,
                outcomes: state.outcomes,
            });
        }

        let backoff = calculate_backoff(policy, state.attempt);
        let wait_ms = if policy.jitter {
            apply_jitter(backoff)
        } else {
            backoff
        };
        logger.info(
            "adviser_retry",
            &[
                ("attempt", (state.attempt + 1).to_string()),
                ("max_attempts", policy.max_attempts().to_string()),
                ("code", error.code()),
                ("backoff_ms", wait_ms.to_string()),
            ],
        );
        state.last_error = Some(error);

        tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        state.attempt += 1;
    }
}
