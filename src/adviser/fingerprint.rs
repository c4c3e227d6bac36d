//! Outer cache keys
//!
//! A fingerprint is a 31-multiplier rolling hash over the JSON encoding of
//! every field that affects the output. It is not collision resistant and
//! must not be used where an attacker benefits from a collision.

use crate::domain::{Card, NormalizedRequest, Spread};
use crate::result::Backend;
use serde::Serialize;

/// Prefix shared by all outer cache keys
pub const KEY_PREFIX: &str = "adv:";

#[derive(Serialize)]
struct FingerprintInput<'a> {
    q: &'a str,
    c: &'a [Card],
    s: Option<&'a Spread>,
    m: &'a str,
    l: &'a str,
    b: &'a str,
}

/// Cache key for a normalized request served by `backend`
///
/// Covers question, cards, spread, model, locale and backend. The user id
/// and credential key are deliberately excluded.
pub fn fingerprint(request: &NormalizedRequest, backend: Backend) -> String {
    let input = FingerprintInput {
        q: &request.question,
        c: &request.cards,
        s: request.spread.as_ref(),
        m: &request.credentials.model,
        l: &request.locale,
        b: backend.as_str(),
    };
    let data = serde_json::to_string(&input).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize fingerprint input");
        format!("{:?}|{:?}", request, backend)
    });
    format!("{}{:016x}", KEY_PREFIX, rolling_hash(&data))
}

/// `h = h * 31 + c` over the characters of `data`, wrapping on overflow
pub fn rolling_hash(data: &str) -> u64 {
    data.chars()
        .fold(0u64, |h, c| h.wrapping_mul(31).wrapping_add(u64::from(c)))
}
