//! Output parsing and schema validation for backend text
//!
//! Backend output is untrusted free text. [`parse_reading`] accepts it only
//! when it is strict JSON matching the reading schema; anything else is
//! replaced by the deterministic fallback from [`fallback`], so callers
//! always receive a well-formed [`Reading`].

pub mod fallback;

#[cfg(test)]
mod fallback_tests;

pub use fallback::fallback_reading;

use crate::domain::{Card, Reading};
use crate::result::ReasonTag;
use serde_json::Value;
use std::fmt;

/// Inputs the fallback is templated from
#[derive(Debug, Clone, Copy)]
pub struct ReadingContext<'a> {
    pub cards: &'a [Card],
    pub question: &'a str,
    pub locale: &'a str,
}

/// Why backend output was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    /// Not syntactically valid JSON
    NonJson,
    /// Valid JSON that does not match the reading schema
    SchemaMismatch,
}

impl ParseFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonJson => "non_json",
            Self::SchemaMismatch => "schema_mismatch",
        }
    }
}

impl From<ParseFailure> for ReasonTag {
    fn from(failure: ParseFailure) -> Self {
        match failure {
            ParseFailure::NonJson => ReasonTag::NonJson,
            ParseFailure::SchemaMismatch => ReasonTag::SchemaMismatch,
        }
    }
}

/// A single schema violation, addressed by a JSONPath-like location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub path: String,
    pub message: &'static str,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.path, self.message)
    }
}

/// Outcome of [`parse_reading`]
///
/// `reading` is always usable: the parsed reading when `valid`, otherwise
/// the fallback. `violations` lists every schema problem found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    pub reading: Reading,
    pub valid: bool,
    pub reason: Option<ParseFailure>,
    pub violations: Vec<SchemaViolation>,
}

/// Parse and validate backend text against the reading schema
pub fn parse_reading(raw: &str, ctx: ReadingContext<'_>) -> ParseOutcome {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(
                error = %e,
                raw_length = raw.len(),
                "Backend output is not JSON, using fallback reading"
            );
            return rejected(ctx, ParseFailure::NonJson, Vec::new());
        }
    };

    let mut violations = validate_reading(&value);
    let returned = value
        .get("cards")
        .and_then(Value::as_array)
        .map(Vec::len);
    if let Some(returned) = returned
        && returned != ctx.cards.len()
    {
        tracing::debug!(
            expected = ctx.cards.len(),
            returned,
            "Backend output card count does not match input"
        );
        violations.push(violation("$.cards", "must have one entry per input card"));
    }
    if !violations.is_empty() {
        tracing::debug!(
            violation_count = violations.len(),
            first_violation = %violations[0],
            "Backend output does not match reading schema, using fallback reading"
        );
        return rejected(ctx, ParseFailure::SchemaMismatch, violations);
    }

    match serde_json::from_value::<Reading>(value) {
        Ok(reading) => ParseOutcome {
            reading,
            valid: true,
            reason: None,
            violations: Vec::new(),
        },
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Validated output failed to deserialize as a reading"
            );
            rejected(
                ctx,
                ParseFailure::SchemaMismatch,
                vec![SchemaViolation {
                    path: "$".to_string(),
                    message: "must deserialize as a reading",
                }],
            )
        }
    }
}

fn rejected(
    ctx: ReadingContext<'_>,
    reason: ParseFailure,
    violations: Vec<SchemaViolation>,
) -> ParseOutcome {
    ParseOutcome {
        reading: fallback_reading(ctx.cards, ctx.question, ctx.locale),
        valid: false,
        reason: Some(reason),
        violations,
    }
}

/// Check a JSON value against the reading schema, collecting all violations
pub fn validate_reading(value: &Value) -> Vec<SchemaViolation> {
    let mut violations = Vec::new();

    let Some(obj) = value.as_object() else {
        violations.push(violation("$", "must be object"));
        return violations;
    };

    if !obj.get("summary").is_some_and(Value::is_string) {
        violations.push(violation("$.summary", "must be string"));
    }

    match obj.get("cards").and_then(Value::as_array) {
        None => violations.push(violation("$.cards", "must be array")),
        Some(cards) => {
            for (i, card) in cards.iter().enumerate() {
                validate_card(card, &format!("$.cards[{}]", i), &mut violations);
            }
        }
    }

    violations
}

fn validate_card(card: &Value, base: &str, violations: &mut Vec<SchemaViolation>) {
    let Some(card) = card.as_object() else {
        violations.push(violation(base, "must be object"));
        return;
    };

    if !card.get("cardName").is_some_and(Value::is_string) {
        violations.push(violation(&format!("{}.cardName", base), "must be string"));
    }

    let position_ok = matches!(
        card.get("position").and_then(Value::as_str),
        Some("upright") | Some("reversed")
    );
    if !position_ok {
        violations.push(violation(
            &format!("{}.position", base),
            "must be 'upright'|'reversed'",
        ));
    }

    if !card.get("meaning").is_some_and(Value::is_string) {
        violations.push(violation(&format!("{}.meaning", base), "must be string"));
    }

    if let Some(advice) = card.get("advice") {
        if !advice.is_string() {
            violations.push(violation(
                &format!("{}.advice", base),
                "must be string if present",
            ));
        }
    }
}

fn violation(path: &str, message: &'static str) -> SchemaViolation {
    SchemaViolation {
        path: path.to_string(),
        message,
    }
}
