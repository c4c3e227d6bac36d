//! Core value types: cards, spreads, readings and normalized requests
//!
//! Everything here is an immutable value once constructed. Constructors
//! coerce untrusted input to safe defaults rather than failing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name given to cards whose caller-supplied name is missing or blank
pub const UNKNOWN_CARD_NAME: &str = "Unknown";

/// Maximum question length in characters; longer questions are truncated
pub const MAX_QUESTION_CHARS: usize = 2000;

/// Default model requested from the remote backend
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default locale for generated and fallback text
pub const DEFAULT_LOCALE: &str = "ja";

/// Card orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    #[default]
    Upright,
    Reversed,
}

impl Position {
    /// Wire representation ("upright" / "reversed")
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upright => "upright",
            Self::Reversed => "reversed",
        }
    }

    /// Coerce an arbitrary caller-supplied string.
    ///
    /// Only "reversed" (case-insensitive, surrounding whitespace ignored)
    /// maps to `Reversed`; everything else is `Upright`.
    pub fn from_loose(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("reversed") {
            Self::Reversed
        } else {
            Self::Upright
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A drawn card
///
/// Fields are private so a `Card` can only be built through [`Card::new`],
/// which applies the name and slot coercions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Card {
    name: String,
    position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    slot: Option<String>,
}

impl Card {
    /// Create a card, defaulting a blank name to [`UNKNOWN_CARD_NAME`] and
    /// dropping a blank slot.
    pub fn new(name: impl Into<String>, position: Position, slot: Option<String>) -> Self {
        let name = name.into();
        let name = if name.trim().is_empty() {
            UNKNOWN_CARD_NAME.to_string()
        } else {
            name
        };
        let slot = slot.filter(|s| !s.trim().is_empty());
        Self {
            name,
            position,
            slot,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn slot(&self) -> Option<&str> {
        self.slot.as_deref()
    }
}

/// Semantic layout of the drawn cards (e.g. past / present / future)
///
/// No relationship between `slots` and the number of cards is enforced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Spread {
    pub name: String,
    #[serde(default)]
    pub slots: Vec<String>,
}

impl Spread {
    pub fn new(name: impl Into<String>, slots: Vec<String>) -> Self {
        Self {
            name: name.into(),
            slots,
        }
    }
}

/// Interpretation of a single card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardInterpretation {
    pub card_name: String,
    pub position: Position,
    pub meaning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advice: Option<String>,
}

/// The structured interpretation payload returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    pub summary: String,
    pub cards: Vec<CardInterpretation>,
}

/// Backend the caller asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Remote when a credential key is present, stub otherwise
    #[default]
    Auto,
    Stub,
    #[serde(rename = "openai", alias = "remote")]
    Remote,
}

impl FromStr for BackendPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "stub" => Ok(Self::Stub),
            "openai" | "remote" => Ok(Self::Remote),
            other => Err(format!(
                "unknown backend '{}': expected one of auto, stub, openai",
                other
            )),
        }
    }
}

/// Credentials for the remote backend
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub key: String,
    pub model: String,
}

impl Credentials {
    pub fn new(key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model: model.into(),
        }
    }

    /// True when a non-empty key is present
    pub fn has_key(&self) -> bool {
        !self.key.trim().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = if self.has_key() { "<redacted>" } else { "<empty>" };
        f.debug_struct("Credentials")
            .field("key", &key)
            .field("model", &self.model)
            .finish()
    }
}

/// A request after normalization; created once per call and never mutated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRequest {
    pub question: String,
    pub cards: Vec<Card>,
    pub spread: Option<Spread>,
    pub user_id: Option<String>,
    pub credentials: Credentials,
    pub locale: String,
}

/// True for locales whose generated and fallback text should be Japanese
pub fn is_japanese(locale: &str) -> bool {
    let locale = locale.trim().to_ascii_lowercase();
    locale == "ja" || locale.starts_with("ja-") || locale.starts_with("ja_")
}

/// Truncate to at most `max_chars` characters without splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
