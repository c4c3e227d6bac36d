//! Inbound request DTO and normalization
//!
//! Requests arrive from untrusted callers. Deserialization is lenient
//! (numbers and booleans are stringified, wrong-typed fields are treated as
//! absent) so that any well-formed JSON object yields a request, and
//! [`normalize`] then coerces every field to a safe value.

use crate::domain::{
    BackendPreference, Card, Credentials, DEFAULT_LOCALE, DEFAULT_MODEL, MAX_QUESTION_CHARS,
    NormalizedRequest, Position, Spread, truncate_chars,
};
use crate::result::Backend;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Caller-supplied card
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardInput {
    #[serde(default, deserialize_with = "loose_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub card_name: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub position: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub slot: Option<String>,
}

impl CardInput {
    pub fn new(name: impl Into<String>, position: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            position: Some(position.into()),
            ..Self::default()
        }
    }

    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = Some(slot.into());
        self
    }

    fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    fn into_card(self) -> Card {
        let name = non_blank(self.name)
            .or_else(|| non_blank(self.card_name))
            .unwrap_or_default();
        let position = self
            .position
            .as_deref()
            .map(Position::from_loose)
            .unwrap_or_default();
        Card::new(name, position, self.slot)
    }
}

/// Caller-supplied spread
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SpreadInput {
    #[serde(default, deserialize_with = "loose_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "loose_string_list")]
    pub slots: Option<Vec<String>>,
}

impl SpreadInput {
    pub fn new(name: impl Into<String>, slots: Vec<String>) -> Self {
        Self {
            name: Some(name.into()),
            slots: Some(slots),
        }
    }
}

/// Inbound call: every field optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdviseRequest {
    #[serde(default, deserialize_with = "loose_string")]
    pub question: Option<String>,
    #[serde(default, deserialize_with = "loose_cards")]
    pub cards: Option<Vec<CardInput>>,
    #[serde(default, deserialize_with = "loose_spread")]
    pub spread: Option<SpreadInput>,
    #[serde(default, deserialize_with = "loose_string")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub backend: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub api_key: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub locale: Option<String>,
}

/// Values used when the request leaves a field empty
#[derive(Debug, Clone)]
pub struct RequestDefaults {
    pub api_key: Option<String>,
    pub model: String,
    pub locale: String,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
        }
    }
}

/// Coerce an inbound request into a [`NormalizedRequest`]
pub fn normalize(request: AdviseRequest, defaults: &RequestDefaults) -> NormalizedRequest {
    let question = truncate_chars(
        request.question.as_deref().unwrap_or_default(),
        MAX_QUESTION_CHARS,
    );

    let cards = request
        .cards
        .unwrap_or_default()
        .into_iter()
        .map(CardInput::into_card)
        .collect();

    let spread = request.spread.map(|s| {
        Spread::new(s.name.unwrap_or_default(), s.slots.unwrap_or_default())
    });

    let key = non_blank(request.api_key)
        .or_else(|| non_blank(defaults.api_key.clone()))
        .unwrap_or_default();
    let model = non_blank(request.model)
        .or_else(|| non_blank(Some(defaults.model.clone())))
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let locale = non_blank(request.locale)
        .or_else(|| non_blank(Some(defaults.locale.clone())))
        .unwrap_or_else(|| DEFAULT_LOCALE.to_string());

    NormalizedRequest {
        question,
        cards,
        spread,
        user_id: non_blank(request.user_id),
        credentials: Credentials::new(key, model),
        locale,
    }
}

/// Resolve the backend for a call
///
/// An explicit preference wins; `Auto` picks the remote backend only when
/// a credential key is present.
pub fn select_backend(preference: BackendPreference, credentials: &Credentials) -> Backend {
    match preference {
        BackendPreference::Stub => Backend::Stub,
        BackendPreference::Remote => Backend::Remote,
        BackendPreference::Auto if credentials.has_key() => Backend::Remote,
        BackendPreference::Auto => Backend::Stub,
    }
}

/// Parse a caller-supplied backend name; unknown names mean `Auto`
pub fn parse_preference(raw: Option<&str>) -> Option<BackendPreference> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(pref) => Some(pref),
        Err(e) => {
            tracing::debug!(backend = %raw, error = %e, "Ignoring unknown backend preference");
            Some(BackendPreference::Auto)
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(scalar_to_string))
}

fn loose_string_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => Some(items.into_iter().filter_map(scalar_to_string).collect()),
        _ => None,
    })
}

fn loose_cards<'de, D>(deserializer: D) -> Result<Option<Vec<CardInput>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => Some(items.into_iter().map(CardInput::from_value).collect()),
        _ => None,
    })
}

fn loose_spread<'de, D>(deserializer: D) -> Result<Option<SpreadInput>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(v @ Value::Object(_)) => serde_json::from_value(v).ok(),
        _ => None,
    })
}
