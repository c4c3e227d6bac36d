//! Deterministic offline client
//!
//! Reads the input block back out of the prompt and answers with a
//! schema-valid reading (or deliberately invalid text). Used for offline
//! runs, demos and tests.

use super::{ClientError, TextGenerator};
use crate::domain::UNKNOWN_CARD_NAME;
use crate::prompt::extract_input;
use crate::result::Backend;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;

/// Text returned in [`StubMode::Invalid`]
pub const INVALID_OUTPUT: &str = "This is not JSON";

/// What the stub returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StubMode {
    /// A schema-valid reading covering every input card
    #[default]
    Valid,
    /// Plain text that is not JSON
    Invalid,
}

type Template = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Offline text generator
#[derive(Clone, Default)]
pub struct StubClient {
    mode: StubMode,
    template: Option<Template>,
}

impl fmt::Debug for StubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StubClient")
            .field("mode", &self.mode)
            .field("template", &self.template.is_some())
            .finish()
    }
}

impl StubClient {
    pub fn new(mode: StubMode) -> Self {
        Self {
            mode,
            template: None,
        }
    }

    /// Replace the canned output with a function of the prompt
    pub fn with_template<F>(template: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            mode: StubMode::Valid,
            template: Some(Arc::new(template)),
        }
    }

    pub fn mode(&self) -> StubMode {
        self.mode
    }
}

#[async_trait]
impl TextGenerator for StubClient {
    async fn generate(&self, prompt: &str) -> Result<String, ClientError> {
        if let Some(template) = &self.template {
            return Ok(template(prompt));
        }
        match self.mode {
            StubMode::Invalid => Ok(INVALID_OUTPUT.to_string()),
            StubMode::Valid => Ok(canned_reading(prompt)),
        }
    }

    fn backend(&self) -> Backend {
        Backend::Stub
    }
}

/// Build a valid reading from the prompt's input block
///
/// A prompt without a parsable input block yields a reading with no cards.
fn canned_reading(prompt: &str) -> String {
    let input: Value = extract_input(prompt)
        .and_then(|block| serde_json::from_str(block).ok())
        .unwrap_or(Value::Null);

    let question = input
        .get("question")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    let topic = if question.is_empty() {
        "your situation"
    } else {
        question
    };

    let cards: Vec<Value> = input
        .get("cards")
        .and_then(Value::as_array)
        .map(|cards| {
            cards
                .iter()
                .map(|card| {
                    let name = card
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or(UNKNOWN_CARD_NAME);
                    let position = match card.get("position").and_then(Value::as_str) {
                        Some("reversed") => "reversed",
                        _ => "upright",
                    };
                    json!({
                        "cardName": name,
                        "position": position,
                        "meaning": format!("{} ({}) suggests reflection about \"{}\".", name, position, topic),
                        "advice": "Consider small, practical next steps.",
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let summary = if question.is_empty() {
        "A balanced view on your question.".to_string()
    } else {
        format!("A balanced view on: {}.", question)
    };

    json!({ "summary": summary, "cards": cards }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Card, Position};
    use crate::parser::validate_reading;
    use crate::prompt::build_prompt;

    fn prompt() -> String {
        build_prompt(
            "Should I move?",
            &[
                Card::new("The Fool", Position::Upright, None),
                Card::new("Death", Position::Reversed, Some("outcome".to_string())),
            ],
            None,
        )
    }

    #[tokio::test]
    async fn test_valid_mode_covers_every_card_in_order() {
        let raw = StubClient::new(StubMode::Valid)
            .generate(&prompt())
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();

        assert!(validate_reading(&value).is_empty());
        assert_eq!(value["cards"][0]["cardName"], "The Fool");
        assert_eq!(value["cards"][1]["cardName"], "Death");
        assert_eq!(value["cards"][1]["position"], "reversed");
        assert!(value["summary"].as_str().unwrap().contains("Should I move?"));
    }

    #[tokio::test]
    async fn test_invalid_mode_returns_non_json() {
        let raw = StubClient::new(StubMode::Invalid)
            .generate(&prompt())
            .await
            .unwrap();
        assert_eq!(raw, INVALID_OUTPUT);
        assert!(serde_json::from_str::<Value>(&raw).is_err());
    }

    #[tokio::test]
    async fn test_foreign_prompt_yields_empty_reading() {
        let raw = StubClient::default().generate("hello").await.unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert!(validate_reading(&value).is_empty());
        assert_eq!(value["cards"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn test_template_overrides_output() {
        let client = StubClient::with_template(|p| format!("len={}", p.len()));
        let raw = client.generate("abcd").await.unwrap();
        assert_eq!(raw, "len=4");
        assert_eq!(client.backend(), Backend::Stub);
    }
}
