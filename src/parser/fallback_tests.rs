//! Tests for fallback_reading

use super::*;
use crate::domain::Position;
use proptest::prelude::*;

fn cards() -> Vec<Card> {
    vec![
        Card::new("The Fool", Position::Upright, Some("past".to_string())),
        Card::new("The Hermit", Position::Reversed, Some("present".to_string())),
    ]
}

#[test]
fn test_fallback_has_one_entry_per_card_in_order() {
    let reading = fallback_reading(&cards(), "Will it go well?", "en");
    assert_eq!(reading.cards.len(), 2);
    assert_eq!(reading.cards[0].card_name, "The Fool");
    assert_eq!(reading.cards[0].position, Position::Upright);
    assert_eq!(reading.cards[1].card_name, "The Hermit");
    assert_eq!(reading.cards[1].position, Position::Reversed);
}

#[test]
fn test_fallback_english_mentions_question() {
    let reading = fallback_reading(&cards(), "Will it go well?", "en");
    assert!(reading.summary.contains("Will it go well?"));
    assert!(reading.cards[1].meaning.contains("(reversed)"));
}

#[test]
fn test_fallback_japanese_locale() {
    let reading = fallback_reading(&cards(), "仕事は好転する？", "ja");
    assert!(reading.summary.contains("仕事は好転する？"));
    assert!(reading.cards[1].meaning.contains("逆位置"));
    assert!(reading.cards[0].meaning.contains("正位置"));
}

#[test]
fn test_fallback_blank_question_uses_placeholder() {
    let reading = fallback_reading(&cards(), "   ", "en");
    assert!(reading.summary.contains("your question"));
    assert!(reading.cards[0].meaning.contains("your situation"));
}

#[test]
fn test_fallback_is_deterministic() {
    assert_eq!(
        fallback_reading(&cards(), "Q", "ja"),
        fallback_reading(&cards(), "Q", "ja")
    );
}

#[test]
fn test_fallback_with_no_cards() {
    let reading = fallback_reading(&[], "Q", "en");
    assert!(reading.cards.is_empty());
    assert!(!reading.summary.is_empty());
}

proptest! {
    #[test]
    fn prop_fallback_always_passes_validation(
        names in proptest::collection::vec(".{0,24}", 0..6),
        reversed in proptest::collection::vec(any::<bool>(), 6),
        question in ".{0,80}",
        japanese in any::<bool>(),
    ) {
        let cards: Vec<Card> = names
            .iter()
            .zip(reversed.iter())
            .map(|(n, r)| {
                let position = if *r { Position::Reversed } else { Position::Upright };
                Card::new(n.clone(), position, None)
            })
            .collect();
        let locale = if japanese { "ja" } else { "en" };

        let reading = fallback_reading(&cards, &question, locale);
        let value = serde_json::to_value(&reading).unwrap();

        prop_assert!(validate_reading(&value).is_empty());
        prop_assert_eq!(reading.cards.len(), cards.len());
    }
}
