//! Deterministic fallback readings
//!
//! Used whenever backend output is unusable or the backend cannot be
//! reached. Output depends only on the cards, question and locale, and
//! always satisfies the reading schema.

use crate::domain::{Card, CardInterpretation, Position, Reading, is_japanese};

/// Synthesize a reading with one interpretation per card, in input order
pub fn fallback_reading(cards: &[Card], question: &str, locale: &str) -> Reading {
    let question = question.trim();
    if is_japanese(locale) {
        japanese(cards, question)
    } else {
        english(cards, question)
    }
}

fn japanese(cards: &[Card], question: &str) -> Reading {
    let topic = if question.is_empty() {
        "あなたの状況"
    } else {
        question
    };
    let cards = cards
        .iter()
        .map(|c| {
            let orientation = match c.position() {
                Position::Upright => "正位置",
                Position::Reversed => "逆位置",
            };
            CardInterpretation {
                card_name: c.name().to_string(),
                position: c.position(),
                meaning: format!(
                    "{}（{}）は「{}」について内省を促しています。",
                    c.name(),
                    orientation,
                    topic
                ),
                advice: Some("まずは小さな一歩から始めましょう。".to_string()),
            }
        })
        .collect();

    let subject = if question.is_empty() {
        "ご質問"
    } else {
        question
    };
    Reading {
        summary: format!(
            "簡易リーディング: {}について、焦らず小さな行動から始めましょう。",
            subject
        ),
        cards,
    }
}

fn english(cards: &[Card], question: &str) -> Reading {
    let topic = if question.is_empty() {
        "your situation"
    } else {
        question
    };
    let cards = cards
        .iter()
        .map(|c| CardInterpretation {
            card_name: c.name().to_string(),
            position: c.position(),
            meaning: format!(
                "{} ({}) suggests reflection about \"{}\".",
                c.name(),
                c.position(),
                topic
            ),
            advice: Some("Start with small, practical steps.".to_string()),
        })
        .collect();

    let subject = if question.is_empty() {
        "your question"
    } else {
        question
    };
    Reading {
        summary: format!("Tentative reading for {}: begin with a small step.", subject),
        cards,
    }
}
