use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_CATEGORY: &str = "general";

const TAG_KEYWORDS: &[(&str, &[&str])] = &[
    ("urgent", &["urgent", "asap", "immediately", "critical"]),
    ("meeting", &["meeting", "standup", "sync", "catch-up", "call"]),
    ("reminder", &["reminder", "remember", "don't forget"]),
    ("deployment", &["deploy", "release", "build"]),
    ("social", &["party", "dinner", "game", "hangout"]),
    ("task", &["task", "todo", "action", "follow-up"]),
];

const POSITIVE_WORDS: &[&str] = &[
    "great", "good", "awesome", "excellent", "happy", "success", "thanks", "congrats", "progress",
    "complete",
];

const NEGATIVE_WORDS: &[&str] = &[
    "urgent", "fail", "issue", "problem", "delay", "blocked", "critical", "error", "broken", "sad",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(default)]
    pub source: String,
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Word-list score in [-1, 1]; 0 when no scored word appears.
    #[serde(default)]
    pub sentiment: f64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl Notification {
    pub fn new(source: impl Into<String>, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            title: title.into(),
            message: message.into(),
            category: default_category(),
            tags: Vec::new(),
            sentiment: 0.0,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Derives tags from keywords in the title and message, plus the category,
    /// and scores the sentiment of the same text. Existing tags are kept; the
    /// result is lowercase, sorted and deduplicated.
    pub fn enrich(mut self) -> Self {
        let text = format!("{} {}", self.title, self.message).to_lowercase();
        self.sentiment = sentiment_score(&text);
        let mut tags: BTreeSet<String> = self.tags.iter().map(|t| t.to_lowercase()).collect();
        for (tag, keywords) in TAG_KEYWORDS {
            if keywords.iter().any(|keyword| text.contains(keyword)) {
                tags.insert((*tag).to_string());
            }
        }
        if !self.category.is_empty() {
            tags.insert(self.category.to_lowercase());
        }
        self.tags = tags.into_iter().collect();
        self
    }
}

fn sentiment_score(text: &str) -> f64 {
    let (mut positive, mut negative) = (0u32, 0u32);
    for word in text
        .split(|c: char| !(c.is_ascii_alphabetic() || c == '\''))
        .filter(|word| !word.is_empty())
    {
        let word = word.to_ascii_lowercase();
        if POSITIVE_WORDS.contains(&word.as_str()) {
            positive += 1;
        } else if NEGATIVE_WORDS.contains(&word.as_str()) {
            negative += 1;
        }
    }
    let total = positive + negative;
    if total == 0 {
        return 0.0;
    }
    (f64::from(positive) - f64::from(negative)) / f64::from(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_notifications_get_unique_ids_and_default_category() {
        let a = Notification::new("demo", "hello", "");
        let b = Notification::new("demo", "hello", "");
        assert_ne!(a.id, b.id);
        assert_eq!(a.category, DEFAULT_CATEGORY);
    }

    #[test]
    fn enrich_tags_from_keywords_and_category() {
        let note = Notification::new("mail", "Standup moved", "URGENT: deploy blocked")
            .with_category("Email")
            .enrich();
        assert_eq!(note.tags, vec!["deployment", "email", "meeting", "urgent"]);
        assert_eq!(note.sentiment, -1.0);
    }

    #[test]
    fn sentiment_balances_positive_and_negative_words() {
        let mixed = Notification::new("chat", "Great progress", "one small issue").enrich();
        assert!((mixed.sentiment - 1.0 / 3.0).abs() < 1e-9);

        let neutral = Notification::new("chat", "Lunch?", "12:30 at the usual place").enrich();
        assert_eq!(neutral.sentiment, 0.0);

        // Whole words only.
        let partial = Notification::new("chat", "Goodbye", "errors everywhere").enrich();
        assert_eq!(partial.sentiment, 0.0);
    }

    #[test]
    fn minimal_json_fills_defaults() {
        let note: Notification = serde_json::from_str(r#"{ "id": "n1", "title": "Hi" }"#).unwrap();
        assert_eq!(note.category, "general");
        assert!(note.tags.is_empty());
        assert!(note.message.is_empty());
        assert_eq!(note.sentiment, 0.0);
    }
}
