use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::models::Notification;

/// JSON shape accepted from file and directory sources. Everything is
/// optional; timestamps may be RFC 3339 strings or epoch seconds.
#[derive(Debug, Default, Deserialize)]
pub struct IncomingNotification {
    id: Option<String>,
    #[serde(alias = "subject")]
    title: Option<String>,
    #[serde(alias = "body")]
    message: Option<String>,
    category: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(alias = "created_ts")]
    created_at: Option<Value>,
    timestamp: Option<Value>,
}

impl IncomingNotification {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Builds the notification. The payload's category wins over
    /// `default_category`; an unreadable timestamp falls back to `now`.
    pub fn into_notification(
        self,
        source: &str,
        default_category: Option<&str>,
        now: DateTime<Utc>,
    ) -> Notification {
        let mut notification = Notification::new(
            source,
            self.title.unwrap_or_else(|| "Notification".into()),
            self.message.unwrap_or_default(),
        );
        if let Some(id) = self.id {
            notification = notification.with_id(id);
        }
        if let Some(category) = self.category.or_else(|| default_category.map(str::to_string)) {
            notification = notification.with_category(category);
        }
        notification.created_at = self
            .created_at
            .as_ref()
            .or(self.timestamp.as_ref())
            .and_then(parse_timestamp)
            .unwrap_or(now);

        let mut tags = self.tags;
        if let Some(extra) = self
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get("tags"))
            .and_then(Value::as_array)
        {
            tags.extend(extra.iter().filter_map(Value::as_str).map(str::to_string));
        }
        notification.tags = tags;
        notification.enrich()
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(number) => from_epoch_seconds(number.as_f64()?),
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|parsed| parsed.with_timezone(&Utc))
            .ok()
            .or_else(|| from_epoch_seconds(text.trim().parse().ok()?)),
        _ => None,
    }
}

fn from_epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt((seconds * 1000.0).round() as i64).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::at;

    fn build(text: &str) -> Notification {
        IncomingNotification::parse(text)
            .unwrap()
            .into_notification("inbox", Some("email"), at(0))
    }

    #[test]
    fn epoch_seconds_are_accepted_under_every_field_name() {
        let expected = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(build(r#"{"timestamp": 1700000000.0}"#).created_at, expected);
        assert_eq!(build(r#"{"created_ts": 1700000000}"#).created_at, expected);
        assert_eq!(build(r#"{"created_at": "1700000000"}"#).created_at, expected);
        assert_eq!(
            build(r#"{"created_at": "2023-11-14T22:13:20Z"}"#).created_at,
            expected
        );
    }

    #[test]
    fn unreadable_timestamp_falls_back_to_now() {
        assert_eq!(build(r#"{"timestamp": "yesterday"}"#).created_at, at(0));
        assert_eq!(build(r#"{"timestamp": true}"#).created_at, at(0));
    }

    #[test]
    fn metadata_tags_are_merged_and_category_defaults() {
        let notification = build(r#"{"title": "Lunch plans", "tags": ["Team"], "metadata": {"tags": ["ops"]}}"#);
        assert_eq!(notification.category, "email");
        assert_eq!(notification.tags, vec!["email", "ops", "team"]);
        assert_eq!(notification.source, "inbox");

        let own = build(r#"{"category": "chat"}"#);
        assert_eq!(own.category, "chat");
        assert_eq!(own.title, "Notification");
    }
}
