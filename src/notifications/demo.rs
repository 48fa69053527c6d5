use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;

use crate::models::Notification;

use super::NotificationSource;

/// Most notifications a single poll emits after a long stall.
const MAX_CATCH_UP: usize = 10;

/// Emits a random configured payload every `interval`.
pub struct DemoNotificationSource {
    id: String,
    payloads: Vec<String>,
    interval: Duration,
    title_prefix: String,
    next_emit: Option<DateTime<Utc>>,
}

impl DemoNotificationSource {
    pub fn new(
        id: impl Into<String>,
        payloads: Vec<String>,
        interval_secs: u64,
        title_prefix: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            payloads,
            interval: Duration::seconds(interval_secs.clamp(1, 86_400) as i64),
            title_prefix: title_prefix.into(),
            next_emit: None,
        }
    }
}

impl NotificationSource for DemoNotificationSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn poll(&mut self, now: DateTime<Utc>) -> Vec<Notification> {
        if self.payloads.is_empty() {
            return Vec::new();
        }
        let next = *self.next_emit.get_or_insert(now + self.interval);
        if now < next {
            return Vec::new();
        }

        let mut rng = rand::thread_rng();
        let mut produced = Vec::new();
        let mut due = next;
        while due <= now && produced.len() < MAX_CATCH_UP {
            if let Some(message) = self.payloads.choose(&mut rng) {
                produced.push(
                    Notification::new(
                        self.id.clone(),
                        format!("{} Demo", self.title_prefix).trim().to_string(),
                        message.clone(),
                    )
                    .with_category("demo")
                    .enrich(),
                );
            }
            due += self.interval;
        }
        self.next_emit = Some(if due <= now { now + self.interval } else { due });
        produced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::at;

    #[test]
    fn emits_once_per_interval() {
        let mut source = DemoNotificationSource::new("demo", vec!["Stand-up in 5".into()], 30, "[FocusFrame]");
        assert!(source.poll(at(0)).is_empty());
        assert!(source.poll(at(29)).is_empty());

        let produced = source.poll(at(30));
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].title, "[FocusFrame] Demo");
        assert_eq!(produced[0].message, "Stand-up in 5");
        assert_eq!(produced[0].source, "demo");
        assert!(produced[0].tags.contains(&"demo".to_string()));

        assert!(source.poll(at(31)).is_empty());
        assert_eq!(source.poll(at(95)).len(), 2);
    }

    #[test]
    fn long_stalls_are_capped() {
        let mut source = DemoNotificationSource::new("demo", vec!["x".into()], 1, "");
        source.poll(at(0));
        assert_eq!(source.poll(at(10_000)).len(), MAX_CATCH_UP);
        assert!(source.poll(at(10_000)).is_empty());
        assert_eq!(source.poll(at(10_001)).len(), 1);
    }

    #[test]
    fn empty_payload_list_emits_nothing() {
        let mut source = DemoNotificationSource::new("demo", Vec::new(), 1, "");
        source.poll(at(0));
        assert!(source.poll(at(100)).is_empty());
    }
}
