//! Decision log: fans every snapshot, decision and notification lifecycle event
//! out to the configured sinks. Sinks are fire-and-forget; a slow or failing
//! sink never blocks the engine or loses the decision itself.

pub mod sinks;

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::context::ContextSnapshot;
use crate::rules::Decision;

pub use sinks::{BroadcastSink, LogSink};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEventKind {
    Received,
    Delivered,
    Deferred,
    Batched,
    Released,
    Canceled,
    DispatchFailed,
    PendingAtShutdown,
    Recovered,
    Feedback,
}

impl NotificationEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationEventKind::Received => "received",
            NotificationEventKind::Delivered => "delivered",
            NotificationEventKind::Deferred => "deferred",
            NotificationEventKind::Batched => "batched",
            NotificationEventKind::Released => "released",
            NotificationEventKind::Canceled => "canceled",
            NotificationEventKind::DispatchFailed => "dispatch_failed",
            NotificationEventKind::PendingAtShutdown => "pending_at_shutdown",
            NotificationEventKind::Recovered => "recovered",
            NotificationEventKind::Feedback => "feedback",
        }
    }
}

/// What the user did with a delivered notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FeedbackOutcome {
    #[serde(rename = "user_opened")]
    Opened,
    #[serde(rename = "user_snoozed")]
    Snoozed,
    #[serde(rename = "user_dismissed")]
    Dismissed,
    #[serde(rename = "user_ignored")]
    Ignored,
}

impl FeedbackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackOutcome::Opened => "user_opened",
            FeedbackOutcome::Snoozed => "user_snoozed",
            FeedbackOutcome::Dismissed => "user_dismissed",
            FeedbackOutcome::Ignored => "user_ignored",
        }
    }
}

impl FromStr for FeedbackOutcome {
    type Err = String;

    /// Accepts `opened`, `open`, `o` or the stored `user_opened` form, and the
    /// same for the other outcomes.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lower = value.trim().to_ascii_lowercase();
        match lower.strip_prefix("user_").unwrap_or(&lower) {
            "o" | "open" | "opened" => Ok(FeedbackOutcome::Opened),
            "s" | "snooze" | "snoozed" => Ok(FeedbackOutcome::Snoozed),
            "d" | "dismiss" | "dismissed" => Ok(FeedbackOutcome::Dismissed),
            "i" | "ignore" | "ignored" => Ok(FeedbackOutcome::Ignored),
            _ => Err(format!(
                "unknown feedback '{value}' (expected opened, snoozed, dismissed or ignored)"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub id: String,
    pub kind: NotificationEventKind,
    pub detail: Value,
    pub at: DateTime<Utc>,
}

impl NotificationEvent {
    /// Feedback on a notification. `latency_secs` is the time since it was
    /// delivered, when known.
    pub fn feedback(
        id: impl Into<String>,
        outcome: FeedbackOutcome,
        latency_secs: Option<f64>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: NotificationEventKind::Feedback,
            detail: json!({ "outcome": outcome, "latencySeconds": latency_secs }),
            at,
        }
    }
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    Snapshot(Arc<ContextSnapshot>),
    Decision(Decision),
    Notification(NotificationEvent),
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::Snapshot(_) => "snapshot",
            EngineEvent::Decision(_) => "decision",
            EngineEvent::Notification(event) => event.kind.as_str(),
        }
    }

    pub fn notification_id(&self) -> Option<&str> {
        match self {
            EngineEvent::Snapshot(_) => None,
            EngineEvent::Decision(decision) => Some(&decision.notification_id),
            EngineEvent::Notification(event) => Some(&event.id),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            EngineEvent::Snapshot(snapshot) => snapshot.timestamp,
            EngineEvent::Decision(decision) => decision.decided_at,
            EngineEvent::Notification(event) => event.at,
        }
    }

    /// JSON payload of the event, as stored by persistent sinks.
    pub fn detail(&self) -> Value {
        let value = match self {
            EngineEvent::Snapshot(snapshot) => serde_json::to_value(&**snapshot),
            EngineEvent::Decision(decision) => serde_json::to_value(decision),
            EngineEvent::Notification(event) => return event.detail.clone(),
        };
        value.unwrap_or(Value::Null)
    }
}

pub trait EventSink: Send + Sync {
    fn record(&self, event: &EngineEvent);
}

#[derive(Clone, Default)]
pub struct DecisionLog {
    sinks: Arc<Vec<Arc<dyn EventSink>>>,
}

impl DecisionLog {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(sinks),
        }
    }

    pub fn emit(&self, event: EngineEvent) {
        for sink in self.sinks.iter() {
            sink.record(&event);
        }
    }

    pub fn notification(&self, id: &str, kind: NotificationEventKind, detail: Value) {
        self.emit(EngineEvent::Notification(NotificationEvent {
            id: id.to_string(),
            kind,
            detail,
            at: Utc::now(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AppCategory;
    use crate::signals::AffectLabel;
    use crate::test_support::{at, snapshot};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl EventSink for Recorder {
        fn record(&self, event: &EngineEvent) {
            self.0.lock().unwrap().push(event.kind().to_string());
        }
    }

    #[test]
    fn every_sink_sees_every_event() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let log = DecisionLog::new(vec![first.clone(), second.clone()]);

        log.emit(EngineEvent::Snapshot(Arc::new(snapshot(
            AffectLabel::Neutral,
            0.7,
            AppCategory::Focus,
        ))));
        log.notification("n1", NotificationEventKind::DispatchFailed, json!({"error": "x"}));

        for sink in [first, second] {
            assert_eq!(*sink.0.lock().unwrap(), vec!["snapshot", "dispatch_failed"]);
        }
    }

    #[test]
    fn snapshot_detail_is_camel_case_json() {
        let event = EngineEvent::Snapshot(Arc::new(snapshot(
            AffectLabel::Sad,
            0.8,
            AppCategory::Casual,
        )));
        let detail = event.detail();
        assert_eq!(detail["appCategory"], "casual");
        assert_eq!(detail["affect"]["label"], "sad");
        assert_eq!(event.notification_id(), None);
    }

    #[test]
    fn feedback_outcomes_parse_short_and_stored_forms() {
        assert_eq!("o".parse::<FeedbackOutcome>(), Ok(FeedbackOutcome::Opened));
        assert_eq!("Snoozed".parse::<FeedbackOutcome>(), Ok(FeedbackOutcome::Snoozed));
        assert_eq!("user_dismissed".parse::<FeedbackOutcome>(), Ok(FeedbackOutcome::Dismissed));
        assert_eq!("ignore".parse::<FeedbackOutcome>(), Ok(FeedbackOutcome::Ignored));
        assert!("liked".parse::<FeedbackOutcome>().is_err());
    }

    #[test]
    fn feedback_event_carries_outcome_and_latency() {
        let event = EngineEvent::Notification(NotificationEvent::feedback(
            "n1",
            FeedbackOutcome::Snoozed,
            Some(4.5),
            at(10),
        ));
        assert_eq!(event.kind(), "feedback");
        assert_eq!(event.timestamp(), at(10));
        assert_eq!(event.detail()["outcome"], "user_snoozed");
        assert_eq!(event.detail()["latencySeconds"], 4.5);
    }
}
