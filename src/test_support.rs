//! Fixtures shared by unit tests.

use std::sync::Mutex;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::context::{AppCategory, ContextSnapshot, SmoothedAffect, TimeOfDay};
use crate::dispatch::Dispatcher;
use crate::error::DispatchError;
use crate::models::Notification;
use crate::signals::{AffectLabel, SystemMetrics};

/// Monday 2024-01-01 12:00:00 UTC plus `secs`.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
}

pub fn snapshot(label: AffectLabel, confidence: f64, category: AppCategory) -> ContextSnapshot {
    ContextSnapshot {
        timestamp: at(0),
        affect: SmoothedAffect {
            label,
            confidence,
            ema_confidence: confidence,
            history: vec![label],
        },
        active_app: "test-app".into(),
        app_category: category,
        calendar_busy: false,
        calendar_event: None,
        time_of_day: TimeOfDay::Afternoon,
        is_work_hours: true,
        system_metrics: SystemMetrics::default(),
    }
}

pub fn notification(id: &str) -> Notification {
    Notification::new("test", format!("title {id}"), "body").with_id(id)
}

/// Records what was dispatched; `fail` makes every call return an error.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub singles: Mutex<Vec<String>>,
    pub batches: Mutex<Vec<(String, Vec<String>)>>,
    pub fail: bool,
}

impl Dispatcher for RecordingDispatcher {
    fn deliver(&self, notification: &Notification) -> Result<(), DispatchError> {
        if self.fail {
            return Err(DispatchError("offline".into()));
        }
        self.singles.lock().unwrap().push(notification.id.clone());
        Ok(())
    }

    fn deliver_batch(&self, batch_key: &str, notifications: &[Notification]) -> Result<(), DispatchError> {
        if self.fail {
            return Err(DispatchError("offline".into()));
        }
        self.batches.lock().unwrap().push((
            batch_key.to_string(),
            notifications.iter().map(|n| n.id.clone()).collect(),
        ));
        Ok(())
    }
}
