#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use focusframe_lib::dispatch::Dispatcher;
use focusframe_lib::engine::Engine;
use focusframe_lib::error::DispatchError;
use focusframe_lib::models::Notification;
use focusframe_lib::report::{BroadcastSink, DecisionLog, EventSink};
use focusframe_lib::settings::EngineSettings;

/// Monday 2024-01-01 12:00:00 UTC plus `secs`.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
}

#[derive(Default)]
pub struct CollectingDispatcher {
    pub singles: Mutex<Vec<String>>,
    pub batches: Mutex<Vec<(String, Vec<String>)>>,
}

impl Dispatcher for CollectingDispatcher {
    fn deliver(&self, notification: &Notification) -> Result<(), DispatchError> {
        self.singles.lock().unwrap().push(notification.id.clone());
        Ok(())
    }

    fn deliver_batch(&self, batch_key: &str, notifications: &[Notification]) -> Result<(), DispatchError> {
        self.batches.lock().unwrap().push((
            batch_key.to_string(),
            notifications.iter().map(|n| n.id.clone()).collect(),
        ));
        Ok(())
    }
}

pub struct Harness {
    pub engine: Arc<Engine>,
    pub dispatcher: Arc<CollectingDispatcher>,
    pub events: Arc<BroadcastSink>,
}

pub fn settings(json: &str) -> EngineSettings {
    EngineSettings::from_json_str(json).unwrap()
}

pub fn harness(settings: &EngineSettings) -> Harness {
    let dispatcher = Arc::new(CollectingDispatcher::default());
    let events = Arc::new(BroadcastSink::new(256));
    let sinks: Vec<Arc<dyn EventSink>> = vec![events.clone()];
    let engine = Engine::new(settings, dispatcher.clone(), DecisionLog::new(sinks)).unwrap();
    Harness {
        engine: Arc::new(engine),
        dispatcher,
        events,
    }
}

pub fn notification(id: &str) -> Notification {
    Notification::new("test", format!("title {id}"), "body").with_id(id)
}
