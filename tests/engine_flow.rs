mod common;

use std::sync::Arc;

use chrono::Utc;
use focusframe_lib::engine::{Collaborators, EngineController};
use focusframe_lib::error::SignalUnavailable;
use focusframe_lib::report::{EngineEvent, FeedbackOutcome};
use focusframe_lib::rules::{DecisionPolicy, Rule, RuleAction};
use focusframe_lib::scheduler::CancelOutcome;
use focusframe_lib::signals::{AffectLabel, AffectReading, AppReading, CalendarReading, NoAffectBackend};
use tokio::time::Duration;

use common::{at, harness, notification, settings};

const BUSY_DEFER: &str = r#"{
    "context": { "utc_offset_minutes": 0 },
    "apps": { "focus": ["rustrover"] },
    "calendar": {
        "busy_blocks": [{ "name": "standup", "start": "11:00", "end": "13:00" }]
    },
    "rules": [
        {
            "id": "busy_defer",
            "priority": 1,
            "condition": { "calendar_busy": true },
            "action": "defer",
            "params": { "defer_seconds": 300 }
        }
    ]
}"#;

const BATCH_ALL: &str = r#"{
    "context": { "utc_offset_minutes": 0 },
    "scheduler": { "batch_window_secs": 60, "batch_max_size": 10 },
    "rules": [
        {
            "id": "digest",
            "priority": 1,
            "action": "batch",
            "params": { "batch_key": "digest" }
        }
    ]
}"#;

#[test]
fn calendar_busy_defers_for_rule_duration() {
    let h = harness(&settings(BUSY_DEFER));
    h.engine
        .submit_affect(Ok(AffectReading::new(AffectLabel::Happiness, 0.9, at(0))), at(0));
    h.engine.submit_app(Ok(AppReading {
        app_name: "RustRover".into(),
        timestamp: at(0),
    }));
    let snapshot = h.engine.tick(at(0));
    assert!(snapshot.calendar_busy);
    assert_eq!(snapshot.calendar_event.as_deref(), Some("standup"));

    let decision = h.engine.submit_notification(notification("n1"), at(10));
    assert_eq!(decision.action, RuleAction::Defer);
    assert_eq!(decision.reason, "busy_defer");
    assert_eq!(decision.release_deadline, Some(at(310)));
    assert!(h.dispatcher.singles.lock().unwrap().is_empty());

    assert_eq!(h.engine.release_due(at(309)), 0);
    assert_eq!(h.engine.release_due(at(310)), 1);
    assert_eq!(*h.dispatcher.singles.lock().unwrap(), vec!["n1"]);
}

#[test]
fn unmatched_notification_is_delivered_with_default_reason() {
    let h = harness(&settings(r#"{ "context": { "utc_offset_minutes": 0 } }"#));
    h.engine.tick(at(0));

    let decision = h.engine.submit_notification(notification("n1"), at(1));
    assert_eq!(decision.action, RuleAction::Deliver);
    assert!(decision.is_default());
    assert_eq!(decision.release_deadline, None);
    assert_eq!(*h.dispatcher.singles.lock().unwrap(), vec!["n1"]);
    assert_eq!(h.engine.pending_len(), 0);
}

#[test]
fn batch_window_flushes_once_in_arrival_order() {
    let h = harness(&settings(BATCH_ALL));
    for (offset, id) in ["a", "b", "c"].iter().enumerate() {
        let decision = h.engine.submit_notification(notification(id), at(offset as i64));
        assert_eq!(decision.action, RuleAction::Batch);
        assert_eq!(decision.release_deadline, Some(at(60)));
        assert_eq!(decision.batch_key.as_deref(), Some("digest"));
    }

    assert_eq!(h.engine.release_due(at(59)), 0);
    assert_eq!(h.engine.release_due(at(60)), 3);
    assert_eq!(h.engine.release_due(at(120)), 0);

    let batches = h.dispatcher.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].0, "digest");
    assert_eq!(batches[0].1, vec!["a", "b", "c"]);
}

#[test]
fn full_batch_flushes_without_waiting_for_the_window() {
    let mut config = settings(BATCH_ALL);
    config.scheduler.batch_max_size = 2;
    let h = harness(&config);

    h.engine.submit_notification(notification("a"), at(0));
    assert!(h.dispatcher.batches.lock().unwrap().is_empty());
    h.engine.submit_notification(notification("b"), at(1));
    assert_eq!(h.dispatcher.batches.lock().unwrap().len(), 1);

    h.engine.submit_notification(notification("c"), at(2));
    assert!(h.engine.is_pending("c"));
    assert_eq!(h.engine.release_due(at(62)), 1);
    assert_eq!(h.dispatcher.batches.lock().unwrap()[1].1, vec!["c"]);
}

#[test]
fn canceled_notification_is_never_dispatched() {
    let h = harness(&settings(BUSY_DEFER));
    let mut events = h.events.subscribe();
    h.engine.tick(at(0));
    h.engine.submit_notification(notification("n1"), at(0));

    assert_eq!(h.engine.cancel("n1"), CancelOutcome::Canceled);
    assert_eq!(h.engine.cancel("n1"), CancelOutcome::AlreadyCanceled);
    assert_eq!(h.engine.cancel("missing"), CancelOutcome::Unknown);
    assert_eq!(h.engine.release_due(at(10_000)), 0);
    assert!(h.dispatcher.singles.lock().unwrap().is_empty());

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        if event.notification_id() == Some("n1") {
            kinds.push(event.kind());
        }
    }
    assert_eq!(kinds, vec!["received", "decision", "deferred", "canceled"]);
}

#[test]
fn feedback_follows_delivery_in_the_event_stream() {
    let h = harness(&settings(r#"{ "context": { "utc_offset_minutes": 0 } }"#));
    let mut events = h.events.subscribe();
    h.engine.tick(at(0));
    h.engine.submit_notification(notification("n1"), at(0));
    h.engine
        .record_feedback("n1", FeedbackOutcome::Dismissed, Some(3.0), at(3));

    let mut stream = Vec::new();
    while let Ok(event) = events.try_recv() {
        if event.notification_id() == Some("n1") {
            stream.push((event.kind(), event.detail()));
        }
    }
    let kinds: Vec<&str> = stream.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(kinds, vec!["received", "decision", "delivered", "feedback"]);
    assert_eq!(stream[3].1["outcome"], "user_dismissed");
}

#[test]
fn rejected_rule_swap_keeps_serving_previous_rules() {
    let h = harness(&settings(BUSY_DEFER));
    let invalid: Vec<Rule> = serde_json::from_str(
        r#"[{ "id": "broken", "priority": 1, "action": "defer", "params": { "defer_seconds": 0 } }]"#,
    )
    .unwrap();
    assert!(h.engine.swap_rules(invalid, DecisionPolicy::default()).is_err());

    h.engine.tick(at(0));
    let decision = h.engine.submit_notification(notification("n1"), at(0));
    assert_eq!(decision.reason, "busy_defer");
}

#[test]
fn rules_evaluated_before_a_swap_finish_on_the_old_set() {
    let h = harness(&settings(BUSY_DEFER));
    let before = h.engine.active_rules();
    h.engine
        .swap_rules(Vec::new(), DecisionPolicy::default())
        .unwrap();

    assert_eq!(before.rules()[0].id, "busy_defer");
    assert!(h.engine.active_rules().rules().is_empty());
}

#[test]
fn external_calendar_failure_falls_back_to_static_blocks() {
    let mut config = settings(BUSY_DEFER);
    config.calendar.use_external = true;
    let h = harness(&config);

    h.engine.submit_calendar(Ok(CalendarReading::free(at(0))));
    assert!(!h.engine.tick(at(0)).calendar_busy);

    h.engine
        .submit_calendar(Err(SignalUnavailable::new("calendar", "provider offline")));
    let snapshot = h.engine.tick(at(5));
    assert!(snapshot.calendar_busy);
    assert_eq!(snapshot.calendar_event.as_deref(), Some("standup"));
}

#[test]
fn snapshot_subscribers_see_each_tick() {
    let h = harness(&settings(BUSY_DEFER));
    let mut snapshots = h.engine.subscribe_snapshots();
    let mut events = h.events.subscribe();

    h.engine.tick(at(3));
    assert!(snapshots.has_changed().unwrap());
    assert_eq!(snapshots.borrow_and_update().timestamp, at(3));
    assert!(matches!(events.try_recv().unwrap(), EngineEvent::Snapshot(_)));
}

#[tokio::test]
async fn deferred_notification_is_released_by_the_background_loop() {
    let config = settings(
        r#"{
            "aggregation": { "tick_interval_secs": 1 },
            "rules": [
                { "id": "hold", "priority": 1, "action": "defer", "params": { "defer_seconds": 1 } }
            ]
        }"#,
    );
    let h = harness(&config);
    let mut controller = EngineController::new(h.engine.clone());
    controller
        .start(
            Collaborators {
                affect: Arc::new(NoAffectBackend),
                apps: None,
                calendar: None,
                metrics: None,
                sources: Vec::new(),
            },
            &config,
        )
        .unwrap();

    h.engine.submit_notification(notification("n1"), Utc::now());
    assert!(h.engine.is_pending("n1"));

    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert_eq!(*h.dispatcher.singles.lock().unwrap(), vec!["n1"]);

    let pending = controller.stop(false).await;
    assert!(pending.is_empty());
}
