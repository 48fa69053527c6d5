//! The decision engine: shared state plus the operations pollers, notification
//! sources and the background loop call into.

pub mod controller;
pub mod loop_worker;
pub mod pollers;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::{watch, Notify};

use crate::context::{ContextAggregator, ContextSnapshot, SmoothedAffect};
use crate::dispatch::Dispatcher;
use crate::error::{EngineError, SignalUnavailable};
use crate::models::Notification;
use crate::report::{DecisionLog, EngineEvent, FeedbackOutcome, NotificationEvent, NotificationEventKind};
use crate::rules::{Decision, DecisionPolicy, Rule, RuleAction, RuleEngine, RuleSet};
use crate::scheduler::{CancelOutcome, PendingNotification, Scheduler};
use crate::settings::EngineSettings;
use crate::signals::{AffectReading, AppReading, CalendarReading, SystemMetrics};

pub use controller::{Collaborators, EngineController};

/// Decision reason for a recovered item whose deadline passed while stopped.
pub const RECOVERED_OVERDUE_REASON: &str = "recovered_overdue";

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub struct Engine {
    aggregator: Mutex<ContextAggregator>,
    snapshot_tx: watch::Sender<Arc<ContextSnapshot>>,
    rules: RuleEngine,
    scheduler: Scheduler,
    log: DecisionLog,
}

impl Engine {
    pub fn new(
        settings: &EngineSettings,
        dispatcher: Arc<dyn Dispatcher>,
        log: DecisionLog,
    ) -> Result<Self, EngineError> {
        settings.validate()?;
        let aggregator = ContextAggregator::new(settings)?;
        // Cold snapshot: every signal at its default until the first tick.
        let cold = Arc::new(aggregator.tick(Utc::now()));
        let (snapshot_tx, _) = watch::channel(cold);

        Ok(Self {
            aggregator: Mutex::new(aggregator),
            snapshot_tx,
            rules: RuleEngine::new(settings.rule_set()?),
            scheduler: Scheduler::new(
                settings.scheduler.batch_window_secs,
                settings.scheduler.batch_max_size,
                dispatcher,
                log.clone(),
            ),
            log,
        })
    }

    pub fn submit_affect(
        &self,
        result: Result<AffectReading, SignalUnavailable>,
        now: DateTime<Utc>,
    ) -> SmoothedAffect {
        self.aggregator().record_affect(result, now)
    }

    pub fn submit_app(&self, result: Result<AppReading, SignalUnavailable>) {
        self.aggregator().record_app(result);
    }

    pub fn submit_calendar(&self, result: Result<CalendarReading, SignalUnavailable>) {
        self.aggregator().record_calendar(result);
    }

    pub fn submit_metrics(&self, result: Result<SystemMetrics, SignalUnavailable>) {
        self.aggregator().record_metrics(result);
    }

    /// Clears smoothed affect, e.g. after switching affect backends.
    pub fn reset_affect(&self) {
        self.aggregator().reset_affect();
    }

    /// Builds and publishes a new snapshot.
    pub fn tick(&self, now: DateTime<Utc>) -> Arc<ContextSnapshot> {
        let snapshot = Arc::new(self.aggregator().tick(now));
        self.snapshot_tx.send_replace(snapshot.clone());
        self.log.emit(EngineEvent::Snapshot(snapshot.clone()));
        snapshot
    }

    pub fn latest_snapshot(&self) -> Arc<ContextSnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<Arc<ContextSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Evaluates a notification against the latest snapshot and hands the
    /// decision to the scheduler.
    pub fn submit_notification(&self, notification: Notification, now: DateTime<Utc>) -> Decision {
        let decision = self.evaluate(&notification, now);
        self.scheduler.apply(decision, notification, now)
    }

    fn evaluate(&self, notification: &Notification, now: DateTime<Utc>) -> Decision {
        self.log.notification(
            &notification.id,
            NotificationEventKind::Received,
            json!({
                "source": notification.source,
                "title": notification.title,
                "category": notification.category,
                "tags": notification.tags,
                "sentiment": notification.sentiment,
            }),
        );
        let snapshot = self.latest_snapshot();
        self.rules.evaluate(&snapshot, notification, now)
    }

    pub fn cancel(&self, notification_id: &str) -> CancelOutcome {
        self.scheduler.cancel(notification_id)
    }

    /// Records what the user did with a delivered notification.
    pub fn record_feedback(
        &self,
        notification_id: &str,
        outcome: FeedbackOutcome,
        latency_secs: Option<f64>,
        now: DateTime<Utc>,
    ) {
        log_info!("feedback for {notification_id}: {}", outcome.as_str());
        self.log.emit(EngineEvent::Notification(NotificationEvent::feedback(
            notification_id,
            outcome,
            latency_secs,
            now,
        )));
    }

    pub fn active_rules(&self) -> Arc<RuleSet> {
        self.rules.active()
    }

    /// Replaces the rule set. Invalid rules are rejected and the current set stays.
    pub fn swap_rules(&self, rules: Vec<Rule>, policy: DecisionPolicy) -> Result<(), EngineError> {
        match self.rules.replace(rules, policy) {
            Ok(()) => {
                log_info!("rule set replaced");
                Ok(())
            }
            Err(err) => {
                log_warn!("rejected rule set: {err}");
                Err(err)
            }
        }
    }

    /// Applies a reloaded configuration's rules and batch limits. Items already
    /// deferred or batched keep their deadlines.
    pub fn apply_settings(&self, settings: &EngineSettings) -> Result<(), EngineError> {
        let rule_set = settings.rule_set().map_err(|err| {
            log_warn!("rejected configuration: {err}");
            err
        })?;
        self.rules.swap(rule_set);
        self.scheduler.set_batch_limits(
            settings.scheduler.batch_window_secs,
            settings.scheduler.batch_max_size,
        );
        log_info!(
            "configuration applied (profile: {})",
            settings.active_profile.as_deref().unwrap_or("default")
        );
        Ok(())
    }

    pub fn release_due(&self, now: DateTime<Utc>) -> usize {
        self.scheduler.release_due(now)
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.scheduler.next_deadline()
    }

    pub fn pending_len(&self) -> usize {
        self.scheduler.pending_len()
    }

    pub fn is_pending(&self, notification_id: &str) -> bool {
        self.scheduler.is_pending(notification_id)
    }

    pub fn wake_handle(&self) -> Arc<Notify> {
        self.scheduler.wake_handle()
    }

    /// Empties the scheduler on shutdown. With `release` everything pending is
    /// dispatched now; otherwise it is returned for durable storage and
    /// recorded as `pending_at_shutdown`.
    pub fn finish_pending(&self, release: bool) -> Vec<PendingNotification> {
        let drained = self.scheduler.drain_pending();
        if release {
            let count = self.scheduler.release_all(drained);
            log_info!("released {count} pending notifications on shutdown");
            return Vec::new();
        }

        let pending: Vec<PendingNotification> = drained
            .into_iter()
            .flat_map(Vec::<PendingNotification>::from)
            .collect();
        for item in &pending {
            self.log.notification(
                &item.notification.id,
                NotificationEventKind::PendingAtShutdown,
                json!({ "releaseAt": item.release_at, "batchKey": item.batch_key }),
            );
        }
        pending
    }

    /// Re-submits notifications recorded at a previous shutdown. An item is
    /// never held past its stored deadline: one already overdue is delivered
    /// at once, and a fresh deferral is capped at the stored deadline.
    pub fn recover(&self, items: Vec<PendingNotification>, now: DateTime<Utc>) -> Vec<Decision> {
        items
            .into_iter()
            .map(|item| {
                self.log.notification(
                    &item.notification.id,
                    NotificationEventKind::Recovered,
                    json!({ "releaseAt": item.release_at, "batchKey": item.batch_key }),
                );
                let mut decision = self.evaluate(&item.notification, now);
                match item.release_at {
                    Some(deadline) if deadline <= now => {
                        decision.note = Some(format!("{} overruled; was due at {deadline}", decision.reason));
                        decision.action = RuleAction::Deliver;
                        decision.reason = RECOVERED_OVERDUE_REASON.to_string();
                        decision.release_deadline = None;
                        decision.batch_key = None;
                    }
                    Some(deadline) if decision.action == RuleAction::Defer => {
                        decision.release_deadline = decision.release_deadline.map(|at| at.min(deadline));
                    }
                    _ => {}
                }
                self.scheduler.apply(decision, item.notification, now)
            })
            .collect()
    }

    fn aggregator(&self) -> MutexGuard<'_, ContextAggregator> {
        self.aggregator.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
