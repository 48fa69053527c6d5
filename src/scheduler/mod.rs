pub mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Notify;

use crate::dispatch::Dispatcher;
use crate::error::EngineError;
use crate::models::Notification;
use crate::report::{DecisionLog, EngineEvent, NotificationEventKind};
use crate::rules::{Decision, RuleAction, DEFAULT_BATCH_KEY};

pub use state::{BatchWindow, CancelOutcome, FlushReason, Release, SchedulerState};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// A notification still pending when the engine stopped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingNotification {
    pub notification: Notification,
    pub release_at: Option<DateTime<Utc>>,
    pub batch_key: Option<String>,
}

enum Placement {
    Deliver(Notification),
    Deferred(serde_json::Value),
    Batched {
        detail: serde_json::Value,
        flushed: Vec<Release>,
    },
}

/// Acts on decisions: dispatches deliveries, holds deferred items and batch
/// windows, and releases them when their deadline passes.
///
/// State changes happen under one mutex; dispatch always happens after the
/// guard is dropped, on items already removed from the state.
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    wake: Arc<Notify>,
    dispatcher: Arc<dyn Dispatcher>,
    log: DecisionLog,
}

impl Scheduler {
    pub fn new(
        batch_window_secs: u64,
        batch_max_size: usize,
        dispatcher: Arc<dyn Dispatcher>,
        log: DecisionLog,
    ) -> Self {
        Self {
            state: Mutex::new(SchedulerState::new(batch_window_secs, batch_max_size)),
            wake: Arc::new(Notify::new()),
            dispatcher,
            log,
        }
    }

    /// Raised whenever a new deadline is armed.
    pub fn wake_handle(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    pub fn set_batch_limits(&self, batch_window_secs: u64, batch_max_size: usize) {
        self.lock().set_batch_limits(batch_window_secs, batch_max_size);
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.lock().next_deadline()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending_len()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.lock().is_pending(id)
    }

    /// Applies a decision and returns it with the batch window's close time
    /// filled in. The decision is recorded before anything is dispatched.
    pub fn apply(&self, mut decision: Decision, notification: Notification, now: DateTime<Utc>) -> Decision {
        let id = notification.id.clone();
        let (superseded, placement) = {
            let mut state = self.lock();
            let superseded = state.supersede(&id);
            let placement = match decision.action {
                RuleAction::Deliver => {
                    state.mark_delivered(&id);
                    Placement::Deliver(notification)
                }
                RuleAction::Defer => {
                    let release_at = decision.release_deadline.unwrap_or(now);
                    state.defer(notification, release_at);
                    Placement::Deferred(json!({ "releaseAt": release_at }))
                }
                RuleAction::Batch => {
                    let key = decision
                        .batch_key
                        .get_or_insert_with(|| DEFAULT_BATCH_KEY.to_string())
                        .clone();
                    let placed = state.batch(notification, &key, now);
                    decision.release_deadline = Some(placed.close_at);
                    Placement::Batched {
                        detail: json!({
                            "batchKey": key,
                            "windowId": placed.window_id,
                            "closeAt": placed.close_at,
                        }),
                        flushed: placed.flushed,
                    }
                }
            };
            (superseded, placement)
        };

        if superseded {
            self.log_superseded(&id);
        }
        self.log.emit(EngineEvent::Decision(decision.clone()));

        match placement {
            Placement::Deliver(notification) => match self.dispatcher.deliver(&notification) {
                Ok(()) => self
                    .log
                    .notification(&id, NotificationEventKind::Delivered, json!({})),
                Err(err) => self.dispatch_failed(&id, err.into(), json!({})),
            },
            Placement::Deferred(detail) => {
                self.log
                    .notification(&id, NotificationEventKind::Deferred, detail);
                self.wake.notify_one();
            }
            Placement::Batched { detail, flushed } => {
                self.log
                    .notification(&id, NotificationEventKind::Batched, detail);
                self.wake.notify_one();
                for release in flushed {
                    self.dispatch(release);
                }
            }
        }
        decision
    }

    /// Releases everything due at `now`; returns how many notifications left.
    pub fn release_due(&self, now: DateTime<Utc>) -> usize {
        let due = self.lock().due(now);
        let mut count = 0;
        for release in due {
            count += release.notifications().len();
            self.dispatch(release);
        }
        if count > 0 {
            log_debug!("released {count} notifications");
        }
        count
    }

    pub fn cancel(&self, id: &str) -> CancelOutcome {
        let (outcome, first_conflict) = self.lock().cancel(id);
        match outcome {
            CancelOutcome::Canceled => {
                self.log
                    .notification(id, NotificationEventKind::Canceled, json!({}));
            }
            CancelOutcome::AlreadyReleased | CancelOutcome::AlreadyCanceled => {
                if first_conflict {
                    let conflict = EngineError::SchedulerStateConflict {
                        notification_id: id.to_string(),
                        state: outcome.as_str(),
                        attempted: "cancel",
                    };
                    log_warn!("{conflict}");
                }
            }
            CancelOutcome::Unknown => log_debug!("cancel for unknown notification {id}"),
        }
        outcome
    }

    /// Removes everything still pending without dispatching it.
    pub fn drain_pending(&self) -> Vec<Release> {
        self.lock().drain()
    }

    /// Dispatches previously drained items, e.g. on shutdown.
    pub fn release_all(&self, releases: Vec<Release>) -> usize {
        let mut count = 0;
        for release in releases {
            count += release.notifications().len();
            self.dispatch(release);
        }
        count
    }

    fn dispatch(&self, release: Release) {
        match release {
            Release::Deferred {
                notification,
                release_at,
            } => {
                let detail = json!({ "releaseAt": release_at });
                match self.dispatcher.deliver(&notification) {
                    Ok(()) => self
                        .log
                        .notification(&notification.id, NotificationEventKind::Released, detail),
                    Err(err) => self.dispatch_failed(&notification.id, err.into(), detail),
                }
            }
            Release::Batch { window, reason } => {
                let detail = json!({
                    "batchKey": window.batch_key,
                    "windowId": window.window_id,
                    "reason": reason.as_str(),
                    "size": window.members.len(),
                });
                log_info!(
                    "flushing batch '{}' with {} notifications ({})",
                    window.batch_key,
                    window.members.len(),
                    reason.as_str()
                );
                match self.dispatcher.deliver_batch(&window.batch_key, &window.members) {
                    Ok(()) => {
                        for member in &window.members {
                            self.log.notification(
                                &member.id,
                                NotificationEventKind::Released,
                                detail.clone(),
                            );
                        }
                    }
                    Err(err) => {
                        let err = EngineError::from(err);
                        for member in &window.members {
                            self.dispatch_failed(&member.id, err.clone(), detail.clone());
                        }
                    }
                }
            }
        }
    }

    fn dispatch_failed(&self, id: &str, err: EngineError, mut detail: serde_json::Value) {
        log::error!("dispatch of notification {id} failed: {err}");
        detail["error"] = json!(err.to_string());
        self.log
            .notification(id, NotificationEventKind::DispatchFailed, detail);
    }

    fn log_superseded(&self, id: &str) {
        log_debug!("notification {id} resubmitted; previous entry dropped");
        self.log.notification(
            id,
            NotificationEventKind::Canceled,
            json!({ "reason": "superseded" }),
        );
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl From<Release> for Vec<PendingNotification> {
    fn from(release: Release) -> Self {
        match release {
            Release::Deferred {
                notification,
                release_at,
            } => vec![PendingNotification {
                notification,
                release_at: Some(release_at),
                batch_key: None,
            }],
            Release::Batch { window, .. } => {
                let close_at = window.close_at;
                let key = window.batch_key;
                window
                    .members
                    .into_iter()
                    .map(|notification| PendingNotification {
                        notification,
                        release_at: Some(close_at),
                        batch_key: Some(key.clone()),
                    })
                    .collect()
            }
        }
    }
}
