use tokio::sync::broadcast;

use super::{EngineEvent, EventSink, NotificationEventKind};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Writes the decision log to the `log` facade.
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&self, event: &EngineEvent) {
        match event {
            EngineEvent::Snapshot(snapshot) => {
                log_debug!(
                    "snapshot affect={} ({:.2}) app={} [{}] busy={} work_hours={}",
                    snapshot.affect.label,
                    snapshot.affect.confidence,
                    snapshot.active_app,
                    snapshot.app_category.as_str(),
                    snapshot.calendar_busy,
                    snapshot.is_work_hours
                );
            }
            EngineEvent::Decision(decision) => {
                log_info!(
                    "decision {} -> {} (rule {}, deadline {:?})",
                    decision.notification_id,
                    decision.action.as_str(),
                    decision.reason,
                    decision.release_deadline
                );
            }
            EngineEvent::Notification(notification) => match notification.kind {
                NotificationEventKind::DispatchFailed => {
                    log_warn!("notification {} dispatch failed: {}", notification.id, notification.detail);
                }
                kind => log_info!("notification {} {}", notification.id, kind.as_str()),
            },
        }
    }
}

/// Publishes events on a tokio broadcast channel for a presentation layer.
/// Lagging receivers lose the oldest events; the engine never waits on them.
pub struct BroadcastSink {
    sender: broadcast::Sender<EngineEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn record(&self, event: &EngineEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event.clone());
    }
}
