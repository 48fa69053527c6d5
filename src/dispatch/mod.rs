//! Hand-off point between the scheduler and whatever shows notifications.
//!
//! Items count as delivered once handed to a dispatcher; retrying a failed
//! delivery is the dispatcher's own business.

use crate::error::DispatchError;
use crate::models::Notification;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_info;

pub trait Dispatcher: Send + Sync {
    fn deliver(&self, notification: &Notification) -> Result<(), DispatchError>;

    /// Delivers a flushed batch window as one grouped release, in append order.
    fn deliver_batch(&self, batch_key: &str, notifications: &[Notification]) -> Result<(), DispatchError>;
}

/// Prints deliveries through the `log` facade. Used by the CLI runner.
pub struct LogDispatcher {
    title_prefix: String,
}

impl LogDispatcher {
    pub fn new(title_prefix: impl Into<String>) -> Self {
        Self {
            title_prefix: title_prefix.into(),
        }
    }

    fn title(&self, notification: &Notification) -> String {
        if self.title_prefix.is_empty() || notification.title.starts_with(&self.title_prefix) {
            notification.title.clone()
        } else {
            format!("{} {}", self.title_prefix, notification.title)
        }
    }
}

impl Dispatcher for LogDispatcher {
    fn deliver(&self, notification: &Notification) -> Result<(), DispatchError> {
        log_info!("deliver {}: {}", self.title(notification), notification.message);
        Ok(())
    }

    fn deliver_batch(&self, batch_key: &str, notifications: &[Notification]) -> Result<(), DispatchError> {
        log_info!("deliver batch '{batch_key}' ({} notifications)", notifications.len());
        for notification in notifications {
            log_info!("  - {}: {}", self.title(notification), notification.message);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_prefix_is_applied_once() {
        let dispatcher = LogDispatcher::new("[FocusFrame]");
        let plain = Notification::new("demo", "Standup", "");
        let prefixed = Notification::new("demo", "[FocusFrame] Demo", "");
        assert_eq!(dispatcher.title(&plain), "[FocusFrame] Standup");
        assert_eq!(dispatcher.title(&prefixed), "[FocusFrame] Demo");
        assert!(dispatcher.deliver_batch("deep_work", &[plain, prefixed]).is_ok());
    }
}
