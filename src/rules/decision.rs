use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rule::RuleAction;

/// Reason recorded when no rule matched and the engine failed open.
pub const DEFAULT_REASON: &str = "default";

/// Outcome of evaluating one notification against one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub notification_id: String,
    pub action: RuleAction,
    /// Id of the matching rule, or `"default"`.
    pub reason: String,
    pub note: Option<String>,
    pub snapshot_timestamp: DateTime<Utc>,
    pub decided_at: DateTime<Utc>,
    /// Release time for `defer`. For `batch` the scheduler fills in the close
    /// time of the window the notification joined.
    pub release_deadline: Option<DateTime<Utc>>,
    pub batch_key: Option<String>,
}

impl Decision {
    pub fn is_default(&self) -> bool {
        self.reason == DEFAULT_REASON
    }
}
