use serde::{Deserialize, Serialize};

use crate::context::{AppCategory, ContextSnapshot, TimeOfDay};
use crate::models::Notification;
use crate::signals::AffectLabel;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Deliver,
    Defer,
    Batch,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Deliver => "deliver",
            RuleAction::Defer => "defer",
            RuleAction::Batch => "batch",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActionParams {
    /// Human-readable note carried into the decision record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defer_seconds: Option<u64>,
    /// Looks up the deferral length in `scheduler.named_deferrals`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defer_duration_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_key: Option<String>,
}

/// Conjunction of optional clauses; an empty condition matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuleCondition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affect_in: Option<Vec<AffectLabel>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affect_not_in: Option<Vec<AffectLabel>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affect_is: Option<AffectLabel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_affect_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_category_in: Option<Vec<AppCategory>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_category_in: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_tags_any: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_work_hours: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_busy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_of_day_in: Option<Vec<TimeOfDay>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batching_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_above: Option<f32>,
}

impl RuleCondition {
    /// Pure predicate over the snapshot and the notification being decided.
    pub fn matches(
        &self,
        snapshot: &ContextSnapshot,
        notification: &Notification,
        batching_enabled: bool,
    ) -> bool {
        let affect = snapshot.affect.label;

        if let Some(allowed) = &self.affect_in {
            if !allowed.contains(&affect) {
                return false;
            }
        }
        if let Some(denied) = &self.affect_not_in {
            if denied.contains(&affect) {
                return false;
            }
        }
        if let Some(expected) = self.affect_is {
            if affect != expected {
                return false;
            }
        }
        if let Some(min) = self.min_affect_confidence {
            if snapshot.affect.confidence < min {
                return false;
            }
        }
        if let Some(categories) = &self.app_category_in {
            if !categories.contains(&snapshot.app_category) {
                return false;
            }
        }
        if let Some(categories) = &self.notification_category_in {
            if !categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&notification.category))
            {
                return false;
            }
        }
        if let Some(tags) = &self.notification_tags_any {
            let hit = tags
                .iter()
                .any(|wanted| notification.tags.iter().any(|t| t.eq_ignore_ascii_case(wanted)));
            if !hit {
                return false;
            }
        }
        if let Some(required) = self.requires_work_hours {
            if snapshot.is_work_hours != required {
                return false;
            }
        }
        if let Some(busy) = self.calendar_busy {
            if snapshot.calendar_busy != busy {
                return false;
            }
        }
        if let Some(segments) = &self.time_of_day_in {
            if !segments.contains(&snapshot.time_of_day) {
                return false;
            }
        }
        if let Some(required) = self.batching_enabled {
            if batching_enabled != required {
                return false;
            }
        }
        if let Some(threshold) = self.cpu_above {
            if !(snapshot.system_metrics.cpu_pct > threshold) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Lower values are evaluated first.
    pub priority: i32,
    #[serde(default)]
    pub condition: RuleCondition,
    pub action: RuleAction,
    #[serde(default)]
    pub params: ActionParams,
}
