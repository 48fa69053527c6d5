use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signals::{AffectLabel, SystemMetrics};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AppCategory {
    Focus,
    Casual,
    Unknown,
}

impl AppCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppCategory::Focus => "focus",
            AppCategory::Casual => "casual",
            AppCategory::Unknown => "unknown",
        }
    }
}

impl Default for AppCategory {
    fn default() -> Self {
        AppCategory::Unknown
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }
}

/// Stabilized affect state as reported by the smoother.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SmoothedAffect {
    pub label: AffectLabel,
    /// Confidence of the latest accepted reading carrying `label`; 0 when unknown.
    pub confidence: f64,
    pub ema_confidence: f64,
    /// Last accepted labels, oldest first.
    pub history: Vec<AffectLabel>,
}

impl SmoothedAffect {
    pub fn unknown() -> Self {
        Self::default()
    }
}

/// Fused user context for one aggregation tick. Never mutated once built;
/// the next tick supersedes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub timestamp: DateTime<Utc>,
    pub affect: SmoothedAffect,
    pub active_app: String,
    pub app_category: AppCategory,
    pub calendar_busy: bool,
    pub calendar_event: Option<String>,
    pub time_of_day: TimeOfDay,
    pub is_work_hours: bool,
    pub system_metrics: SystemMetrics,
}

pub const UNKNOWN_APP: &str = "unknown";
