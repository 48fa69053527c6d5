use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};

use crate::context::ContextSnapshot;
use crate::error::EngineError;
use crate::models::Notification;

use super::decision::{Decision, DEFAULT_REASON};
use super::rule::{Rule, RuleAction};

pub const DEFAULT_BATCH_KEY: &str = "default";

/// Upper bound on any single deferral; keeps deadline arithmetic in range.
pub const MAX_DEFER_SECS: u64 = 366 * 24 * 60 * 60;

/// Scheduler-side knobs the rules consult when turning a match into a decision.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionPolicy {
    pub default_defer_secs: u64,
    pub named_deferrals: BTreeMap<String, u64>,
    pub batching_enabled: bool,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            default_defer_secs: 900,
            named_deferrals: BTreeMap::new(),
            batching_enabled: true,
        }
    }
}

/// A validated rule list in evaluation order. Built whole or not at all.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    policy: DecisionPolicy,
}

impl RuleSet {
    pub fn new(mut rules: Vec<Rule>, policy: DecisionPolicy) -> Result<Self, EngineError> {
        validate(&rules, &policy)?;
        // Stable: equal priorities keep registration order.
        rules.sort_by_key(|rule| rule.priority);
        Ok(Self { rules, policy })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    pub fn evaluate(
        &self,
        snapshot: &ContextSnapshot,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> Decision {
        let matched = self
            .rules
            .iter()
            .find(|rule| rule.condition.matches(snapshot, notification, self.policy.batching_enabled));

        let Some(rule) = matched else {
            return Decision {
                notification_id: notification.id.clone(),
                action: RuleAction::Deliver,
                reason: DEFAULT_REASON.to_string(),
                note: None,
                snapshot_timestamp: snapshot.timestamp,
                decided_at: now,
                release_deadline: None,
                batch_key: None,
            };
        };

        let (release_deadline, batch_key) = match rule.action {
            RuleAction::Deliver => (None, None),
            RuleAction::Defer => {
                let secs = self.defer_secs(rule).min(MAX_DEFER_SECS);
                (Some(now + Duration::seconds(secs as i64)), None)
            }
            RuleAction::Batch => (
                None,
                Some(
                    rule.params
                        .batch_key
                        .clone()
                        .unwrap_or_else(|| DEFAULT_BATCH_KEY.to_string()),
                ),
            ),
        };

        Decision {
            notification_id: notification.id.clone(),
            action: rule.action,
            reason: rule.id.clone(),
            note: rule.params.reason.clone(),
            snapshot_timestamp: snapshot.timestamp,
            decided_at: now,
            release_deadline,
            batch_key,
        }
    }

    fn defer_secs(&self, rule: &Rule) -> u64 {
        if let Some(secs) = rule.params.defer_seconds {
            return secs;
        }
        rule.params
            .defer_duration_key
            .as_ref()
            .and_then(|key| self.policy.named_deferrals.get(key).copied())
            .unwrap_or(self.policy.default_defer_secs)
    }
}

fn validate(rules: &[Rule], policy: &DecisionPolicy) -> Result<(), EngineError> {
    let mut seen = HashSet::new();
    for rule in rules {
        if rule.id.trim().is_empty() {
            return Err(EngineError::config("rule id must not be empty"));
        }
        if !seen.insert(rule.id.as_str()) {
            return Err(EngineError::config(format!("duplicate rule id '{}'", rule.id)));
        }
        if let Some(secs) = rule.params.defer_seconds {
            if secs == 0 || secs > MAX_DEFER_SECS {
                return Err(EngineError::config(format!(
                    "rule '{}': defer_seconds must be between 1 and {MAX_DEFER_SECS}",
                    rule.id
                )));
            }
        }
        if let Some(key) = &rule.params.defer_duration_key {
            if !policy.named_deferrals.contains_key(key) {
                return Err(EngineError::config(format!(
                    "rule '{}': unknown defer_duration_key '{key}'",
                    rule.id
                )));
            }
        }
        if let Some(key) = &rule.params.batch_key {
            if key.trim().is_empty() {
                return Err(EngineError::config(format!(
                    "rule '{}': batch_key must not be empty",
                    rule.id
                )));
            }
        }
        if let Some(min) = rule.condition.min_affect_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err(EngineError::config(format!(
                    "rule '{}': min_affect_confidence must be within [0, 1]",
                    rule.id
                )));
            }
        }
        if let Some(cpu) = rule.condition.cpu_above {
            if !(0.0..=100.0).contains(&cpu) {
                return Err(EngineError::config(format!(
                    "rule '{}': cpu_above must be within [0, 100]",
                    rule.id
                )));
            }
        }
    }
    Ok(())
}

/// Holds the active rule set behind an atomically swapped `Arc`. Evaluation
/// clones the `Arc` and runs without holding the lock, so a concurrent swap
/// never changes the rules under an evaluation already in progress.
pub struct RuleEngine {
    active: RwLock<Arc<RuleSet>>,
}

impl RuleEngine {
    pub fn new(rule_set: RuleSet) -> Self {
        Self {
            active: RwLock::new(Arc::new(rule_set)),
        }
    }

    pub fn active(&self) -> Arc<RuleSet> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn swap(&self, rule_set: RuleSet) -> Arc<RuleSet> {
        let next = Arc::new(rule_set);
        let mut guard = self.active.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }

    /// Validates `rules` and swaps them in; on error the current set stays active.
    pub fn replace(&self, rules: Vec<Rule>, policy: DecisionPolicy) -> Result<(), EngineError> {
        let rule_set = RuleSet::new(rules, policy)?;
        self.swap(rule_set);
        Ok(())
    }

    pub fn evaluate(
        &self,
        snapshot: &ContextSnapshot,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> Decision {
        self.active().evaluate(snapshot, notification, now)
    }
}
