use crate::context::AppCategory;
use crate::signals::AffectLabel;

use super::rule::{ActionParams, Rule, RuleAction, RuleCondition};

const NEGATIVE: [AffectLabel; 3] = [AffectLabel::Angry, AffectLabel::Fear, AffectLabel::Disgust];
const RELAXED: [AffectLabel; 3] = [
    AffectLabel::Neutral,
    AffectLabel::Happiness,
    AffectLabel::Surprise,
];

/// Rule set used when the configuration does not supply one.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            id: "negative_focus_defer".into(),
            name: "Defer negative emotion in focus apps".into(),
            priority: 10,
            condition: RuleCondition {
                affect_in: Some(NEGATIVE.to_vec()),
                app_category_in: Some(vec![AppCategory::Focus]),
                ..RuleCondition::default()
            },
            action: RuleAction::Defer,
            params: ActionParams {
                reason: Some("negative_emotion_in_focus_app".into()),
                defer_duration_key: Some("focus".into()),
                ..ActionParams::default()
            },
        },
        Rule {
            id: "sad_focus_defer".into(),
            name: "Short defer for sadness".into(),
            priority: 20,
            condition: RuleCondition {
                affect_in: Some(vec![AffectLabel::Sad]),
                app_category_in: Some(vec![AppCategory::Focus]),
                ..RuleCondition::default()
            },
            action: RuleAction::Defer,
            params: ActionParams {
                reason: Some("sad_in_focus_app".into()),
                defer_duration_key: Some("sad".into()),
                ..ActionParams::default()
            },
        },
        Rule {
            id: "batch_relaxed_focus".into(),
            name: "Batch relaxed focus context".into(),
            priority: 30,
            condition: RuleCondition {
                affect_in: Some(RELAXED.to_vec()),
                app_category_in: Some(vec![AppCategory::Focus]),
                batching_enabled: Some(true),
                ..RuleCondition::default()
            },
            action: RuleAction::Batch,
            params: ActionParams {
                reason: Some("batch_during_deep_work".into()),
                batch_key: Some("deep_work".into()),
                ..ActionParams::default()
            },
        },
        Rule {
            id: "casual_deliver".into(),
            name: "Deliver in casual apps".into(),
            priority: 40,
            condition: RuleCondition {
                app_category_in: Some(vec![AppCategory::Casual]),
                affect_not_in: Some(NEGATIVE.to_vec()),
                ..RuleCondition::default()
            },
            action: RuleAction::Deliver,
            params: ActionParams {
                reason: Some("casual_context".into()),
                ..ActionParams::default()
            },
        },
    ]
}
