pub mod decision;
pub mod defaults;
pub mod engine;
pub mod rule;

pub use decision::{Decision, DEFAULT_REASON};
pub use defaults::default_rules;
pub use engine::{DecisionPolicy, RuleEngine, RuleSet, DEFAULT_BATCH_KEY};
pub use rule::{ActionParams, Rule, RuleAction, RuleCondition};
