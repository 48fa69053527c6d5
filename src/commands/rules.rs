use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use focusframe_lib::rules::{Rule, RuleSet};
use focusframe_lib::settings::{ConfigStore, EngineSettings};

#[derive(Subcommand)]
pub enum RulesAction {
    /// List the active rules in evaluation order
    List,
    /// Validate a JSON file holding an array of rules
    Check {
        /// Rules file
        file: PathBuf,
    },
    /// Print the active rules as JSON
    Export,
    /// Select a rule profile; omit the name to go back to the top-level rules
    UseProfile {
        /// Profile name from `profiles`
        name: Option<String>,
    },
}

pub fn run(config: &Path, action: RulesAction) -> Result<()> {
    match action {
        RulesAction::List => {
            let settings = EngineSettings::load(config)?;
            let rule_set = settings.rule_set()?;
            if let Some(profile) = &settings.active_profile {
                println!("profile: {profile}");
            }
            for rule in rule_set.rules() {
                println!(
                    "{:>4}  {:<28} {:<8} {}",
                    rule.priority,
                    rule.id,
                    rule.action.as_str(),
                    rule.name
                );
            }
        }
        RulesAction::Check { file } => {
            let settings = EngineSettings::load(config)?;
            let contents = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read rules from {}", file.display()))?;
            let rules: Vec<Rule> =
                serde_json::from_str(&contents).context("Failed to parse rules JSON")?;
            let rule_set = RuleSet::new(rules, settings.decision_policy())?;
            println!("ok: {} rules", rule_set.rules().len());
        }
        RulesAction::Export => {
            let settings = EngineSettings::load(config)?;
            let json = serde_json::to_string_pretty(settings.active_rules()?)?;
            println!("{json}");
        }
        RulesAction::UseProfile { name } => {
            let store = ConfigStore::open(config.to_path_buf())?;
            let settings = store.set_active_profile(name)?;
            match settings.active_profile {
                Some(profile) => println!("active profile: {profile}"),
                None => println!("active profile cleared"),
            }
        }
    }
    Ok(())
}
