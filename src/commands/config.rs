use std::path::Path;

use anyhow::Result;
use clap::Subcommand;

use focusframe_lib::settings::EngineSettings;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration, defaults filled in
    Show,
    /// Validate the configuration file
    Check,
}

pub fn run(config: &Path, action: ConfigAction) -> Result<()> {
    let settings = EngineSettings::load(config)?;
    match action {
        ConfigAction::Show => {
            let json = serde_json::to_string_pretty(&settings)?;
            println!("{json}");
        }
        ConfigAction::Check => {
            println!("ok: {} rules active", settings.active_rules()?.len());
        }
    }
    Ok(())
}
