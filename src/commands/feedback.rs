use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use clap::Args;

use focusframe_lib::db::Database;
use focusframe_lib::report::FeedbackOutcome;
use focusframe_lib::settings::EngineSettings;

#[derive(Args)]
pub struct FeedbackArgs {
    /// Notification id, as shown by `events`
    notification: String,
    /// opened, snoozed, dismissed or ignored
    outcome: FeedbackOutcome,
}

pub async fn run(config: &Path, args: FeedbackArgs) -> Result<()> {
    let settings = EngineSettings::load(config)?;
    let database = Database::new(settings.storage.resolved_path())?;

    let latency = database
        .record_feedback(&args.notification, args.outcome, Utc::now())
        .await?;
    match latency {
        Some(secs) => println!(
            "recorded {} for {} ({secs:.1}s after delivery)",
            args.outcome.as_str(),
            args.notification
        ),
        None => println!(
            "recorded {} for {} (no delivery on record)",
            args.outcome.as_str(),
            args.notification
        ),
    }
    Ok(())
}
