use std::path::Path;

use anyhow::Result;
use clap::Args;

use focusframe_lib::db::Database;
use focusframe_lib::settings::EngineSettings;

#[derive(Args)]
pub struct EventsArgs {
    /// Number of most recent events to show
    #[arg(long, default_value_t = 50)]
    limit: u64,
    /// Only events for this notification id
    #[arg(long)]
    notification: Option<String>,
}

pub async fn run(config: &Path, args: EventsArgs) -> Result<()> {
    let settings = EngineSettings::load(config)?;
    let database = Database::new(settings.storage.resolved_path())?;

    let events = match &args.notification {
        Some(id) => database.events_for_notification(id).await?,
        None => database.recent_events(args.limit).await?,
    };
    for event in events {
        println!(
            "{}  {:<20} {:<38} {}",
            event.ts.to_rfc3339(),
            event.kind,
            event.notification_id.as_deref().unwrap_or("-"),
            event.detail
        );
    }
    Ok(())
}
