use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use tokio::time::Duration;

use focusframe_lib::RunOptions;

#[derive(Args)]
pub struct RunArgs {
    /// Emit demo notifications even if no demo source is enabled
    #[arg(long)]
    demo: bool,
    /// Database file (overrides storage.database_path)
    #[arg(long)]
    database: Option<PathBuf>,
    /// Stop after this many seconds
    #[arg(long)]
    duration_secs: Option<u64>,
}

pub async fn run(config: &Path, args: RunArgs) -> Result<()> {
    focusframe_lib::run(RunOptions {
        config_path: config.to_path_buf(),
        demo: args.demo,
        database_path: args.database,
        duration: args.duration_secs.map(Duration::from_secs),
    })
    .await
}
