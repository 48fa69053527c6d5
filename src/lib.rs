pub mod context;
pub mod db;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod models;
pub mod notifications;
pub mod report;
pub mod rules;
pub mod scheduler;
pub mod settings;
pub mod signals;
pub mod utils;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use tokio::time::Duration;

use db::{Database, SqliteSink};
use dispatch::LogDispatcher;
use engine::{Collaborators, Engine, EngineController};
use report::{DecisionLog, EventSink, LogSink};
use settings::ConfigStore;
use signals::build_affect_backend;

/// Initializes `env_logger` at info level; `RUST_LOG` overrides it.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config_path: PathBuf,
    /// Forces a demo notification source on.
    pub demo: bool,
    /// Overrides `storage.database_path`.
    pub database_path: Option<PathBuf>,
    /// Stops after this long instead of waiting for ctrl-c.
    pub duration: Option<Duration>,
}

/// Runs the engine until ctrl-c (or `duration`), then persists whatever is
/// still pending so the next run can recover it.
pub async fn run(options: RunOptions) -> Result<()> {
    info!("FocusFrame starting up...");

    let store = ConfigStore::open(options.config_path.clone())?;
    let settings = store.current();

    let db_path = options
        .database_path
        .clone()
        .unwrap_or_else(|| settings.storage.resolved_path());
    let database = Database::new(db_path)?;

    let mut sqlite_sink = SqliteSink::new(database.clone());
    if !settings.storage.record_snapshots {
        sqlite_sink = sqlite_sink.without_snapshots();
    }
    let sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(LogSink), Arc::new(sqlite_sink)];
    let dispatcher = Arc::new(LogDispatcher::new(settings.notifications.title_prefix.clone()));
    let engine = Arc::new(
        Engine::new(&settings, dispatcher, DecisionLog::new(sinks)).context("failed to build engine")?,
    );

    let mut controller = EngineController::new(engine.clone());
    controller.start(Collaborators::from_settings(&settings, options.demo), &settings)?;

    // Give the pollers one tick so recovered items are judged on live context.
    tokio::time::sleep(Duration::from_secs(settings.aggregation.tick_interval_secs)).await;
    let recovered = database.take_pending().await?;
    if !recovered.is_empty() {
        info!("recovering {} notifications from the last shutdown", recovered.len());
        engine.recover(recovered, Utc::now());
    }

    wait_for_shutdown(&store, &controller, options.duration).await?;

    let release = store.current().scheduler.release_pending_on_shutdown;
    let pending = controller.stop(release).await;
    let stored = database.store_pending(pending).await?;
    if stored > 0 {
        info!("stored {stored} pending notifications for the next run");
    }
    info!("FocusFrame stopped");
    Ok(())
}

async fn wait_for_shutdown(
    store: &ConfigStore,
    controller: &EngineController,
    duration: Option<Duration>,
) -> Result<()> {
    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let mut reload = ReloadSignal::new()?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for ctrl-c")?;
                info!("shutdown requested");
                return Ok(());
            }
            _ = &mut deadline => {
                info!("run duration elapsed");
                return Ok(());
            }
            _ = reload.recv() => reload_config(store, controller),
        }
    }
}

fn reload_config(store: &ConfigStore, controller: &EngineController) {
    let previous = store.current();
    let next = match store.reload() {
        Ok(next) => next,
        Err(err) => {
            warn!("config reload failed, keeping current config: {err:#}");
            return;
        }
    };

    if let Err(err) = controller.engine().apply_settings(&next) {
        warn!("reloaded config rejected: {err}");
        return;
    }
    if next.affect != previous.affect {
        let backend = Arc::from(build_affect_backend(&next.affect));
        if let Err(err) = controller.switch_affect_backend(backend) {
            warn!("affect backend switch failed: {err:#}");
        }
    }
}

/// SIGHUP on unix; never fires elsewhere.
struct ReloadSignal {
    #[cfg(unix)]
    inner: tokio::signal::unix::Signal,
}

impl ReloadSignal {
    #[cfg(unix)]
    fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        let inner = signal(SignalKind::hangup()).context("failed to listen for SIGHUP")?;
        Ok(Self { inner })
    }

    #[cfg(not(unix))]
    fn new() -> Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) {
        self.inner.recv().await;
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}
