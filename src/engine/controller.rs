use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{bail, Result};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::notifications::{build_sources, NotificationSource};
use crate::scheduler::PendingNotification;
use crate::settings::{CalendarSettings, EngineSettings};
use crate::signals::{
    build_affect_backend, AffectBackend, AppTracker, CalendarSource, EventFileCalendar,
    MetricsSampler, SysinfoAppTracker, SysinfoMetricsSampler,
};
use crate::warn_once;

use super::loop_worker::engine_loop;
use super::pollers::{poll_loop, source_loop};
use super::Engine;

/// Everything the engine polls. Missing collaborators leave their signal at
/// its default.
pub struct Collaborators {
    pub affect: Arc<dyn AffectBackend>,
    pub apps: Option<Arc<dyn AppTracker>>,
    pub calendar: Option<Arc<dyn CalendarSource>>,
    pub metrics: Option<Arc<dyn MetricsSampler>>,
    pub sources: Vec<Box<dyn NotificationSource>>,
}

impl Collaborators {
    /// The collaborators shipped with the crate, chosen by configuration.
    pub fn from_settings(settings: &EngineSettings, demo_mode: bool) -> Self {
        Self {
            affect: Arc::from(build_affect_backend(&settings.affect)),
            apps: Some(Arc::new(SysinfoAppTracker::default())),
            calendar: external_calendar(&settings.calendar),
            metrics: Some(Arc::new(SysinfoMetricsSampler::default())),
            sources: build_sources(&settings.notifications, demo_mode),
        }
    }
}

fn external_calendar(settings: &CalendarSettings) -> Option<Arc<dyn CalendarSource>> {
    if !settings.use_external {
        return None;
    }
    match &settings.events_path {
        Some(path) => {
            info!("external calendar: {}", path.display());
            Some(Arc::new(EventFileCalendar::new(path.clone())))
        }
        None => {
            warn!("calendar.use_external is set without calendar.events_path; using busy blocks only");
            None
        }
    }
}

type AffectSlot = Arc<RwLock<Arc<dyn AffectBackend>>>;

/// Starts and stops the background loop and poller tasks around one engine.
pub struct EngineController {
    engine: Arc<Engine>,
    affect: Option<AffectSlot>,
    handles: Vec<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl EngineController {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            affect: None,
            handles: Vec::new(),
            cancel_token: None,
        }
    }

    pub fn engine(&self) -> Arc<Engine> {
        self.engine.clone()
    }

    pub fn is_running(&self) -> bool {
        self.cancel_token.is_some()
    }

    pub fn start(&mut self, collaborators: Collaborators, settings: &EngineSettings) -> Result<()> {
        if self.is_running() {
            bail!("engine already running");
        }

        let cancel_token = CancellationToken::new();
        let sampling = &settings.sampling;
        let Collaborators {
            affect,
            apps,
            calendar,
            metrics,
            sources,
        } = collaborators;

        self.handles.push(tokio::spawn(engine_loop(
            self.engine.clone(),
            Duration::from_secs(settings.aggregation.tick_interval_secs),
            cancel_token.clone(),
        )));

        info!("affect backend: {}", affect.name());
        let slot: AffectSlot = Arc::new(RwLock::new(affect));
        let engine = self.engine.clone();
        let reader = slot.clone();
        self.handles.push(tokio::spawn(poll_loop(
            "affect",
            Duration::from_secs(sampling.affect_interval_secs),
            cancel_token.clone(),
            move |_| {
                let backend = reader.read().unwrap_or_else(PoisonError::into_inner).clone();
                backend.poll()
            },
            move |result, now| {
                if let Err(err) = &result {
                    warn_once!("affect readings unavailable ({err}); affect stays unknown");
                }
                engine.submit_affect(result, now);
            },
        )));
        self.affect = Some(slot);

        if let Some(apps) = apps {
            let engine = self.engine.clone();
            self.handles.push(tokio::spawn(poll_loop(
                "app",
                Duration::from_secs(sampling.app_interval_secs),
                cancel_token.clone(),
                move |_| apps.poll(),
                move |result, _| engine.submit_app(result),
            )));
        }

        if let Some(calendar) = calendar {
            let engine = self.engine.clone();
            self.handles.push(tokio::spawn(poll_loop(
                "calendar",
                Duration::from_secs(sampling.calendar_interval_secs),
                cancel_token.clone(),
                move |_| calendar.poll(),
                move |result, _| engine.submit_calendar(result),
            )));
        }

        if let Some(metrics) = metrics {
            let engine = self.engine.clone();
            self.handles.push(tokio::spawn(poll_loop(
                "metrics",
                Duration::from_secs(sampling.metrics_interval_secs),
                cancel_token.clone(),
                move |_| metrics.sample(),
                move |result, _| engine.submit_metrics(result),
            )));
        }

        let source_period = Duration::from_secs(settings.notifications.poll_interval_secs);
        for source in sources {
            info!("notification source: {}", source.id());
            self.handles.push(tokio::spawn(source_loop(
                self.engine.clone(),
                source,
                source_period,
                cancel_token.clone(),
            )));
        }

        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Swaps the affect backend in place. Smoothed affect is reset so readings
    /// from the old backend do not vote alongside the new one.
    pub fn switch_affect_backend(&self, backend: Arc<dyn AffectBackend>) -> Result<()> {
        let Some(slot) = &self.affect else {
            bail!("engine not running");
        };
        info!("switching affect backend to {}", backend.name());
        *slot.write().unwrap_or_else(PoisonError::into_inner) = backend;
        self.engine.reset_affect();
        Ok(())
    }

    /// Stops every task, then empties the scheduler. Returns the items to
    /// persist; empty when `release_pending` dispatched them instead. A task
    /// that panicked is logged and does not cost the pending items.
    pub async fn stop(&mut self, release_pending: bool) -> Vec<PendingNotification> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.affect = None;

        for handle in self.handles.drain(..) {
            if let Err(err) = handle.await {
                error!("engine task failed to join: {err}");
            }
        }

        self.engine.finish_pending(release_pending)
    }
}
