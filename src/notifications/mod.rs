//! Where incoming notifications come from. Sources are polled from a blocking
//! task, so implementations may touch the filesystem directly.

pub mod demo;
pub mod directory;
pub mod file;
mod payload;

use chrono::{DateTime, Utc};

use crate::models::Notification;
use crate::settings::{NotificationSettings, SourceKind};

pub use demo::DemoNotificationSource;
pub use directory::DirectoryNotificationSource;
pub use file::JsonlNotificationSource;

pub trait NotificationSource: Send {
    fn id(&self) -> &str;

    /// Returns every notification that became available since the last poll.
    fn poll(&mut self, now: DateTime<Utc>) -> Vec<Notification>;
}

/// Builds the enabled sources. `demo_mode` forces a demo source on even when
/// the configuration disables or omits it.
pub fn build_sources(settings: &NotificationSettings, demo_mode: bool) -> Vec<Box<dyn NotificationSource>> {
    let mut sources: Vec<Box<dyn NotificationSource>> = Vec::new();
    let mut has_demo = false;

    for entry in &settings.sources {
        match entry.kind {
            SourceKind::Demo => {
                if !(entry.enabled || demo_mode) {
                    continue;
                }
                has_demo = true;
                sources.push(Box::new(DemoNotificationSource::new(
                    entry.id.clone(),
                    settings.demo_payloads.clone(),
                    entry.interval_secs.unwrap_or(settings.demo_interval_secs),
                    settings.title_prefix.clone(),
                )));
            }
            SourceKind::File => {
                let (true, Some(path)) = (entry.enabled, &entry.path) else {
                    continue;
                };
                sources.push(Box::new(JsonlNotificationSource::new(
                    entry.id.clone(),
                    path.clone(),
                    entry.category.clone(),
                )));
            }
            SourceKind::Directory => {
                let (true, Some(path)) = (entry.enabled, &entry.path) else {
                    continue;
                };
                sources.push(Box::new(DirectoryNotificationSource::new(
                    entry.id.clone(),
                    path.clone(),
                    entry.pattern.clone(),
                    entry.archive_path.clone(),
                    entry.category.clone(),
                )));
            }
        }
    }

    if demo_mode && !has_demo {
        sources.push(Box::new(DemoNotificationSource::new(
            "demo",
            settings.demo_payloads.clone(),
            settings.demo_interval_secs,
            settings.title_prefix.clone(),
        )));
    }
    sources
}
