//! Raw signal readings and the collaborator interfaces that produce them.
//!
//! Every collaborator is polled from a background task on `spawn_blocking`, so
//! implementations may block for the duration of one poll but must not hold
//! engine state while doing so.

pub mod affect;
pub mod apps;
pub mod calendar;
pub mod calendar_feed;
pub mod metrics;
pub mod types;

pub use affect::{build_affect_backend, NoAffectBackend, ScriptStep, ScriptedAffectBackend};
pub use apps::SysinfoAppTracker;
pub use calendar::{BusyBlock, StaticCalendar};
pub use calendar_feed::EventFileCalendar;
pub use metrics::SysinfoMetricsSampler;
pub use types::{AffectLabel, AffectReading, AppReading, CalendarReading, SystemMetrics};

use crate::error::SignalUnavailable;

pub trait AffectBackend: Send + Sync {
    fn name(&self) -> &str;
    fn poll(&self) -> Result<AffectReading, SignalUnavailable>;
}

pub trait AppTracker: Send + Sync {
    fn poll(&self) -> Result<AppReading, SignalUnavailable>;
}

pub trait CalendarSource: Send + Sync {
    fn poll(&self) -> Result<CalendarReading, SignalUnavailable>;
}

pub trait MetricsSampler: Send + Sync {
    fn sample(&self) -> Result<SystemMetrics, SignalUnavailable>;
}
