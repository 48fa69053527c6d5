use chrono::{DateTime, Duration, NaiveTime, Utc};

use crate::error::{EngineError, SignalUnavailable};
use crate::settings::EngineSettings;
use crate::signals::{AffectReading, AppReading, CalendarReading, StaticCalendar, SystemMetrics};

use super::classify::AppClassifier;
use super::clock::{local_naive, parse_hhmm, time_of_day, within_window};
use super::smoother::Smoother;
use super::snapshot::{AppCategory, ContextSnapshot, SmoothedAffect, UNKNOWN_APP};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Latest value of every signal, merged in by the pollers between ticks.
#[derive(Debug, Default)]
struct SignalBoard {
    app: Option<AppReading>,
    calendar: Option<CalendarReading>,
    metrics: Option<SystemMetrics>,
}

/// Fuses the signal board into a `ContextSnapshot` once per tick.
///
/// Every signal has a documented default (affect unknown, app unknown, calendar
/// free, zeroed metrics), so a tick always produces a snapshot no matter which
/// pollers are failing.
pub struct ContextAggregator {
    smoother: Smoother,
    board: SignalBoard,
    classifier: AppClassifier,
    fallback_calendar: StaticCalendar,
    use_external_calendar: bool,
    max_calendar_age: Duration,
    work_start: NaiveTime,
    work_end: NaiveTime,
    utc_offset_minutes: Option<i32>,
}

impl ContextAggregator {
    pub fn new(settings: &EngineSettings) -> Result<Self, EngineError> {
        let utc_offset_minutes = settings.context.utc_offset_minutes;
        Ok(Self {
            smoother: Smoother::new(settings.smoothing.clone()),
            board: SignalBoard::default(),
            classifier: AppClassifier::new(&settings.apps),
            fallback_calendar: StaticCalendar::new(&settings.calendar.busy_blocks, utc_offset_minutes)?,
            use_external_calendar: settings.calendar.use_external,
            max_calendar_age: Duration::seconds(settings.calendar.max_reading_age_secs.min(1 << 40) as i64),
            work_start: parse_hhmm(&settings.context.work_hours.start)?,
            work_end: parse_hhmm(&settings.context.work_hours.end)?,
            utc_offset_minutes,
        })
    }

    /// Feeds one affect poll through the smoother. A failed poll counts as a
    /// no-signal reading: it lowers the EMA but keeps the dominant label.
    pub fn record_affect(
        &mut self,
        result: Result<AffectReading, SignalUnavailable>,
        now: DateTime<Utc>,
    ) -> SmoothedAffect {
        let reading = match result {
            Ok(reading) => reading,
            Err(err) => {
                log_debug!("{err}");
                AffectReading::no_signal(now)
            }
        };
        self.smoother.update(&reading)
    }

    pub fn record_app(&mut self, result: Result<AppReading, SignalUnavailable>) {
        self.board.app = match result {
            Ok(reading) => Some(reading),
            Err(err) => {
                log_debug!("{err}; active app degrades to unknown");
                None
            }
        };
    }

    pub fn record_calendar(&mut self, result: Result<CalendarReading, SignalUnavailable>) {
        self.board.calendar = match result {
            Ok(reading) => Some(reading),
            Err(err) => {
                log_debug!("{err}; using static busy blocks");
                None
            }
        };
    }

    pub fn record_metrics(&mut self, result: Result<SystemMetrics, SignalUnavailable>) {
        match result {
            Ok(metrics) => self.board.metrics = Some(metrics),
            Err(err) => log_debug!("{err}; keeping previous metrics"),
        }
    }

    pub fn reset_affect(&mut self) {
        self.smoother.reset();
    }

    pub fn tick(&self, now: DateTime<Utc>) -> ContextSnapshot {
        let (active_app, app_category) = match &self.board.app {
            Some(reading) => (
                reading.app_name.clone(),
                self.classifier.classify(&reading.app_name),
            ),
            None => (UNKNOWN_APP.to_string(), AppCategory::Unknown),
        };

        let calendar = self.calendar_state(now);
        let local = local_naive(now, self.utc_offset_minutes).time();

        ContextSnapshot {
            timestamp: now,
            affect: self.smoother.current(now),
            active_app,
            app_category,
            calendar_busy: calendar.busy,
            calendar_event: calendar.event_name,
            time_of_day: time_of_day(local),
            is_work_hours: within_window(local, self.work_start, self.work_end),
            system_metrics: self.board.metrics.clone().unwrap_or_default(),
        }
    }

    fn calendar_state(&self, now: DateTime<Utc>) -> CalendarReading {
        if self.use_external_calendar {
            if let Some(reading) = &self.board.calendar {
                if now - reading.timestamp <= self.max_calendar_age {
                    return reading.clone();
                }
            }
        }
        self.fallback_calendar.state_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TimeOfDay;
    use crate::signals::{AffectLabel, BusyBlock};
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        // Monday
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn settings() -> EngineSettings {
        let mut settings = EngineSettings::default();
        settings.context.utc_offset_minutes = Some(0);
        settings.apps.focus = vec!["rustrover".into()];
        settings.calendar.busy_blocks = vec![BusyBlock {
            name: "lunch review".into(),
            days: Vec::new(),
            start: "11:30".into(),
            end: "12:30".into(),
        }];
        settings
    }

    #[test]
    fn tick_with_no_signals_uses_defaults() {
        let mut settings = settings();
        settings.calendar.busy_blocks.clear();
        let aggregator = ContextAggregator::new(&settings).unwrap();

        let snapshot = aggregator.tick(noon());
        assert_eq!(snapshot.affect.label, AffectLabel::Unknown);
        assert_eq!(snapshot.active_app, UNKNOWN_APP);
        assert_eq!(snapshot.app_category, AppCategory::Unknown);
        assert!(!snapshot.calendar_busy);
        assert_eq!(snapshot.system_metrics, SystemMetrics::default());
        assert_eq!(snapshot.time_of_day, TimeOfDay::Afternoon);
        assert!(snapshot.is_work_hours);
    }

    #[test]
    fn merges_latest_readings() {
        let mut aggregator = ContextAggregator::new(&settings()).unwrap();
        aggregator.record_affect(
            Ok(AffectReading::new(AffectLabel::Happiness, 0.9, noon())),
            noon(),
        );
        aggregator.record_app(Ok(AppReading {
            app_name: "RustRover".into(),
            timestamp: noon(),
        }));

        let snapshot = aggregator.tick(noon());
        assert_eq!(snapshot.affect.label, AffectLabel::Happiness);
        assert_eq!(snapshot.app_category, AppCategory::Focus);
        assert!(snapshot.calendar_busy);
        assert_eq!(snapshot.calendar_event.as_deref(), Some("lunch review"));
    }

    #[test]
    fn failed_app_poll_degrades_to_unknown() {
        let mut aggregator = ContextAggregator::new(&settings()).unwrap();
        aggregator.record_app(Ok(AppReading {
            app_name: "rustrover".into(),
            timestamp: noon(),
        }));
        aggregator.record_app(Err(SignalUnavailable::new("app", "tracker crashed")));

        let snapshot = aggregator.tick(noon());
        assert_eq!(snapshot.active_app, UNKNOWN_APP);
        assert_eq!(snapshot.app_category, AppCategory::Unknown);
    }

    #[test]
    fn external_calendar_falls_back_to_static_blocks() {
        let mut settings = settings();
        settings.calendar.use_external = true;
        let mut aggregator = ContextAggregator::new(&settings).unwrap();

        aggregator.record_calendar(Ok(CalendarReading::free(noon())));
        assert!(!aggregator.tick(noon()).calendar_busy);

        aggregator.record_calendar(Err(SignalUnavailable::new("calendar", "offline")));
        let snapshot = aggregator.tick(noon());
        assert!(snapshot.calendar_busy);
        assert_eq!(snapshot.calendar_event.as_deref(), Some("lunch review"));
    }

    #[test]
    fn stale_external_calendar_reading_is_ignored() {
        let mut settings = settings();
        settings.calendar.use_external = true;
        settings.calendar.max_reading_age_secs = 60;
        let mut aggregator = ContextAggregator::new(&settings).unwrap();

        aggregator.record_calendar(Ok(CalendarReading::free(noon() - Duration::seconds(120))));
        assert!(aggregator.tick(noon()).calendar_busy);
    }

    #[test]
    fn failed_affect_poll_keeps_dominant_label() {
        let mut aggregator = ContextAggregator::new(&settings()).unwrap();
        aggregator.record_affect(Ok(AffectReading::new(AffectLabel::Sad, 0.8, noon())), noon());
        let affect = aggregator.record_affect(
            Err(SignalUnavailable::new("affect", "no face")),
            noon() + Duration::seconds(1),
        );
        assert_eq!(affect.label, AffectLabel::Sad);
        assert!(affect.ema_confidence < 0.8);
    }
}
