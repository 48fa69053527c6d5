use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::SignalUnavailable;

use super::{CalendarReading, CalendarSource};

#[derive(Debug, Deserialize)]
struct EventTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarEvent {
    summary: Option<String>,
    start: EventTime,
    end: EventTime,
}

/// Either a calendar API listing (`{"items": [...]}`) or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EventFeed {
    Listing { items: Vec<CalendarEvent> },
    Events(Vec<CalendarEvent>),
}

/// Reads calendar events exported to a JSON file by an external sync job.
/// The file is re-read on every poll. All-day events (no `dateTime`) never
/// mark the user busy.
pub struct EventFileCalendar {
    path: PathBuf,
}

impl EventFileCalendar {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> Result<CalendarReading, SignalUnavailable> {
        let text = fs::read_to_string(&self.path).map_err(|err| {
            SignalUnavailable::new("calendar", format!("{}: {err}", self.path.display()))
        })?;
        let feed: EventFeed = serde_json::from_str(&text).map_err(|err| {
            SignalUnavailable::new("calendar", format!("{}: {err}", self.path.display()))
        })?;
        let events = match feed {
            EventFeed::Listing { items } => items,
            EventFeed::Events(events) => events,
        };

        let current = events.into_iter().find(|event| {
            match (parse_time(&event.start), parse_time(&event.end)) {
                (Some(start), Some(end)) => start <= now && now <= end,
                _ => false,
            }
        });
        Ok(match current {
            Some(event) => CalendarReading {
                busy: true,
                event_name: Some(event.summary.unwrap_or_else(|| "Busy".into())),
                timestamp: now,
            },
            None => CalendarReading::free(now),
        })
    }
}

impl CalendarSource for EventFileCalendar {
    fn poll(&self) -> Result<CalendarReading, SignalUnavailable> {
        self.state_at(Utc::now())
    }
}

fn parse_time(time: &EventTime) -> Option<DateTime<Utc>> {
    let text = time.date_time.as_deref()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
