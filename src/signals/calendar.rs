use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::context::clock::{local_naive, parse_hhmm};
use crate::error::EngineError;

use super::CalendarReading;

/// A recurring busy period, e.g. a daily standup. Empty `days` means every day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusyBlock {
    #[serde(default = "default_block_name")]
    pub name: String,
    #[serde(default)]
    pub days: Vec<String>,
    pub start: String,
    pub end: String,
}

fn default_block_name() -> String {
    "busy".into()
}

#[derive(Debug, Clone)]
struct ParsedBlock {
    name: String,
    days: Vec<Weekday>,
    start: NaiveTime,
    end: NaiveTime,
}

/// Evaluates configured busy blocks against wall-clock time. Used whenever no
/// fresh external calendar reading is available.
#[derive(Debug, Clone)]
pub struct StaticCalendar {
    blocks: Vec<ParsedBlock>,
    utc_offset_minutes: Option<i32>,
}

impl StaticCalendar {
    pub fn new(blocks: &[BusyBlock], utc_offset_minutes: Option<i32>) -> Result<Self, EngineError> {
        let blocks = blocks
            .iter()
            .map(|block| {
                let days = block
                    .days
                    .iter()
                    .map(|day| parse_weekday(day))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ParsedBlock {
                    name: block.name.clone(),
                    days,
                    start: parse_hhmm(&block.start)?,
                    end: parse_hhmm(&block.end)?,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        Ok(Self {
            blocks,
            utc_offset_minutes,
        })
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> CalendarReading {
        let local = local_naive(now, self.utc_offset_minutes);
        let weekday = local.weekday();
        let time = local.time();

        self.blocks
            .iter()
            .filter(|block| block.days.is_empty() || block.days.contains(&weekday))
            .find(|block| block.start <= time && time <= block.end)
            .map(|block| CalendarReading {
                busy: true,
                event_name: Some(block.name.clone()),
                timestamp: now,
            })
            .unwrap_or_else(|| CalendarReading::free(now))
    }
}

fn parse_weekday(value: &str) -> Result<Weekday, EngineError> {
    let lower = value.trim().to_ascii_lowercase();
    let prefix = lower.get(..3).unwrap_or(lower.as_str());
    match prefix {
        "mon" => Ok(Weekday::Mon),
        "tue" => Ok(Weekday::Tue),
        "wed" => Ok(Weekday::Wed),
        "thu" => Ok(Weekday::Thu),
        "fri" => Ok(Weekday::Fri),
        "sat" => Ok(Weekday::Sat),
        "sun" => Ok(Weekday::Sun),
        _ => Err(EngineError::config(format!("unknown weekday '{value}' in busy block"))),
    }
}
