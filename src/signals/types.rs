use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Affect classes produced by the emotion backends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AffectLabel {
    Angry,
    Disgust,
    Fear,
    #[serde(alias = "happy")]
    Happiness,
    Sad,
    Surprise,
    Neutral,
    Contempt,
    Unknown,
}

impl Default for AffectLabel {
    fn default() -> Self {
        AffectLabel::Unknown
    }
}

impl AffectLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AffectLabel::Angry => "angry",
            AffectLabel::Disgust => "disgust",
            AffectLabel::Fear => "fear",
            AffectLabel::Happiness => "happiness",
            AffectLabel::Sad => "sad",
            AffectLabel::Surprise => "surprise",
            AffectLabel::Neutral => "neutral",
            AffectLabel::Contempt => "contempt",
            AffectLabel::Unknown => "unknown",
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, AffectLabel::Unknown)
    }
}

impl fmt::Display for AffectLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AffectLabel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "angry" => Ok(AffectLabel::Angry),
            "disgust" => Ok(AffectLabel::Disgust),
            "fear" => Ok(AffectLabel::Fear),
            "happy" | "happiness" => Ok(AffectLabel::Happiness),
            "sad" => Ok(AffectLabel::Sad),
            "surprise" => Ok(AffectLabel::Surprise),
            "neutral" => Ok(AffectLabel::Neutral),
            "contempt" => Ok(AffectLabel::Contempt),
            "unknown" => Ok(AffectLabel::Unknown),
            other => Err(format!("unknown affect label '{other}'")),
        }
    }
}

/// One poll of an affect backend. `Unknown` means no face or signal was detected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AffectReading {
    pub label: AffectLabel,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl AffectReading {
    pub fn new(label: AffectLabel, confidence: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            label,
            confidence,
            timestamp,
        }
    }

    pub fn no_signal(timestamp: DateTime<Utc>) -> Self {
        Self::new(AffectLabel::Unknown, 0.0, timestamp)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppReading {
    pub app_name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarReading {
    pub busy: bool,
    pub event_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CalendarReading {
    pub fn free(timestamp: DateTime<Utc>) -> Self {
        Self {
            busy: false,
            event_name: None,
            timestamp,
        }
    }
}

/// Host load at sampling time. `net_bytes` is total bytes sent plus received.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SystemMetrics {
    pub cpu_pct: f32,
    pub mem_pct: f32,
    pub battery: Option<f32>,
    pub net_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_is_an_alias_for_happiness() {
        let parsed: AffectLabel = serde_json::from_str("\"happy\"").unwrap();
        assert_eq!(parsed, AffectLabel::Happiness);
        assert_eq!("Happy".parse::<AffectLabel>().unwrap(), AffectLabel::Happiness);
        assert_eq!(
            serde_json::to_string(&AffectLabel::Happiness).unwrap(),
            "\"happiness\""
        );
    }

    #[test]
    fn rejects_labels_outside_the_supported_set() {
        assert!("bored".parse::<AffectLabel>().is_err());
        assert!(serde_json::from_str::<AffectLabel>("\"bored\"").is_err());
    }
}
