//! Confidence gating and smoothing of the raw affect stream.
//!
//! Readings below the confidence threshold (or with no face detected) count as
//! `unknown` with confidence 0: they pull the EMA down but never enter the
//! accepted-label history, so one blurry frame cannot flip the reported label.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};

use crate::settings::SmoothingSettings;
use crate::signals::{AffectLabel, AffectReading};

use super::snapshot::SmoothedAffect;

#[derive(Debug, Clone, Copy)]
struct Accepted {
    label: AffectLabel,
    confidence: f64,
}

#[derive(Debug, Clone)]
pub struct Smoother {
    settings: SmoothingSettings,
    ema_confidence: Option<f64>,
    history: VecDeque<Accepted>,
    last_accepted_at: Option<DateTime<Utc>>,
}

impl Smoother {
    pub fn new(settings: SmoothingSettings) -> Self {
        Self {
            history: VecDeque::with_capacity(settings.window),
            settings,
            ema_confidence: None,
            last_accepted_at: None,
        }
    }

    pub fn update(&mut self, reading: &AffectReading) -> SmoothedAffect {
        if self.is_stale(reading.timestamp) {
            self.history.clear();
        }

        // Negated comparison so NaN confidences are rejected too.
        let accepted = !reading.label.is_unknown()
            && !(reading.confidence < self.settings.conf_threshold)
            && reading.confidence.is_finite();
        let gated = if accepted {
            reading.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let alpha = self.settings.ema_alpha;
        self.ema_confidence = Some(match self.ema_confidence {
            Some(prev) => alpha * gated + (1.0 - alpha) * prev,
            None => gated,
        });

        if accepted {
            self.history.push_back(Accepted {
                label: reading.label,
                confidence: gated,
            });
            while self.history.len() > self.settings.window {
                self.history.pop_front();
            }
            self.last_accepted_at = Some(match self.last_accepted_at {
                Some(prev) if prev > reading.timestamp => prev,
                _ => reading.timestamp,
            });
        }

        self.current(reading.timestamp)
    }

    /// Current smoothed state as seen at `now`, without consuming a reading.
    pub fn current(&self, now: DateTime<Utc>) -> SmoothedAffect {
        let ema_confidence = self.ema_confidence.unwrap_or(0.0);
        let history: Vec<AffectLabel> = self.history.iter().map(|a| a.label).collect();

        if self.history.is_empty() || self.is_stale(now) {
            return SmoothedAffect {
                label: AffectLabel::Unknown,
                confidence: 0.0,
                ema_confidence,
                history,
            };
        }

        let label = self.majority_label();
        let confidence = self
            .history
            .iter()
            .rev()
            .find(|a| a.label == label)
            .map(|a| a.confidence)
            .unwrap_or(0.0);

        SmoothedAffect {
            label,
            confidence,
            ema_confidence,
            history,
        }
    }

    pub fn reset(&mut self) {
        self.ema_confidence = None;
        self.history.clear();
        self.last_accepted_at = None;
    }

    /// Most frequent accepted label; among tied labels the one seen most recently.
    fn majority_label(&self) -> AffectLabel {
        let mut counts: HashMap<AffectLabel, usize> = HashMap::new();
        for accepted in &self.history {
            *counts.entry(accepted.label).or_default() += 1;
        }
        let best = counts.values().copied().max().unwrap_or(0);

        self.history
            .iter()
            .rev()
            .map(|a| a.label)
            .find(|label| counts.get(label).copied() == Some(best))
            .unwrap_or(AffectLabel::Unknown)
    }

    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        if self.settings.staleness_secs == 0 {
            return false;
        }
        let limit = Duration::seconds(self.settings.staleness_secs.min(i64::MAX as u64 / 1000) as i64);
        self.last_accepted_at
            .map(|last| now - last > limit)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settings() -> SmoothingSettings {
        SmoothingSettings {
            ema_alpha: 0.5,
            window: 3,
            conf_threshold: 0.5,
            staleness_secs: 30,
        }
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn reading(label: AffectLabel, confidence: f64, secs: i64) -> AffectReading {
        AffectReading::new(label, confidence, t(secs))
    }

    #[test]
    fn low_confidence_readings_stay_unknown_until_one_is_accepted() {
        let mut smoother = Smoother::new(settings());
        for i in 0..5 {
            let out = smoother.update(&reading(AffectLabel::Angry, 0.3, i));
            assert_eq!(out.label, AffectLabel::Unknown);
            assert!(out.history.is_empty());
        }

        let out = smoother.update(&reading(AffectLabel::Sad, 0.7, 5));
        assert_eq!(out.label, AffectLabel::Sad);
        assert_eq!(out.confidence, 0.7);
    }

    #[test]
    fn gated_reading_does_not_overwrite_the_dominant_label() {
        let mut smoother = Smoother::new(settings());
        smoother.update(&reading(AffectLabel::Happiness, 0.9, 0));
        let out = smoother.update(&reading(AffectLabel::Unknown, 0.0, 1));
        assert_eq!(out.label, AffectLabel::Happiness);
        // EMA still moved: 0.5 * 0 + 0.5 * 0.9
        assert!((out.ema_confidence - 0.45).abs() < 1e-9);
    }

    #[test]
    fn ema_follows_the_recurrence() {
        let mut smoother = Smoother::new(settings());
        smoother.update(&reading(AffectLabel::Neutral, 0.8, 0));
        let out = smoother.update(&reading(AffectLabel::Neutral, 0.6, 1));
        assert!((out.ema_confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn majority_over_window_with_recent_tie_break() {
        let mut smoother = Smoother::new(settings());
        smoother.update(&reading(AffectLabel::Sad, 0.9, 0));
        smoother.update(&reading(AffectLabel::Sad, 0.9, 1));
        let out = smoother.update(&reading(AffectLabel::Happiness, 0.9, 2));
        assert_eq!(out.label, AffectLabel::Sad);

        // Window is now [sad, happiness, neutral]: three-way tie, newest wins.
        let out = smoother.update(&reading(AffectLabel::Neutral, 0.9, 3));
        assert_eq!(out.label, AffectLabel::Neutral);
        assert_eq!(
            out.history,
            vec![AffectLabel::Sad, AffectLabel::Happiness, AffectLabel::Neutral]
        );
    }

    #[test]
    fn label_degrades_to_unknown_when_stale() {
        let mut smoother = Smoother::new(settings());
        smoother.update(&reading(AffectLabel::Fear, 0.8, 0));
        assert_eq!(smoother.current(t(30)).label, AffectLabel::Fear);
        assert_eq!(smoother.current(t(31)).label, AffectLabel::Unknown);

        // Old history is dropped once a new reading arrives after the gap.
        let out = smoother.update(&reading(AffectLabel::Neutral, 0.8, 60));
        assert_eq!(out.history, vec![AffectLabel::Neutral]);
    }

    #[test]
    fn nan_confidence_is_gated() {
        let mut smoother = Smoother::new(settings());
        let out = smoother.update(&reading(AffectLabel::Angry, f64::NAN, 0));
        assert_eq!(out.label, AffectLabel::Unknown);
        assert_eq!(out.ema_confidence, 0.0);
    }

    #[test]
    fn same_inputs_give_same_outputs() {
        let inputs = [
            reading(AffectLabel::Sad, 0.6, 0),
            reading(AffectLabel::Angry, 0.2, 1),
            reading(AffectLabel::Neutral, 0.9, 2),
        ];
        let run = || {
            let mut smoother = Smoother::new(settings());
            inputs.iter().map(|r| smoother.update(r)).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
