use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::SignalUnavailable;
use crate::settings::{AffectBackendKind, AffectSettings};

use super::{AffectBackend, AffectLabel, AffectReading};

/// Backend used when no camera model is configured: every poll reports no signal.
pub struct NoAffectBackend;

impl AffectBackend for NoAffectBackend {
    fn name(&self) -> &str {
        "none"
    }

    fn poll(&self) -> Result<AffectReading, SignalUnavailable> {
        Err(SignalUnavailable::new("affect", "no affect backend configured"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptStep {
    pub label: AffectLabel,
    pub confidence: f64,
}

/// Replays a fixed label/confidence sequence, cycling when it runs out.
/// Useful for demos and for exercising the smoother without a camera.
pub struct ScriptedAffectBackend {
    steps: Vec<ScriptStep>,
    cursor: AtomicUsize,
}

impl ScriptedAffectBackend {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl AffectBackend for ScriptedAffectBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn poll(&self) -> Result<AffectReading, SignalUnavailable> {
        if self.steps.is_empty() {
            return Err(SignalUnavailable::new("affect", "affect script is empty"));
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.steps.len();
        let step = &self.steps[index];
        Ok(AffectReading::new(step.label, step.confidence, Utc::now()))
    }
}

pub fn build_affect_backend(settings: &AffectSettings) -> Box<dyn AffectBackend> {
    match settings.backend {
        AffectBackendKind::None => Box::new(NoAffectBackend),
        AffectBackendKind::Scripted => Box::new(ScriptedAffectBackend::new(settings.script.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_backend_cycles_through_steps() {
        let backend = ScriptedAffectBackend::new(vec![
            ScriptStep {
                label: AffectLabel::Sad,
                confidence: 0.8,
            },
            ScriptStep {
                label: AffectLabel::Neutral,
                confidence: 0.6,
            },
        ]);

        let labels: Vec<AffectLabel> = (0..3).map(|_| backend.poll().unwrap().label).collect();
        assert_eq!(
            labels,
            vec![AffectLabel::Sad, AffectLabel::Neutral, AffectLabel::Sad]
        );
    }

    #[test]
    fn empty_script_and_none_backend_are_unavailable() {
        assert!(ScriptedAffectBackend::new(Vec::new()).poll().is_err());
        let err = NoAffectBackend.poll().unwrap_err();
        assert_eq!(err.signal, "affect");
    }
}
