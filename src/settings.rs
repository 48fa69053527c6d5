use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};

use crate::context::clock::parse_hhmm;
use crate::error::EngineError;
use crate::rules::engine::MAX_DEFER_SECS;
use crate::rules::{default_rules, DecisionPolicy, Rule, RuleSet};
use crate::signals::{BusyBlock, ScriptStep, StaticCalendar};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SmoothingSettings {
    pub ema_alpha: f64,
    pub window: usize,
    pub conf_threshold: f64,
    /// Seconds without an accepted reading before affect reads as unknown; 0 disables.
    pub staleness_secs: u64,
}

impl Default for SmoothingSettings {
    fn default() -> Self {
        Self {
            ema_alpha: 0.5,
            window: 3,
            conf_threshold: 0.5,
            staleness_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingSettings {
    pub affect_interval_secs: u64,
    pub app_interval_secs: u64,
    pub calendar_interval_secs: u64,
    pub metrics_interval_secs: u64,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            affect_interval_secs: 1,
            app_interval_secs: 2,
            calendar_interval_secs: 60,
            metrics_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AggregationSettings {
    pub tick_interval_secs: u64,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerSettings {
    pub defer_duration_secs: u64,
    pub batch_window_secs: u64,
    pub batch_max_size: usize,
    pub batching_enabled: bool,
    pub named_deferrals: BTreeMap<String, u64>,
    /// Release everything still pending on shutdown instead of recording it.
    pub release_pending_on_shutdown: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            defer_duration_secs: 900,
            batch_window_secs: 1500,
            batch_max_size: 10,
            batching_enabled: true,
            named_deferrals: BTreeMap::from([("focus".into(), 900), ("sad".into(), 600)]),
            release_pending_on_shutdown: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub focus: Vec<String>,
    pub casual: Vec<String>,
    pub use_builtin_keywords: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            focus: Vec::new(),
            casual: Vec::new(),
            use_builtin_keywords: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkHours {
    pub start: String,
    pub end: String,
}

impl Default for WorkHours {
    fn default() -> Self {
        Self {
            start: "09:00".into(),
            end: "17:00".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextSettings {
    pub work_hours: WorkHours,
    /// Fixed offset for local-time rules; the host zone is used when unset.
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CalendarSettings {
    pub use_external: bool,
    /// Exported calendar events (JSON) read when `use_external` is set.
    pub events_path: Option<PathBuf>,
    pub max_reading_age_secs: u64,
    pub busy_blocks: Vec<BusyBlock>,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            use_external: false,
            events_path: None,
            max_reading_age_secs: 300,
            busy_blocks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AffectBackendKind {
    #[default]
    None,
    Scripted,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AffectSettings {
    pub backend: AffectBackendKind,
    pub script: Vec<ScriptStep>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Demo,
    File,
    Directory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceSettings {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Demo sources only; falls back to `demo_interval_secs`.
    #[serde(default)]
    pub interval_secs: Option<u64>,
    /// File sources: a JSON-lines file. Directory sources: the drop folder.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub category: Option<String>,
    /// Directory sources only; defaults to `*.json`.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Directory sources only: consumed files are moved here instead of deleted.
    #[serde(default)]
    pub archive_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationSettings {
    pub poll_interval_secs: u64,
    pub demo_interval_secs: u64,
    pub demo_payloads: Vec<String>,
    pub title_prefix: String,
    pub sources: Vec<SourceSettings>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            demo_interval_secs: 30,
            demo_payloads: vec!["Demo notification".into()],
            title_prefix: "[FocusFrame]".into(),
            sources: vec![SourceSettings {
                id: "demo".into(),
                kind: SourceKind::Demo,
                enabled: true,
                interval_secs: None,
                path: None,
                category: None,
                pattern: None,
                archive_path: None,
            }],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    pub database_path: Option<PathBuf>,
    /// Also persist every context snapshot to the event table.
    pub record_snapshots: bool,
}

impl StorageSettings {
    pub fn resolved_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("focusframe.db"))
    }
}

/// Full engine configuration. Every key is optional; unknown keys are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub smoothing: SmoothingSettings,
    pub sampling: SamplingSettings,
    pub aggregation: AggregationSettings,
    pub scheduler: SchedulerSettings,
    pub apps: AppSettings,
    pub context: ContextSettings,
    pub calendar: CalendarSettings,
    pub affect: AffectSettings,
    pub notifications: NotificationSettings,
    pub storage: StorageSettings,
    pub rules: Vec<Rule>,
    pub profiles: BTreeMap<String, Vec<Rule>>,
    pub active_profile: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            smoothing: SmoothingSettings::default(),
            sampling: SamplingSettings::default(),
            aggregation: AggregationSettings::default(),
            scheduler: SchedulerSettings::default(),
            apps: AppSettings::default(),
            context: ContextSettings::default(),
            calendar: CalendarSettings::default(),
            affect: AffectSettings::default(),
            notifications: NotificationSettings::default(),
            storage: StorageSettings::default(),
            rules: default_rules(),
            profiles: BTreeMap::new(),
            active_profile: None,
        }
    }
}

impl EngineSettings {
    /// Reads and validates a config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        Self::from_json_str(&contents)
            .with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let settings: EngineSettings =
            serde_json::from_str(contents).context("Failed to parse config JSON")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let smoothing = &self.smoothing;
        if !(smoothing.ema_alpha > 0.0 && smoothing.ema_alpha <= 1.0) {
            return Err(EngineError::config("smoothing.ema_alpha must be within (0, 1]"));
        }
        if smoothing.window == 0 {
            return Err(EngineError::config("smoothing.window must be at least 1"));
        }
        if !(0.0..=1.0).contains(&smoothing.conf_threshold) {
            return Err(EngineError::config(
                "smoothing.conf_threshold must be within [0, 1]",
            ));
        }

        let sampling = &self.sampling;
        for (name, value) in [
            ("sampling.affect_interval_secs", sampling.affect_interval_secs),
            ("sampling.app_interval_secs", sampling.app_interval_secs),
            ("sampling.calendar_interval_secs", sampling.calendar_interval_secs),
            ("sampling.metrics_interval_secs", sampling.metrics_interval_secs),
            ("aggregation.tick_interval_secs", self.aggregation.tick_interval_secs),
            ("notifications.poll_interval_secs", self.notifications.poll_interval_secs),
            ("notifications.demo_interval_secs", self.notifications.demo_interval_secs),
            ("scheduler.batch_window_secs", self.scheduler.batch_window_secs),
        ] {
            if value == 0 {
                return Err(EngineError::config(format!("{name} must be greater than 0")));
            }
        }
        if self.scheduler.batch_window_secs > MAX_DEFER_SECS {
            return Err(EngineError::config("scheduler.batch_window_secs is too large"));
        }
        if self.scheduler.batch_max_size == 0 {
            return Err(EngineError::config("scheduler.batch_max_size must be at least 1"));
        }
        if self.scheduler.defer_duration_secs == 0 || self.scheduler.defer_duration_secs > MAX_DEFER_SECS {
            return Err(EngineError::config(
                "scheduler.defer_duration_secs must be between 1 and one year",
            ));
        }
        for (key, secs) in &self.scheduler.named_deferrals {
            if *secs == 0 || *secs > MAX_DEFER_SECS {
                return Err(EngineError::config(format!(
                    "scheduler.named_deferrals.{key} must be between 1 and one year"
                )));
            }
        }

        parse_hhmm(&self.context.work_hours.start)?;
        parse_hhmm(&self.context.work_hours.end)?;
        if let Some(offset) = self.context.utc_offset_minutes {
            if offset.abs() >= 24 * 60 {
                return Err(EngineError::config(
                    "context.utc_offset_minutes must be within one day",
                ));
            }
        }
        StaticCalendar::new(&self.calendar.busy_blocks, self.context.utc_offset_minutes)?;

        for source in &self.notifications.sources {
            let needs_path = matches!(source.kind, SourceKind::File | SourceKind::Directory);
            if needs_path && source.enabled && source.path.is_none() {
                return Err(EngineError::config(format!(
                    "notification source '{}' needs a path",
                    source.id
                )));
            }
        }

        self.rule_set()?;
        // Profiles are validated up front so a later switch cannot fail on them.
        for name in self.profiles.keys() {
            self.rule_set_for(Some(name))?;
        }
        Ok(())
    }

    pub fn decision_policy(&self) -> DecisionPolicy {
        DecisionPolicy {
            default_defer_secs: self.scheduler.defer_duration_secs,
            named_deferrals: self.scheduler.named_deferrals.clone(),
            batching_enabled: self.scheduler.batching_enabled,
        }
    }

    /// Rules of the active profile, or the top-level `rules` when none is selected.
    pub fn active_rules(&self) -> Result<&[Rule], EngineError> {
        self.rules_for(self.active_profile.as_deref())
    }

    pub fn rule_set(&self) -> Result<RuleSet, EngineError> {
        self.rule_set_for(self.active_profile.as_deref())
    }

    pub fn rule_set_for(&self, profile: Option<&str>) -> Result<RuleSet, EngineError> {
        RuleSet::new(self.rules_for(profile)?.to_vec(), self.decision_policy())
    }

    fn rules_for(&self, profile: Option<&str>) -> Result<&[Rule], EngineError> {
        match profile {
            None => Ok(&self.rules),
            Some(name) => self
                .profiles
                .get(name)
                .map(Vec::as_slice)
                .ok_or_else(|| EngineError::config(format!("unknown profile '{name}'"))),
        }
    }
}

/// Owns the current configuration and its backing file.
pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<EngineSettings>,
}

impl ConfigStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        let data = EngineSettings::load(&path)?;
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn current(&self) -> EngineSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-reads the backing file. An invalid file leaves the current config active.
    pub fn reload(&self) -> Result<EngineSettings> {
        let data = EngineSettings::load(&self.path)?;
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        *guard = data.clone();
        Ok(data)
    }

    /// Selects a rule profile (`None` for the top-level rules) and persists it.
    pub fn set_active_profile(&self, profile: Option<String>) -> Result<EngineSettings> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        next.active_profile = profile;
        next.rule_set()?;
        self.persist(&next)?;
        *guard = next.clone();
        Ok(next)
    }

    fn persist(&self, data: &EngineSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write config to {}", self.path.display()))
    }
}
