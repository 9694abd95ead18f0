use crate::input::KeyBindings;
use lexmask_core::{StimulusItem, duration_from_secs};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Read-only configuration snapshot for one session. Durations are written
/// in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    pub words: Vec<String>,
    pub pseudowords: Vec<String>,
    #[serde(with = "secs_list")]
    pub durations: Vec<Duration>,
    pub timing: TimingConfig,
    pub design: DesignConfig,
    pub practice: PracticeConfig,
    pub keys: KeyBindings,
    /// Exchanges the word and nonword keys, for counterbalancing.
    pub swap_keys: bool,
    pub mask_glyph: char,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    #[serde(with = "secs")]
    pub fixation: Duration,
    #[serde(with = "secs")]
    pub mask: Duration,
    #[serde(with = "secs")]
    pub response_timeout: Duration,
    #[serde(with = "secs")]
    pub feedback: Duration,
    #[serde(with = "secs")]
    pub inter_trial: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DesignConfig {
    pub repetitions: usize,
    /// Longest allowed run of same-lexicality trials.
    pub max_run: usize,
    pub shuffle_attempts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PracticeConfig {
    pub enabled: bool,
    pub words: Vec<String>,
    pub pseudowords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// `false` turns the clean filter off for every summary.
    pub clean: bool,
    /// Inclusive plausible RT bounds in seconds; `None` disables filtering.
    pub clean_window: Option<(f64, f64)>,
}

impl AnalysisConfig {
    /// The window summaries should apply, if any.
    pub fn window(&self) -> Option<(f64, f64)> {
        self.clean_window.filter(|_| self.clean)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            words: strings(&[
                "garden", "window", "table", "dream", "silver", "candle", "forest", "winter",
                "yellow", "sudden",
            ]),
            pseudowords: strings(&[
                "drean", "gardon", "tible", "windal", "plone", "froat", "nemp", "slinter",
                "brask", "marden",
            ]),
            durations: vec![Duration::from_millis(40), Duration::from_millis(200)],
            timing: TimingConfig::default(),
            design: DesignConfig::default(),
            practice: PracticeConfig::default(),
            keys: KeyBindings::default(),
            swap_keys: false,
            mask_glyph: '#',
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            fixation: Duration::from_millis(500),
            mask: Duration::from_millis(150),
            response_timeout: Duration::from_millis(2000),
            feedback: Duration::from_millis(500),
            inter_trial: Duration::ZERO,
        }
    }
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            repetitions: 1,
            max_run: 3,
            shuffle_attempts: 1000,
        }
    }
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            words: strings(&["house", "river", "bread"]),
            pseudowords: strings(&["brike", "flurn", "plave"]),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            clean: true,
            clean_window: Some((0.2, 2.0)),
        }
    }
}

impl ExperimentConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.words.is_empty() || self.pseudowords.is_empty() {
            return invalid("catalog needs at least one word and one pseudoword".into());
        }
        if let Some(blank) = self
            .words
            .iter()
            .chain(&self.pseudowords)
            .chain(&self.practice.words)
            .chain(&self.practice.pseudowords)
            .find(|s| s.trim().is_empty())
        {
            return invalid(format!("blank stimulus {blank:?}"));
        }
        if self.durations.is_empty() {
            return invalid("at least one presentation duration is required".into());
        }
        if self.durations.iter().any(|d| d.is_zero()) {
            return invalid("presentation durations must be positive".into());
        }
        let mut levels = HashSet::new();
        if let Some(repeated) = self.durations.iter().find(|d| !levels.insert(**d)) {
            return invalid(format!("duration level {}s is listed twice", repeated.as_secs_f64()));
        }
        if self.timing.response_timeout.is_zero() {
            return invalid("response timeout must be positive".into());
        }
        if self.design.repetitions == 0 {
            return invalid("repetitions must be at least 1".into());
        }
        if self.design.max_run == 0 {
            return invalid("max_run must be at least 1".into());
        }
        if self.design.shuffle_attempts == 0 {
            return invalid("shuffle_attempts must be at least 1".into());
        }

        // each main stimulus has exactly one lexicality and appears once
        let mut main: HashSet<&str> = HashSet::new();
        if let Some(repeated) = self
            .words
            .iter()
            .chain(&self.pseudowords)
            .find(|s| !main.insert(s.as_str()))
        {
            return invalid(format!("stimulus {repeated:?} appears more than once in the main catalog"));
        }
        if let Some(shared) = self
            .practice
            .words
            .iter()
            .chain(&self.practice.pseudowords)
            .find(|s| main.contains(s.as_str()))
        {
            return invalid(format!("practice stimulus {shared:?} also appears in the main catalog"));
        }
        if self.practice.enabled && self.practice.words.is_empty() && self.practice.pseudowords.is_empty() {
            return invalid("practice is enabled but the practice catalog is empty".into());
        }

        self.keys.validate().map_err(ConfigError::Invalid)?;

        if let Some((min, max)) = self.analysis.clean_window {
            if !(min.is_finite() && max.is_finite() && min >= 0.0 && min <= max) {
                return invalid(format!("clean window [{min}, {max}] is not a valid range"));
            }
        }
        Ok(())
    }

    /// Main catalog, words first, in configured order.
    pub fn catalog(&self) -> Vec<StimulusItem> {
        self.words
            .iter()
            .map(StimulusItem::word)
            .chain(self.pseudowords.iter().map(StimulusItem::pseudoword))
            .collect()
    }

    pub fn practice_catalog(&self) -> Vec<StimulusItem> {
        self.practice
            .words
            .iter()
            .map(StimulusItem::word)
            .chain(self.practice.pseudowords.iter().map(StimulusItem::pseudoword))
            .collect()
    }

    pub fn total_trials(&self) -> usize {
        (self.words.len() + self.pseudowords.len()) * self.durations.len() * self.design.repetitions
    }

    /// Bindings as they apply for this session, after any swap.
    pub fn bindings(&self) -> KeyBindings {
        if self.swap_keys {
            self.keys.swapped()
        } else {
            self.keys.clone()
        }
    }
}

mod secs {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        if secs < 0.0 {
            return Err(serde::de::Error::custom(format!("negative duration {secs}")));
        }
        Ok(duration_from_secs(secs))
    }
}

mod secs_list {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ds: &[Duration], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(ds.iter().map(Duration::as_secs_f64))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Duration>, D::Error> {
        Ok(Vec::<f64>::deserialize(d)?
            .into_iter()
            .map(duration_from_secs)
            .collect())
    }
}
