use crate::aggregate::Observation;
use serde::Serialize;

/// Overall accuracy below this flags a participant.
pub const LOW_ACCURACY: f64 = 0.60;
/// Timeout rate above this flags a participant.
pub const HIGH_MISSING_RATE: f64 = 0.25;

/// Per-participant data quality check over all trials, unfiltered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SanityCheck {
    pub subject: String,
    pub trials: usize,
    pub accuracy: Option<f64>,
    pub missing: usize,
    pub missing_rate: Option<f64>,
    pub low_accuracy: bool,
    pub high_exclusion: bool,
}

impl SanityCheck {
    pub fn evaluate<'a>(subject: impl Into<String>, observations: impl IntoIterator<Item = &'a Observation>) -> Self {
        let mut trials = 0;
        let mut correct = 0;
        let mut missing = 0;
        for obs in observations {
            trials += 1;
            correct += usize::from(obs.correct);
            missing += usize::from(!obs.responded);
        }
        let rate = |k: usize| (trials > 0).then(|| k as f64 / trials as f64);
        let accuracy = rate(correct);
        let missing_rate = rate(missing);
        Self {
            subject: subject.into(),
            trials,
            accuracy,
            missing,
            missing_rate,
            low_accuracy: accuracy.is_some_and(|a| a < LOW_ACCURACY),
            high_exclusion: missing_rate.is_some_and(|m| m > HIGH_MISSING_RATE),
        }
    }

    pub fn flagged(&self) -> bool {
        self.low_accuracy || self.high_exclusion
    }

    pub fn flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.low_accuracy {
            flags.push("low accuracy");
        }
        if self.high_exclusion {
            flags.push("high exclusion rate");
        }
        flags
    }
}
