use crate::stimulus::{Decision, Lexicality};
use std::time::Duration;

/// Converts a duration level given in seconds, normalized to whole
/// microseconds so every call site maps the same level to the same key.
pub fn duration_from_secs(secs: f64) -> Duration {
    if !secs.is_finite() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_micros((secs * 1e6).round() as u64)
}

/// One planned trial. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialSpec {
    pub index: usize,
    pub stimulus: String,
    pub lexicality: Lexicality,
    pub duration: Duration,
}

/// What the response window produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    decision: Option<Decision>,
    rt: Option<Duration>,
}

impl Response {
    pub fn decided(decision: Decision, rt: Duration) -> Self {
        Self {
            decision: Some(decision),
            rt: Some(rt),
        }
    }

    pub fn timed_out() -> Self {
        Self {
            decision: None,
            rt: None,
        }
    }

    pub fn decision(&self) -> Option<Decision> {
        self.decision
    }

    pub fn rt(&self) -> Option<Duration> {
        self.rt
    }
}

/// Recorded result per trial
#[derive(Debug, Clone, PartialEq)]
pub struct TrialResult {
    pub index: usize,
    pub stimulus: String,
    pub lexicality: Lexicality,
    pub duration: Duration,
    pub decision: Option<Decision>,
    pub rt: Option<Duration>,
    pub accuracy: u8,
}

impl TrialResult {
    /// Scores a response against the lexicality-implied decision.
    pub fn score(spec: &TrialSpec, response: Response) -> Self {
        let correct = response.decision == Some(spec.lexicality.expected_decision());
        Self {
            index: spec.index,
            stimulus: spec.stimulus.clone(),
            lexicality: spec.lexicality,
            duration: spec.duration,
            decision: response.decision,
            rt: response.rt,
            accuracy: u8::from(correct),
        }
    }

    pub fn is_correct(&self) -> bool {
        self.accuracy == 1
    }

    pub fn timed_out(&self) -> bool {
        self.decision.is_none()
    }

    pub fn rt_secs(&self) -> Option<f64> {
        self.rt.map(|rt| rt.as_secs_f64())
    }
}
