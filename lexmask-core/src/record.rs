//! Records exchanged with the result sink and read back by the live view.

use crate::session::{SessionState, SessionStatus};
use crate::stimulus::Lexicality;
use crate::trial::TrialResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialRecord {
    pub session_id: Uuid,
    pub subject: String,
    pub trial_number: usize,
    pub stimulus: String,
    pub lexicality: Lexicality,
    /// Seconds.
    pub duration: f64,
    /// 1 = word, 0 = nonword, absent on timeout.
    pub decision: Option<u8>,
    /// Seconds, absent on timeout.
    #[serde(rename = "RT")]
    pub rt: Option<f64>,
    pub accuracy: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub subject: String,
    pub status: SessionStatus,
    pub total_trials: usize,
    pub completed_trials: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TrialRecord {
    pub fn new(session: &SessionState, result: &TrialResult) -> Self {
        Self {
            session_id: session.id(),
            subject: session.subject().to_string(),
            trial_number: result.index,
            stimulus: result.stimulus.clone(),
            lexicality: result.lexicality,
            duration: result.duration.as_secs_f64(),
            decision: result.decision.map(|d| d.code()),
            rt: result.rt_secs(),
            accuracy: result.accuracy,
        }
    }
}

impl From<&SessionState> for SessionRecord {
    fn from(session: &SessionState) -> Self {
        Self {
            session_id: session.id(),
            subject: session.subject().to_string(),
            status: session.status(),
            total_trials: session.total_trials(),
            completed_trials: session.completed_trials(),
            started_at: session.started_at(),
            completed_at: session.completed_at(),
        }
    }
}

impl SessionRecord {
    /// Folds a possibly stale copy of the same session into this one.
    /// Progress only grows and completion is sticky.
    pub fn merge(&mut self, other: &SessionRecord) {
        self.completed_trials = self.completed_trials.max(other.completed_trials);
        self.total_trials = self.total_trials.max(other.total_trials);
        if other.status == SessionStatus::Completed {
            self.status = SessionStatus::Completed;
        }
        if self.completed_at.is_none() {
            self.completed_at = other.completed_at;
        }
    }
}
