use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const MAX_SUBJECT_LEN: usize = 64;

/// Validated participant identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubjectId(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubjectIdError {
    #[error("participant identifier is missing")]
    Missing,
    #[error("participant identifier is longer than {MAX_SUBJECT_LEN} characters")]
    TooLong,
    #[error("participant identifier contains invalid character {0:?}")]
    InvalidChar(char),
}

impl SubjectId {
    pub fn parse(raw: &str) -> Result<Self, SubjectIdError> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(SubjectIdError::Missing);
        }
        if id.chars().count() > MAX_SUBJECT_LEN {
            return Err(SubjectIdError::TooLong);
        }
        if let Some(bad) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(SubjectIdError::InvalidChar(bad));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SubjectId {
    type Err = SubjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

/// Progress of one subject's main block.
///
/// `completed_trials` only grows and `status` only moves to `Completed`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    id: Uuid,
    subject: SubjectId,
    status: SessionStatus,
    total_trials: usize,
    completed_trials: usize,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new(subject: SubjectId, total_trials: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject,
            status: SessionStatus::InProgress,
            total_trials,
            completed_trials: 0,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Counts one more completed trial. Saturates at the total.
    pub fn record_trial(&mut self) -> usize {
        if self.completed_trials < self.total_trials {
            self.completed_trials += 1;
        }
        self.completed_trials
    }

    /// Closes the session. Returns false if it was already closed.
    pub fn complete(&mut self) -> bool {
        if self.status == SessionStatus::Completed {
            return false;
        }
        self.status = SessionStatus::Completed;
        self.completed_at = Some(Utc::now());
        true
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn total_trials(&self) -> usize {
        self.total_trials
    }

    pub fn completed_trials(&self) -> usize {
        self.completed_trials
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}
