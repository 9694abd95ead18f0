//! Per-subject export files under `<data>/subj_<subject>/`.

use anyhow::{Context, Result};
use lexmask_core::{Lexicality, TrialResult, TrialSpec, duration_from_secs};
use lexmask_experiment::{SessionReport, TrialTimings};
use lexmask_stats::Observation;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const TRIAL_INFO_FILE: &str = "trial_info.csv";
pub const RESPONSES_FILE: &str = "trial_responses.csv";
pub const TIMING_FILE: &str = "timing.json";

pub fn subject_dir(data: &Path, subject: &str) -> PathBuf {
    data.join(format!("subj_{subject}"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TrialInfoRow<'a> {
    trial_number: usize,
    stimulus: &'a str,
    lexicality: Lexicality,
    duration: f64,
}

/// One row of the exported trial table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRow {
    pub subject: String,
    pub trial_number: usize,
    pub stimulus: String,
    pub lexicality: Lexicality,
    pub duration: f64,
    /// 1 = word, 0 = nonword, empty on timeout.
    pub response: Option<u8>,
    /// Seconds with six decimals, empty on timeout.
    #[serde(rename = "RT")]
    pub rt: Option<String>,
    pub accuracy: u8,
}

impl ResponseRow {
    pub fn new(subject: &str, result: &TrialResult) -> Self {
        Self {
            subject: subject.to_string(),
            trial_number: result.index,
            stimulus: result.stimulus.clone(),
            lexicality: result.lexicality,
            duration: result.duration.as_secs_f64(),
            response: result.decision.map(|d| d.code()),
            rt: result.rt_secs().map(|rt| format!("{rt:.6}")),
            accuracy: result.accuracy,
        }
    }

    pub fn rt_secs(&self) -> Option<f64> {
        self.rt.as_deref().and_then(|rt| rt.trim().parse().ok())
    }
}

impl From<&ResponseRow> for Observation {
    fn from(row: &ResponseRow) -> Self {
        Self {
            lexicality: row.lexicality,
            duration: duration_from_secs(row.duration),
            responded: row.response.is_some(),
            rt: row.rt_secs(),
            correct: row.accuracy == 1,
        }
    }
}

#[derive(Debug, Serialize)]
struct TimingLog<'a> {
    subject: &'a str,
    session_id: Option<Uuid>,
    constraint_satisfied: Option<bool>,
    cancelled: bool,
    trials: &'a [TrialTimings],
}

/// Writes the planned sequence, the response table and the timing log.
/// Returns the subject directory.
pub fn write_session(data: &Path, report: &SessionReport) -> Result<PathBuf> {
    let subject = report.subject.as_str();
    let dir = subject_dir(data, subject);
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    write_trial_info(&dir.join(TRIAL_INFO_FILE), &report.trials)?;

    let responses = dir.join(RESPONSES_FILE);
    let mut out = csv::Writer::from_path(&responses).with_context(|| format!("creating {}", responses.display()))?;
    if report.results.is_empty() {
        out.write_record(RESPONSE_HEADER)?;
    }
    for result in &report.results {
        out.serialize(ResponseRow::new(subject, result))?;
    }
    out.flush()?;

    let log = TimingLog {
        subject,
        session_id: report.session.as_ref().map(|s| s.id()),
        constraint_satisfied: report.constraint_satisfied,
        cancelled: report.cancelled,
        trials: &report.timings,
    };
    let timing = dir.join(TIMING_FILE);
    std::fs::write(&timing, serde_json::to_vec_pretty(&log)?)
        .with_context(|| format!("writing {}", timing.display()))?;
    Ok(dir)
}

const RESPONSE_HEADER: [&str; 8] = [
    "subject",
    "trialNumber",
    "stimulus",
    "lexicality",
    "duration",
    "response",
    "RT",
    "accuracy",
];

fn write_trial_info(path: &Path, trials: &[TrialSpec]) -> Result<()> {
    let mut out = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    if trials.is_empty() {
        out.write_record(["trialNumber", "stimulus", "lexicality", "duration"])?;
    }
    for trial in trials {
        out.serialize(TrialInfoRow {
            trial_number: trial.index,
            stimulus: &trial.stimulus,
            lexicality: trial.lexicality,
            duration: trial.duration.as_secs_f64(),
        })?;
    }
    out.flush()?;
    Ok(())
}

/// Reads every `subj_*/trial_responses.csv` below `data`, in directory-name order.
pub fn load_responses(data: &Path) -> Result<Vec<ResponseRow>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(data)
        .with_context(|| format!("reading {}", data.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("subj_"))
        })
        .collect();
    dirs.sort();

    let mut rows = Vec::new();
    for dir in dirs {
        let path = dir.join(RESPONSES_FILE);
        if !path.exists() {
            continue;
        }
        let mut reader = csv::Reader::from_path(&path).with_context(|| format!("opening {}", path.display()))?;
        for row in reader.deserialize() {
            rows.push(row.with_context(|| format!("parsing {}", path.display()))?);
        }
    }
    Ok(rows)
}
