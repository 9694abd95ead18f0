//! Append-only JSON Lines record store: `sessions.jsonl` and `trials.jsonl`.

use lexmask_core::{SessionRecord, TrialRecord};
use lexmask_experiment::{ResultSink, SinkError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::SeekFrom;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::warn;

pub const SESSIONS_FILE: &str = "sessions.jsonl";
pub const TRIALS_FILE: &str = "trials.jsonl";

#[derive(Debug)]
pub struct JsonlSink {
    dir: PathBuf,
    // one writer at a time per file
    sessions: Mutex<()>,
    trials: Mutex<()>,
}

impl JsonlSink {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            sessions: Mutex::new(()),
            trials: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn append<T: Serialize>(&self, lock: &Mutex<()>, file: &str, record: &T) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let _guard = lock.lock().await;
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file))
            .await?;
        out.write_all(&line).await?;
        out.flush().await?;
        Ok(())
    }
}

impl ResultSink for JsonlSink {
    async fn create_session(&self, record: SessionRecord) -> Result<(), SinkError> {
        self.append(&self.sessions, SESSIONS_FILE, &record).await
    }

    async fn update_session(&self, record: SessionRecord) -> Result<(), SinkError> {
        self.append(&self.sessions, SESSIONS_FILE, &record).await
    }

    async fn write_trial(&self, record: TrialRecord) -> Result<(), SinkError> {
        self.append(&self.trials, TRIALS_FILE, &record).await
    }
}

/// Follows a JSON Lines file, yielding records appended since the last poll.
/// A trailing partial line is left for the next poll.
#[derive(Debug)]
pub struct Tailer<T> {
    path: PathBuf,
    offset: u64,
    partial: Vec<u8>,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Tailer<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            partial: Vec::new(),
            _record: PhantomData,
        }
    }

    pub async fn poll(&mut self) -> std::io::Result<Vec<T>> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let len = file.metadata().await?.len();
        if len < self.offset {
            // truncated or replaced
            self.offset = 0;
            self.partial.clear();
        }
        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut fresh = Vec::new();
        file.read_to_end(&mut fresh).await?;
        self.offset += fresh.len() as u64;
        self.partial.extend_from_slice(&fresh);

        let Some(end) = self.partial.iter().rposition(|&b| b == b'\n') else {
            return Ok(Vec::new());
        };
        let complete: Vec<u8> = self.partial.drain(..=end).collect();
        let mut records = Vec::new();
        for line in complete.split(|&b| b == b'\n').filter(|l| !l.iter().all(u8::is_ascii_whitespace)) {
            match serde_json::from_slice(line) {
                Ok(record) => records.push(record),
                Err(err) => warn!(path = %self.path.display(), error = %err, "skipping malformed record"),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexmask_core::{Lexicality, Response, SessionState, SessionStatus, SubjectId, TrialResult, TrialSpec};
    use std::time::Duration;

    fn trial(session: &SessionState, index: usize) -> TrialRecord {
        let spec = TrialSpec {
            index,
            stimulus: "garden".into(),
            lexicality: Lexicality::Word,
            duration: Duration::from_millis(40),
        };
        TrialRecord::new(session, &TrialResult::score(&spec, Response::timed_out()))
    }

    #[tokio::test]
    async fn sink_appends_and_tailer_follows() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::open(dir.path().join("store")).unwrap();
        let mut session = SessionState::new(SubjectId::parse("05").unwrap(), 2);
        let mut sessions = Tailer::<SessionRecord>::new(sink.dir().join(SESSIONS_FILE));
        let mut trials = Tailer::<TrialRecord>::new(sink.dir().join(TRIALS_FILE));
        assert!(trials.poll().await.unwrap().is_empty());

        sink.create_session(SessionRecord::from(&session)).await.unwrap();
        session.record_trial();
        sink.write_trial(trial(&session, 0)).await.unwrap();
        sink.update_session(SessionRecord::from(&session)).await.unwrap();

        let seen = sessions.poll().await.unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].completed_trials, 1);
        assert_eq!(trials.poll().await.unwrap().len(), 1);

        session.record_trial();
        session.complete();
        sink.write_trial(trial(&session, 1)).await.unwrap();
        sink.update_session(SessionRecord::from(&session)).await.unwrap();

        let more = trials.poll().await.unwrap();
        assert_eq!(more.len(), 1);
        assert_eq!(more[0].trial_number, 1);
        let seen = sessions.poll().await.unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn partial_lines_wait_for_the_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRIALS_FILE);
        let session = SessionState::new(SubjectId::parse("05").unwrap(), 1);
        let line = serde_json::to_string(&trial(&session, 0)).unwrap();
        let (head, tail) = line.split_at(20);

        tokio::fs::write(&path, head).await.unwrap();
        let mut tailer = Tailer::<TrialRecord>::new(&path);
        assert!(tailer.poll().await.unwrap().is_empty());

        let mut out = OpenOptions::new().append(true).open(&path).await.unwrap();
        out.write_all(format!("{tail}\nnot json\n").as_bytes()).await.unwrap();
        out.flush().await.unwrap();
        let records = tailer.poll().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stimulus, "garden");
    }
}
