//! Best-effort persistence of session and trial records.
//!
//! The trial loop never awaits a sink call. [`SinkDispatcher`] spawns each
//! write onto a task tracker and only logs failures.

use lexmask_core::{SessionRecord, TrialRecord};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),
    #[error("sink io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// External store for session and trial records.
pub trait ResultSink: Send + Sync + 'static {
    fn create_session(&self, record: SessionRecord) -> impl Future<Output = Result<(), SinkError>> + Send;
    fn update_session(&self, record: SessionRecord) -> impl Future<Output = Result<(), SinkError>> + Send;
    fn write_trial(&self, record: TrialRecord) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Sink that drops everything, for runs without a store.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ResultSink for NullSink {
    async fn create_session(&self, _: SessionRecord) -> Result<(), SinkError> {
        Ok(())
    }

    async fn update_session(&self, _: SessionRecord) -> Result<(), SinkError> {
        Ok(())
    }

    async fn write_trial(&self, _: TrialRecord) -> Result<(), SinkError> {
        Ok(())
    }
}

pub struct SinkDispatcher<S: ResultSink> {
    sink: Arc<S>,
    tasks: TaskTracker,
}

impl<S: ResultSink> SinkDispatcher<S> {
    pub fn new(sink: Arc<S>) -> Self {
        Self {
            sink,
            tasks: TaskTracker::new(),
        }
    }

    pub fn create_session(&self, record: SessionRecord) {
        let sink = self.sink.clone();
        self.tasks.spawn(async move {
            let session = record.session_id;
            if let Err(err) = sink.create_session(record).await {
                warn!(%session, error = %err, "failed to create session record");
            }
        });
    }

    pub fn update_session(&self, record: SessionRecord) {
        let sink = self.sink.clone();
        self.tasks.spawn(async move {
            let session = record.session_id;
            if let Err(err) = sink.update_session(record).await {
                warn!(%session, error = %err, "failed to update session record");
            }
        });
    }

    pub fn write_trial(&self, record: TrialRecord) {
        let sink = self.sink.clone();
        self.tasks.spawn(async move {
            let trial = record.trial_number;
            if let Err(err) = sink.write_trial(record).await {
                warn!(trial, error = %err, "failed to write trial record");
            }
        });
    }

    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Waits up to `grace` for outstanding writes. Returns whether all of
    /// them finished.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tasks.close();
        let done = tokio::time::timeout(grace, self.tasks.wait()).await.is_ok();
        self.tasks.reopen();
        if !done {
            warn!(pending = self.tasks.len(), "sink writes still pending after grace period");
        } else {
            debug!("sink drained");
        }
        done
    }
}

#[derive(Debug, Default)]
struct Stored {
    sessions: Vec<SessionRecord>,
    trials: Vec<TrialRecord>,
}

/// In-memory sink with optional latency and failure injection.
#[derive(Debug, Default)]
pub struct MemorySink {
    stored: Mutex<Stored>,
    failing: AtomicBool,
    delay: Option<Duration>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn trials(&self) -> Vec<TrialRecord> {
        self.lock().trials.clone()
    }

    /// Every session write in arrival order, creates and updates alike.
    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.lock().sessions.clone()
    }

    /// Current view of each session, folded the way a store would merge them.
    pub fn latest_session(&self) -> Option<SessionRecord> {
        let stored = self.lock();
        let mut iter = stored.sessions.iter();
        let mut merged = iter.next()?.clone();
        for record in iter {
            merged.merge(record);
        }
        Some(merged)
    }

    fn lock(&self) -> MutexGuard<'_, Stored> {
        self.stored.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn admit(&self) -> Result<(), SinkError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable("memory sink set to fail".into()));
        }
        Ok(())
    }
}

impl ResultSink for MemorySink {
    async fn create_session(&self, record: SessionRecord) -> Result<(), SinkError> {
        self.admit().await?;
        self.lock().sessions.push(record);
        Ok(())
    }

    async fn update_session(&self, record: SessionRecord) -> Result<(), SinkError> {
        self.admit().await?;
        self.lock().sessions.push(record);
        Ok(())
    }

    async fn write_trial(&self, record: TrialRecord) -> Result<(), SinkError> {
        self.admit().await?;
        self.lock().trials.push(record);
        Ok(())
    }
}
