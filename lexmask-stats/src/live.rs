//! Live view over records arriving from the session and trial streams.
//!
//! The two streams are independent, so records may arrive late, twice or in
//! any order. Recomputation waits for a quiet period after the last arrival.

use crate::aggregate::{Aggregator, Observation, Summary};
use crate::sanity::SanityCheck;
use lexmask_core::{SessionRecord, TrialRecord};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_QUIET: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
pub enum Arrival {
    Session(SessionRecord),
    Trial(TrialRecord),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectView {
    pub subject: String,
    pub summary: Summary,
    pub sanity: SanityCheck,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LiveSnapshot {
    /// Number of recomputations so far; the empty initial snapshot is 0.
    pub generation: u64,
    pub sessions: Vec<SessionRecord>,
    pub subjects: Vec<SubjectView>,
    pub overall: Summary,
}

#[derive(Debug, Default)]
pub struct LiveAggregator {
    aggregator: Aggregator,
    sessions: HashMap<Uuid, SessionRecord>,
    trials: BTreeMap<(Uuid, usize), TrialRecord>,
    generation: u64,
}

impl LiveAggregator {
    pub fn new(aggregator: Aggregator) -> Self {
        Self {
            aggregator,
            ..Self::default()
        }
    }

    /// Folds one arrival in. Returns whether anything changed.
    pub fn apply(&mut self, arrival: Arrival) -> bool {
        match arrival {
            Arrival::Session(record) => match self.sessions.get_mut(&record.session_id) {
                Some(known) => {
                    let before = known.clone();
                    known.merge(&record);
                    *known != before
                }
                None => {
                    self.sessions.insert(record.session_id, record);
                    true
                }
            },
            Arrival::Trial(record) => {
                let key = (record.session_id, record.trial_number);
                self.trials.insert(key, record.clone()).as_ref() != Some(&record)
            }
        }
    }

    pub fn trial_count(&self) -> usize {
        self.trials.len()
    }

    pub fn snapshot(&mut self) -> LiveSnapshot {
        self.generation += 1;

        let mut sessions: Vec<SessionRecord> = self.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.session_id.cmp(&b.session_id)));

        let mut by_subject: BTreeMap<&str, Vec<Observation>> = BTreeMap::new();
        for record in self.trials.values() {
            by_subject
                .entry(record.subject.as_str())
                .or_default()
                .push(Observation::from(record));
        }
        let subjects = by_subject
            .iter()
            .map(|(subject, observations)| SubjectView {
                subject: subject.to_string(),
                summary: self.aggregator.summarize(observations),
                sanity: SanityCheck::evaluate(*subject, observations),
            })
            .collect();

        let all: Vec<Observation> = self.trials.values().map(Observation::from).collect();
        LiveSnapshot {
            generation: self.generation,
            sessions,
            subjects,
            overall: self.aggregator.summarize(&all),
        }
    }
}

/// Feeds `arrivals` into `live` and publishes a snapshot once no arrival has
/// been seen for `quiet`. A final snapshot is published when the stream ends
/// with unpublished changes.
pub fn spawn_live_view(
    mut arrivals: mpsc::Receiver<Arrival>,
    mut live: LiveAggregator,
    quiet: Duration,
) -> (watch::Receiver<Arc<LiveSnapshot>>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(Arc::new(LiveSnapshot::default()));
    let handle = tokio::spawn(async move {
        let settle = tokio::time::sleep(quiet);
        tokio::pin!(settle);
        let mut dirty = false;
        loop {
            tokio::select! {
                arrival = arrivals.recv() => match arrival {
                    Some(arrival) => {
                        if live.apply(arrival) {
                            dirty = true;
                            settle.as_mut().reset(Instant::now() + quiet);
                        }
                    }
                    None => break,
                },
                () = &mut settle, if dirty => {
                    dirty = false;
                    publish(&tx, &mut live);
                }
            }
        }
        if dirty {
            publish(&tx, &mut live);
        }
    });
    (rx, handle)
}

fn publish(tx: &watch::Sender<Arc<LiveSnapshot>>, live: &mut LiveAggregator) {
    let snapshot = live.snapshot();
    debug!(
        generation = snapshot.generation,
        sessions = snapshot.sessions.len(),
        trials = live.trial_count(),
        "live view recomputed"
    );
    tx.send_replace(Arc::new(snapshot));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::CleanWindow;
    use lexmask_core::{
        Decision, Lexicality, Response, SessionState, SessionStatus, SubjectId, TrialResult, TrialSpec,
    };

    fn trial(session: &SessionState, index: usize, rt_ms: Option<u64>) -> TrialRecord {
        let spec = TrialSpec {
            index,
            stimulus: "garden".into(),
            lexicality: Lexicality::Word,
            duration: Duration::from_millis(40),
        };
        let response = match rt_ms {
            Some(ms) => Response::decided(Decision::Word, Duration::from_millis(ms)),
            None => Response::timed_out(),
        };
        TrialRecord::new(session, &TrialResult::score(&spec, response))
    }

    fn session(subject: &str, total: usize) -> SessionState {
        SessionState::new(SubjectId::parse(subject).unwrap(), total)
    }

    #[test]
    fn duplicates_and_stale_updates_are_absorbed() {
        let mut s = session("01", 3);
        let mut live = LiveAggregator::new(Aggregator::new(Some(CleanWindow::default())));

        let first = trial(&s, 0, Some(400));
        assert!(live.apply(Arrival::Trial(first.clone())));
        assert!(!live.apply(Arrival::Trial(first)));

        s.record_trial();
        s.record_trial();
        let progressed = SessionRecord::from(&s);
        // trials can land before their session record
        assert!(live.apply(Arrival::Session(progressed.clone())));
        let mut stale = progressed.clone();
        stale.completed_trials = 1;
        assert!(!live.apply(Arrival::Session(stale)));

        s.record_trial();
        s.complete();
        assert!(live.apply(Arrival::Session(SessionRecord::from(&s))));
        assert!(!live.apply(Arrival::Session(progressed)));

        let snapshot = live.snapshot();
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.sessions.len(), 1);
        assert_eq!(snapshot.sessions[0].status, SessionStatus::Completed);
        assert_eq!(snapshot.sessions[0].completed_trials, 3);
        assert_eq!(snapshot.overall.total, 1);
    }

    #[test]
    fn snapshot_groups_by_subject() {
        let a = session("01", 2);
        let b = session("02", 2);
        let mut live = LiveAggregator::new(Aggregator::new(None));
        live.apply(Arrival::Trial(trial(&a, 0, Some(500))));
        live.apply(Arrival::Trial(trial(&a, 1, None)));
        live.apply(Arrival::Trial(trial(&b, 0, Some(600))));

        let snapshot = live.snapshot();
        assert_eq!(snapshot.subjects.len(), 2);
        assert_eq!(snapshot.subjects[0].subject, "01");
        assert_eq!(snapshot.subjects[0].sanity.missing, 1);
        assert!(snapshot.subjects[0].sanity.high_exclusion);
        assert_eq!(snapshot.subjects[1].summary.total, 1);
        assert_eq!(snapshot.overall.total, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn a_burst_is_recomputed_once() {
        let s = session("01", 20);
        let (tx, rx) = mpsc::channel(64);
        let (mut snapshots, handle) = spawn_live_view(rx, LiveAggregator::default(), DEFAULT_QUIET);

        tx.send(Arrival::Session(SessionRecord::from(&s))).await.unwrap();
        for i in 0..10 {
            tx.send(Arrival::Trial(trial(&s, i, Some(450)))).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(snapshots.borrow().generation, 0);

        snapshots.changed().await.unwrap();
        let snapshot = snapshots.borrow_and_update().clone();
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.overall.total, 10);

        // a second burst after a quiet period is a second recomputation
        for i in 10..15 {
            tx.send(Arrival::Trial(trial(&s, i, Some(450)))).await.unwrap();
        }
        snapshots.changed().await.unwrap();
        assert_eq!(snapshots.borrow().generation, 2);
        assert_eq!(snapshots.borrow().overall.total, 15);

        drop(tx);
        handle.await.unwrap();
        assert_eq!(snapshots.borrow().generation, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_the_stream_flushes_pending_changes() {
        let s = session("01", 2);
        let (tx, rx) = mpsc::channel(8);
        let (snapshots, handle) = spawn_live_view(rx, LiveAggregator::default(), DEFAULT_QUIET);
        tx.send(Arrival::Trial(trial(&s, 0, Some(450)))).await.unwrap();
        drop(tx);
        handle.await.unwrap();
        assert_eq!(snapshots.borrow().generation, 1);
        assert_eq!(snapshots.borrow().overall.total, 1);
    }
}
