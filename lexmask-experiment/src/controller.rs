use crate::collector::ResponseCollector;
use crate::config::{ConfigError, ExperimentConfig};
use crate::generator::{Design, generate_main, generate_practice};
use crate::input::{GateOutcome, InputHub, KeyBindings, wait_for_continue};
use crate::runner::{TrialRun, TrialRunner};
use crate::sink::{ResultSink, SinkDispatcher};
use lexmask_core::{
    Display, Screen, SessionRecord, SessionStage, SessionState, SubjectId, TrialRecord, TrialResult, TrialSpec,
};
use lexmask_timing::{CalibrationStats, PhaseScheduler, PhaseTiming, RefreshSource, Timer};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("display is not available")]
    DisplayUnavailable,
}

/// Phase timings of one completed main-block trial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialTimings {
    pub index: usize,
    pub stimulus: String,
    pub phases: Vec<PhaseTiming>,
}

/// Everything a finished or cancelled session leaves behind.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub subject: SubjectId,
    /// Absent when the session was cancelled before the main block.
    pub session: Option<SessionState>,
    pub trials: Vec<TrialSpec>,
    pub results: Vec<TrialResult>,
    pub timings: Vec<TrialTimings>,
    pub constraint_satisfied: Option<bool>,
    pub cancelled: bool,
}

impl SessionReport {
    fn new(subject: SubjectId) -> Self {
        Self {
            subject,
            session: None,
            trials: Vec::new(),
            results: Vec::new(),
            timings: Vec::new(),
            constraint_satisfied: None,
            cancelled: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.cancelled && !self.trials.is_empty() && self.results.len() == self.trials.len()
    }
}

/// Drives one subject through instructions, optional practice and the main
/// block, with a break at the midpoint when the design repeats.
pub struct Experiment<T, R, D, S, G>
where
    T: Timer,
    R: RefreshSource,
    D: Display,
    S: ResultSink,
    G: Rng,
{
    config: Arc<ExperimentConfig>,
    runner: TrialRunner<T, R, D>,
    input: InputHub,
    bindings: KeyBindings,
    dispatcher: SinkDispatcher<S>,
    rng: G,
    stage: SessionStage,
}

impl<T, R, D, S, G> Experiment<T, R, D, S, G>
where
    T: Timer,
    R: RefreshSource,
    D: Display,
    S: ResultSink,
    G: Rng,
{
    pub fn new(
        config: Arc<ExperimentConfig>,
        timer: T,
        refresh: R,
        display: D,
        input: InputHub,
        sink: Arc<S>,
        rng: G,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        if !display.is_ready() {
            return Err(SessionError::DisplayUnavailable);
        }
        let bindings = config.bindings();
        let scheduler = PhaseScheduler::new(timer.clone(), refresh);
        let collector = ResponseCollector::new(timer, bindings.clone(), input.clone());
        Ok(Self {
            runner: TrialRunner::new(config.clone(), scheduler, collector, display),
            config,
            input,
            bindings,
            dispatcher: SinkDispatcher::new(sink),
            rng,
            stage: SessionStage::default(),
        })
    }

    pub fn stage(&self) -> SessionStage {
        self.stage
    }

    pub fn display(&self) -> &D {
        self.runner.display()
    }

    pub fn into_display(self) -> D {
        self.runner.into_display()
    }

    pub fn pending_writes(&self) -> usize {
        self.dispatcher.pending()
    }

    /// Waits up to `grace` for background sink writes.
    pub async fn flush(&self, grace: Duration) -> bool {
        self.dispatcher.drain(grace).await
    }

    /// Measures the refresh source over `frames` refreshes.
    pub async fn calibrate(&mut self, frames: usize) -> CalibrationStats {
        let stats = self.runner.scheduler_mut().calibrate(frames).await;
        info!(
            frame_ms = stats.average_frame_time_ns / 1e6,
            jitter_ms = stats.jitter_ns / 1e6,
            fps = stats.effective_fps,
            "refresh calibrated"
        );
        stats
    }

    /// Runs the whole session. Cancellation, from `cancel` or the quit key,
    /// ends it early with the results gathered so far.
    pub async fn run(&mut self, subject: SubjectId, cancel: CancellationToken) -> SessionReport {
        let stop = cancel.child_token();
        let watcher = CancellationToken::new();
        let _watcher_guard = watcher.clone().drop_guard();
        self.spawn_quit_watcher(stop.clone(), watcher);

        let mut report = SessionReport::new(subject.clone());
        info!(%subject, "session starting");

        self.stage = SessionStage::Instructions;
        if self.gate(instructions(&self.bindings), &stop).await.is_cancelled() {
            return self.finish(report, true);
        }

        if self.config.practice.enabled && self.run_practice(&stop).await.is_cancelled() {
            return self.finish(report, true);
        }

        self.stage = SessionStage::Main;
        let sequence = generate_main(
            &self.config.catalog(),
            &self.config.durations,
            Design::from_config(&self.config),
            &mut self.rng,
        );
        report.constraint_satisfied = Some(sequence.constraint_satisfied);
        report.trials = sequence.trials;

        let mut session = SessionState::new(subject, report.trials.len());
        info!(session = %session.id(), trials = session.total_trials(), "main block starting");
        self.dispatcher.create_session(SessionRecord::from(&session));

        let midpoint = (self.config.design.repetitions > 1).then_some(report.trials.len() / 2);
        for spec in &report.trials {
            if midpoint == Some(spec.index) {
                self.stage = SessionStage::Break;
                if self.gate(take_a_break(&self.bindings), &stop).await.is_cancelled() {
                    break;
                }
                self.stage = SessionStage::Main;
            }

            match self.runner.run(spec, &stop).await {
                TrialRun::Completed(outcome) => {
                    session.record_trial();
                    self.dispatcher.write_trial(TrialRecord::new(&session, &outcome.result));
                    self.dispatcher.update_session(SessionRecord::from(&session));
                    report.timings.push(TrialTimings {
                        index: spec.index,
                        stimulus: spec.stimulus.clone(),
                        phases: outcome.timings,
                    });
                    report.results.push(outcome.result);
                }
                TrialRun::Interrupted { after } => {
                    info!(trial = spec.index, after = after.label(), "trial interrupted");
                    break;
                }
            }
            if stop.is_cancelled() {
                break;
            }
        }

        let finished = report.results.len() == report.trials.len();
        if finished && session.complete() {
            info!(session = %session.id(), "session completed");
            self.dispatcher.update_session(SessionRecord::from(&session));
        }
        report.session = Some(session);
        self.finish(report, !finished)
    }

    async fn run_practice(&mut self, stop: &CancellationToken) -> GateOutcome {
        self.stage = SessionStage::Practice;
        if self.gate(practice_intro(&self.bindings), stop).await.is_cancelled() {
            return GateOutcome::Cancelled;
        }

        let practice = generate_practice(&self.config.practice_catalog(), &self.config.durations, &mut self.rng);
        for spec in &practice {
            match self.runner.run(spec, stop).await {
                TrialRun::Completed(outcome) => {
                    debug!(
                        stimulus = %outcome.result.stimulus,
                        accuracy = outcome.result.accuracy,
                        rt = ?outcome.result.rt_secs(),
                        "practice result discarded"
                    );
                }
                TrialRun::Interrupted { .. } => return GateOutcome::Cancelled,
            }
            if stop.is_cancelled() {
                return GateOutcome::Cancelled;
            }
        }

        self.gate(practice_done(&self.bindings), stop).await
    }

    async fn gate(&mut self, screen: Screen, stop: &CancellationToken) -> GateOutcome {
        wait_for_continue(self.runner.display_mut(), &screen, &self.input, &self.bindings, stop).await
    }

    fn finish(&mut self, mut report: SessionReport, cancelled: bool) -> SessionReport {
        self.stage = SessionStage::Debrief;
        report.cancelled = cancelled;
        let closing = if cancelled {
            info!(completed = report.results.len(), "session cancelled, partial results kept");
            "Experiment interrupted. Data saved."
        } else {
            "Goodbye!"
        };
        self.runner.display_mut().present(&Screen::Message(closing.to_string()));
        report
    }

    fn spawn_quit_watcher(&self, stop: CancellationToken, done: CancellationToken) {
        let mut listener = self.input.listen();
        let bindings = self.bindings.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = done.cancelled() => break,
                    () = stop.cancelled() => break,
                    event = listener.recv() => match event {
                        Some(event) if bindings.is_quit(&event.id) => {
                            info!("quit requested");
                            stop.cancel();
                            break;
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
        });
    }
}

fn instructions(keys: &KeyBindings) -> Screen {
    let (word, nonword) = labels(keys);
    Screen::Message(format!(
        "You will see letter strings briefly followed by a mask.\n\
         Decide if each string is a real English word.\n\
         Press {word} for WORD, {nonword} for NOT A WORD.\n\n\
         Press {word} or {nonword} to begin. Press {} to quit at any time.",
        keys.quit.to_uppercase()
    ))
}

fn practice_intro(keys: &KeyBindings) -> Screen {
    let (word, nonword) = labels(keys);
    Screen::Message(format!(
        "PRACTICE TRIALS\n\nThese trials will not be recorded.\nPress {word} or {nonword} to start practice."
    ))
}

fn practice_done(keys: &KeyBindings) -> Screen {
    let (word, nonword) = labels(keys);
    Screen::Message(format!(
        "Practice complete!\n\nThe real experiment will now begin.\nPress {word} or {nonword} to start."
    ))
}

fn take_a_break(keys: &KeyBindings) -> Screen {
    let (word, nonword) = labels(keys);
    Screen::Message(format!(
        "Halfway done! Take a short break.\nPress {word} or {nonword} to continue."
    ))
}

fn labels(keys: &KeyBindings) -> (String, String) {
    (keys.word.to_uppercase(), keys.nonword.to_uppercase())
}
