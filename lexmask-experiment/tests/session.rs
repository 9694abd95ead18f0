use lexmask_core::{Display, Lexicality, Screen, SessionStage, SessionStatus, SubjectId};
use lexmask_experiment::{
    ConfigError, Experiment, ExperimentConfig, InputHub, MemorySink, SessionError, SessionReport,
};
use lexmask_timing::{IntervalRefresh, MonotonicTimer};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Records every new screen and answers gates and prompts through the hub.
struct ScriptedDisplay {
    hub: InputHub,
    screens: Vec<Screen>,
    prompts: usize,
    /// Publish the quit key instead of answering this prompt (1-based).
    quit_on_prompt: Option<usize>,
    ready: bool,
}

impl ScriptedDisplay {
    fn new(hub: &InputHub) -> Self {
        Self {
            hub: hub.clone(),
            screens: Vec::new(),
            prompts: 0,
            quit_on_prompt: None,
            ready: true,
        }
    }

    fn send_after(&self, key: &'static str, after: Duration) {
        let hub = self.hub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            hub.publish(key);
        });
    }

    fn messages(&self) -> Vec<&str> {
        self.screens
            .iter()
            .filter_map(|s| match s {
                Screen::Message(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn stimuli(&self) -> Vec<&str> {
        self.screens
            .iter()
            .filter_map(|s| match s {
                Screen::Stimulus(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Display for ScriptedDisplay {
    fn present(&mut self, screen: &Screen) {
        if self.screens.last() == Some(screen) {
            return;
        }
        self.screens.push(screen.clone());
        match screen {
            Screen::Message(_) => self.send_after("f", Duration::from_millis(20)),
            Screen::Prompt { .. } => {
                self.prompts += 1;
                if self.quit_on_prompt == Some(self.prompts) {
                    self.send_after("escape", Duration::from_millis(100));
                } else {
                    self.send_after("j", Duration::from_millis(300));
                }
            }
            _ => {}
        }
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}

type TestExperiment = Experiment<MonotonicTimer, IntervalRefresh, ScriptedDisplay, MemorySink, StdRng>;

fn experiment(config: ExperimentConfig, display: ScriptedDisplay, hub: InputHub, sink: &Arc<MemorySink>) -> TestExperiment {
    Experiment::new(
        Arc::new(config),
        MonotonicTimer::new(),
        IntervalRefresh::new(Duration::from_millis(10)),
        display,
        hub,
        sink.clone(),
        StdRng::seed_from_u64(2024),
    )
    .unwrap()
}

async fn run(config: ExperimentConfig, quit_on_prompt: Option<usize>) -> (SessionReport, TestExperiment, Arc<MemorySink>) {
    let hub = InputHub::new();
    let mut display = ScriptedDisplay::new(&hub);
    display.quit_on_prompt = quit_on_prompt;
    let sink = Arc::new(MemorySink::new());
    let mut experiment = experiment(config, display, hub, &sink);
    let report = experiment
        .run(SubjectId::parse("07").unwrap(), CancellationToken::new())
        .await;
    assert!(experiment.flush(Duration::from_secs(5)).await);
    (report, experiment, sink)
}

#[tokio::test(start_paused = true)]
async fn full_session_records_every_trial() {
    let (report, experiment, sink) = run(ExperimentConfig::default(), None).await;

    assert!(report.is_complete());
    assert_eq!(report.results.len(), 40);
    assert_eq!(report.timings.len(), 40);
    assert_eq!(report.constraint_satisfied, Some(true));
    for (i, result) in report.results.iter().enumerate() {
        assert_eq!(result.index, i);
        // every prompt was answered "nonword"
        assert_eq!(result.accuracy == 1, result.lexicality == Lexicality::Pseudoword);
        assert_eq!(result.rt, Some(Duration::from_millis(300)));
    }

    let session = report.session.as_ref().unwrap();
    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(session.completed_trials(), 40);

    assert_eq!(sink.trials().len(), 40);
    let stored = sink.latest_session().unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert_eq!(stored.completed_trials, 40);
    assert_eq!(stored.session_id, session.id());

    assert_eq!(experiment.stage(), SessionStage::Debrief);
    assert_eq!(experiment.display().messages().last(), Some(&"Goodbye!"));
    assert!(experiment.display().stimuli().iter().all(|s| *s == s.to_uppercase()));
}

#[tokio::test(start_paused = true)]
async fn quit_keeps_results_gathered_so_far() {
    let (report, experiment, sink) = run(ExperimentConfig::default(), Some(5)).await;

    assert!(report.cancelled);
    assert!(!report.is_complete());
    assert_eq!(report.results.len(), 4);
    assert_eq!(report.trials.len(), 40);
    let session = report.session.as_ref().unwrap();
    assert_eq!(session.status(), SessionStatus::InProgress);
    assert_eq!(session.completed_trials(), 4);

    assert_eq!(sink.trials().len(), 4);
    assert_eq!(sink.latest_session().unwrap().status, SessionStatus::InProgress);
    assert_eq!(
        experiment.display().messages().last(),
        Some(&"Experiment interrupted. Data saved.")
    );
}

#[tokio::test(start_paused = true)]
async fn external_cancellation_before_main_block() {
    let hub = InputHub::new();
    let sink = Arc::new(MemorySink::new());
    let mut experiment = experiment(ExperimentConfig::default(), ScriptedDisplay::new(&hub), hub, &sink);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = experiment.run(SubjectId::parse("07").unwrap(), cancel).await;
    assert!(report.cancelled);
    assert!(report.session.is_none());
    assert!(report.results.is_empty());
    assert!(experiment.flush(Duration::from_secs(1)).await);
    assert!(sink.sessions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn repeated_design_breaks_at_the_midpoint() {
    let mut config = ExperimentConfig::default();
    config.design.repetitions = 2;
    let (report, experiment, _) = run(config, None).await;

    assert_eq!(report.results.len(), 80);
    let screens = &experiment.display().screens;
    let breaks: Vec<usize> = screens
        .iter()
        .enumerate()
        .filter(|(_, s)| matches!(s, Screen::Message(text) if text.starts_with("Halfway done!")))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(breaks.len(), 1);
    let before = screens[..breaks[0]]
        .iter()
        .filter(|s| matches!(s, Screen::Stimulus(_)))
        .count();
    assert_eq!(before, 40);
}

#[tokio::test(start_paused = true)]
async fn single_repetition_has_no_break() {
    let (_, experiment, _) = run(ExperimentConfig::default(), None).await;
    assert!(
        experiment
            .display()
            .messages()
            .iter()
            .all(|m| !m.starts_with("Halfway done!"))
    );
}

#[tokio::test(start_paused = true)]
async fn failing_sink_does_not_disturb_the_session() {
    let hub = InputHub::new();
    let sink = Arc::new(MemorySink::new());
    sink.set_failing(true);
    let mut experiment = experiment(ExperimentConfig::default(), ScriptedDisplay::new(&hub), hub, &sink);

    let report = experiment.run(SubjectId::parse("07").unwrap(), CancellationToken::new()).await;
    assert!(experiment.flush(Duration::from_secs(1)).await);
    assert!(report.is_complete());
    assert_eq!(report.results.len(), 40);
    assert!(sink.trials().is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_sink_never_delays_trials() {
    let hub = InputHub::new();
    let sink = Arc::new(MemorySink::with_delay(Duration::from_secs(30)));
    let mut experiment = experiment(ExperimentConfig::default(), ScriptedDisplay::new(&hub), hub, &sink);

    let report = experiment.run(SubjectId::parse("07").unwrap(), CancellationToken::new()).await;
    assert!(report.is_complete());
    for timings in &report.timings {
        let window = &timings.phases[3];
        assert_eq!(window.actual, Duration::from_millis(300));
    }
    assert!(experiment.pending_writes() > 0);
    assert!(experiment.flush(Duration::from_secs(60)).await);
    assert_eq!(sink.trials().len(), 40);
}

#[tokio::test(start_paused = true)]
async fn practice_is_never_persisted() {
    let mut config = ExperimentConfig::default();
    config.practice.enabled = true;
    let practice: Vec<String> = config
        .practice
        .words
        .iter()
        .chain(&config.practice.pseudowords)
        .map(|s| s.to_uppercase())
        .collect();
    let (report, experiment, sink) = run(config, None).await;

    assert_eq!(report.results.len(), 40);
    assert_eq!(sink.trials().len(), 40);
    assert!(sink.trials().iter().all(|t| !practice.contains(&t.stimulus.to_uppercase())));
    assert!(report.results.iter().all(|r| !practice.contains(&r.stimulus.to_uppercase())));

    let display = experiment.display();
    let shown = display.stimuli();
    assert_eq!(shown.len(), 46);
    assert!(shown[..6].iter().all(|s| practice.contains(&s.to_string())));
    let messages = display.messages();
    assert!(messages.iter().any(|m| m.starts_with("PRACTICE TRIALS")));
    assert!(messages.iter().any(|m| m.starts_with("Practice complete!")));
}

#[tokio::test]
async fn unavailable_display_is_fatal() {
    let hub = InputHub::new();
    let mut display = ScriptedDisplay::new(&hub);
    display.ready = false;
    let result = Experiment::new(
        Arc::new(ExperimentConfig::default()),
        MonotonicTimer::new(),
        IntervalRefresh::new(Duration::from_millis(10)),
        display,
        hub,
        Arc::new(MemorySink::new()),
        StdRng::seed_from_u64(1),
    );
    assert!(matches!(result, Err(SessionError::DisplayUnavailable)));
}

#[tokio::test]
async fn invalid_config_is_rejected_before_the_session() {
    let hub = InputHub::new();
    let mut config = ExperimentConfig::default();
    config.durations.clear();
    let result = Experiment::new(
        Arc::new(config),
        MonotonicTimer::new(),
        IntervalRefresh::new(Duration::from_millis(10)),
        ScriptedDisplay::new(&hub),
        hub,
        Arc::new(MemorySink::new()),
        StdRng::seed_from_u64(1),
    );
    assert!(matches!(result, Err(SessionError::Config(ConfigError::Invalid(_)))));
}
