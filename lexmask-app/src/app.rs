use crate::cli::{AnalyzeArgs, RunArgs, WatchArgs};
use crate::console::{ConsoleDisplay, spawn_stdin_input};
use crate::export::{load_responses, write_session};
use crate::report::{render_sanity, render_snapshot, render_summary};
use crate::store::{JsonlSink, SESSIONS_FILE, TRIALS_FILE, Tailer};
use anyhow::{Context, Result};
use lexmask_core::{Display, SessionRecord, SubjectId, TrialRecord};
use lexmask_experiment::{Experiment, ExperimentConfig, InputHub, NullSink, ResultSink, SessionReport};
use lexmask_stats::{Aggregator, Arrival, CleanWindow, LiveAggregator, Observation, SanityCheck, spawn_live_view};
use lexmask_timing::{IntervalRefresh, MonotonicTimer};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const FLUSH_GRACE: Duration = Duration::from_secs(5);
const CALIBRATION_FRAMES: usize = 60;

pub fn load_config(path: Option<&Path>) -> Result<ExperimentConfig> {
    match path {
        Some(path) => ExperimentConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(ExperimentConfig::default()),
    }
}

/// The single aggregation policy for a configuration.
pub fn aggregator_for(config: &ExperimentConfig) -> Aggregator {
    Aggregator::new(config.analysis.window().map(CleanWindow::from))
        .with_durations(config.durations.iter().copied())
}

/// `aggregator_for`, with the clean filter dropped when `no_clean` is set.
pub fn offline_aggregator(mut config: ExperimentConfig, no_clean: bool) -> Aggregator {
    if no_clean {
        config.analysis.clean = false;
    }
    aggregator_for(&config)
}

pub async fn run(args: RunArgs) -> Result<()> {
    // invalid identifiers stop here, before anything is created
    let subject = SubjectId::parse(&args.subject).context("invalid participant identifier")?;

    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;
    let config = Arc::new(config);

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let report = if args.no_store {
        drive(&config, &args, subject, Arc::new(NullSink), rng).await?
    } else {
        let sink = JsonlSink::open(args.store_dir()).context("opening record store")?;
        drive(&config, &args, subject, Arc::new(sink), rng).await?
    };

    let dir = write_session(&args.data_path, &report)?;
    info!(dir = %dir.display(), trials = report.results.len(), "session exported");

    let observations: Vec<Observation> = report.results.iter().map(Observation::from).collect();
    println!();
    println!("{}", render_sanity(&SanityCheck::evaluate(report.subject.as_str(), &observations)));
    print!("{}", render_summary(&aggregator_for(&config).summarize(&observations)));
    Ok(())
}

async fn drive<S: ResultSink>(
    config: &Arc<ExperimentConfig>,
    args: &RunArgs,
    subject: SubjectId,
    sink: Arc<S>,
    rng: StdRng,
) -> Result<SessionReport> {
    let hub = InputHub::new();
    let cancel = CancellationToken::new();
    let display = ConsoleDisplay::stdout();
    if !display.is_ready() {
        anyhow::bail!("console display unavailable");
    }

    let mut experiment = Experiment::new(
        config.clone(),
        MonotonicTimer::new(),
        IntervalRefresh::from_hz(args.refresh_hz),
        display,
        hub.clone(),
        sink,
        rng,
    )
    .context("starting session")?;
    experiment.calibrate(CALIBRATION_FRAMES).await;

    let input = spawn_stdin_input(hub, cancel.clone());
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let report = experiment.run(subject, cancel.clone()).await;
    cancel.cancel();
    input.abort();

    if !experiment.flush(FLUSH_GRACE).await {
        warn!(pending = experiment.pending_writes(), "exiting with unsaved records");
    }
    if report.constraint_satisfied == Some(false) {
        warn!("trial order exceeds the configured lexicality run length");
    }
    Ok(report)
}

pub fn analyze(args: AnalyzeArgs) -> Result<()> {
    let aggregator = offline_aggregator(load_config(args.config.as_deref())?, args.no_clean);

    let rows = load_responses(&args.data_path)?;
    let mut by_subject: BTreeMap<&str, Vec<Observation>> = BTreeMap::new();
    for row in &rows {
        by_subject.entry(row.subject.as_str()).or_default().push(Observation::from(row));
    }
    let checks: Vec<SanityCheck> = by_subject
        .iter()
        .map(|(subject, observations)| SanityCheck::evaluate(*subject, observations))
        .collect();
    let all: Vec<Observation> = rows.iter().map(Observation::from).collect();
    let summary = aggregator.summarize(&all);

    if args.json {
        let out = serde_json::json!({
            "subjects": checks,
            "total": summary.total,
            "excluded": summary.excluded,
            "summary": summary.rows(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for check in &checks {
            println!("{}", render_sanity(check));
        }
        println!();
        print!("{}", render_summary(&summary));
    }
    Ok(())
}

pub async fn watch(args: WatchArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let live = LiveAggregator::new(aggregator_for(&config));
    let (tx, rx) = mpsc::channel(256);
    let (mut snapshots, view) = spawn_live_view(rx, live, Duration::from_millis(args.debounce_ms));

    let cancel = CancellationToken::new();
    let poller = tokio::spawn(poll_store(
        args.store_path.clone(),
        Duration::from_millis(args.poll_ms),
        tx,
        cancel.clone(),
    ));
    info!(store = %args.store_path.display(), "watching record store");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                println!("{}", render_snapshot(&snapshot));
            }
        }
    }
    cancel.cancel();
    poller.await.context("store poller failed")??;
    view.await.context("live view failed")?;
    Ok(())
}

/// Tails both store files and forwards every record as an arrival.
pub async fn poll_store(
    dir: impl AsRef<Path>,
    every: Duration,
    tx: mpsc::Sender<Arrival>,
    cancel: CancellationToken,
) -> Result<()> {
    let dir = dir.as_ref();
    let mut sessions = Tailer::<SessionRecord>::new(dir.join(SESSIONS_FILE));
    let mut trials = Tailer::<TrialRecord>::new(dir.join(TRIALS_FILE));
    let mut tick = tokio::time::interval(every);
    loop {
        tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            _ = tick.tick() => {}
        }
        // the streams are independent; trials may overtake their session
        let arrivals = trials
            .poll()
            .await?
            .into_iter()
            .map(Arrival::Trial)
            .chain(sessions.poll().await?.into_iter().map(Arrival::Session));
        for arrival in arrivals {
            if tx.send(arrival).await.is_err() {
                return Ok(());
            }
        }
    }
}
