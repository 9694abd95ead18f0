use crate::collector::ResponseCollector;
use crate::config::ExperimentConfig;
use lexmask_core::{Display, Feedback, PhaseEvent, Screen, TrialPhase, TrialResult, TrialSpec, mask_for};
use lexmask_timing::{PhaseScheduler, PhaseTiming, RefreshSource, Timer};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    pub result: TrialResult,
    pub timings: Vec<PhaseTiming>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrialRun {
    Completed(TrialOutcome),
    /// Cancellation was observed once `after` finished.
    Interrupted { after: TrialPhase },
}

/// Runs one trial through Fixation, Stimulus, Mask, ResponseWindow and
/// Feedback, then the optional inter-trial blank.
pub struct TrialRunner<T: Timer, R: RefreshSource, D: Display> {
    config: Arc<ExperimentConfig>,
    scheduler: PhaseScheduler<T, R>,
    collector: ResponseCollector<T>,
    display: D,
}

impl<T: Timer, R: RefreshSource, D: Display> TrialRunner<T, R, D> {
    pub fn new(
        config: Arc<ExperimentConfig>,
        scheduler: PhaseScheduler<T, R>,
        collector: ResponseCollector<T>,
        display: D,
    ) -> Self {
        Self {
            config,
            scheduler,
            collector,
            display,
        }
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn scheduler_mut(&mut self) -> &mut PhaseScheduler<T, R> {
        &mut self.scheduler
    }

    pub fn collector(&self) -> &ResponseCollector<T> {
        &self.collector
    }

    pub fn into_display(self) -> D {
        self.display
    }

    pub async fn run(&mut self, spec: &TrialSpec, cancel: &CancellationToken) -> TrialRun {
        let config = self.config.clone();
        let stimulus = spec.stimulus.to_uppercase();
        let mut phase = TrialPhase::default();
        let mut timings = Vec::with_capacity(5);
        let mut result: Option<TrialResult> = None;

        while phase != TrialPhase::Done {
            let event = match phase {
                TrialPhase::Fixation => {
                    self.timed(phase, Screen::Fixation, config.timing.fixation, &mut timings)
                        .await
                }
                TrialPhase::Stimulus => {
                    self.timed(phase, Screen::Stimulus(stimulus.clone()), spec.duration, &mut timings)
                        .await
                }
                TrialPhase::Mask => {
                    let mask = Screen::Mask(mask_for(&spec.stimulus, config.mask_glyph));
                    self.timed(phase, mask, config.timing.mask, &mut timings).await
                }
                TrialPhase::ResponseWindow => {
                    let timeout = config.timing.response_timeout;
                    let window = self.collector.open();
                    let onset = self.scheduler.timer().now();
                    self.display.present(&self.collector.prompt());
                    let response = window.race(timeout).await;
                    timings.push(PhaseTiming {
                        phase,
                        requested: timeout,
                        actual: self.scheduler.timer().elapsed(onset),
                        frames: 0,
                    });

                    let scored = TrialResult::score(spec, response);
                    let event = if scored.timed_out() {
                        PhaseEvent::Timeout
                    } else {
                        PhaseEvent::Decision
                    };
                    result = Some(scored);
                    event
                }
                TrialPhase::Feedback => {
                    let feedback = result
                        .as_ref()
                        .map(Feedback::for_result)
                        .unwrap_or(Feedback::TimedOut);
                    self.timed(phase, Screen::Feedback(feedback), config.timing.feedback, &mut timings)
                        .await
                }
                TrialPhase::Done => break,
            };

            let next = phase.transition(event);
            if next != TrialPhase::Done && cancel.is_cancelled() {
                debug!(trial = spec.index, after = phase.label(), "trial interrupted");
                return TrialRun::Interrupted { after: phase };
            }
            phase = next;
        }

        if !cancel.is_cancelled() {
            self.scheduler
                .hold_for(&mut self.display, &Screen::Blank, config.timing.inter_trial)
                .await;
        }

        match result {
            Some(result) => TrialRun::Completed(TrialOutcome { result, timings }),
            None => TrialRun::Interrupted {
                after: TrialPhase::Feedback,
            },
        }
    }

    async fn timed(
        &mut self,
        phase: TrialPhase,
        screen: Screen,
        minimum: Duration,
        timings: &mut Vec<PhaseTiming>,
    ) -> PhaseEvent {
        let timing = self.scheduler.hold(&mut self.display, phase, &screen, minimum).await;
        let event = PhaseEvent::Elapsed {
            elapsed: timing.actual,
            minimum,
        };
        timings.push(timing);
        event
    }
}
