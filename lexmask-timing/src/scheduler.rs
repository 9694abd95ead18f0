use crate::refresh::RefreshSource;
use crate::timer::{CalibrationStats, FrameIntervals, Timer};
use lexmask_core::{Display, Screen, TrialPhase};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Requested versus observed duration of one phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseTiming {
    pub phase: TrialPhase,
    #[serde(serialize_with = "as_secs")]
    pub requested: Duration,
    #[serde(serialize_with = "as_secs")]
    pub actual: Duration,
    pub frames: u32,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Holds a screen for at least a minimum duration, resolving on the first
/// refresh at which the elapsed time reaches it.
pub struct PhaseScheduler<T: Timer, R: RefreshSource> {
    timer: T,
    refresh: R,
    intervals: FrameIntervals,
}

impl<T: Timer, R: RefreshSource> PhaseScheduler<T, R> {
    pub fn new(timer: T, refresh: R) -> Self {
        Self {
            timer,
            refresh,
            intervals: FrameIntervals::default(),
        }
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn refresh_period(&self) -> Duration {
        self.refresh.period()
    }

    /// Shows `screen` for `phase`, returning once `minimum` has elapsed on a
    /// refresh boundary.
    pub async fn hold<D: Display + ?Sized>(
        &mut self,
        display: &mut D,
        phase: TrialPhase,
        screen: &Screen,
        minimum: Duration,
    ) -> PhaseTiming {
        let (actual, frames) = self.hold_for(display, screen, minimum).await;
        debug!(
            phase = phase.label(),
            requested_ms = minimum.as_secs_f64() * 1e3,
            actual_ms = actual.as_secs_f64() * 1e3,
            frames,
            "phase resolved"
        );
        PhaseTiming {
            phase,
            requested: minimum,
            actual,
            frames,
        }
    }

    /// Time-floor loop shared by trial phases and untimed screens such as the
    /// inter-trial blank.
    pub async fn hold_for<D: Display + ?Sized>(
        &mut self,
        display: &mut D,
        screen: &Screen,
        minimum: Duration,
    ) -> (Duration, u32) {
        display.present(screen);
        let onset = self.timer.now();
        if minimum.is_zero() {
            return (Duration::ZERO, 0);
        }
        self.refresh.align();

        let mut frames = 0u32;
        let mut last = onset;
        loop {
            self.refresh.next_refresh().await;
            frames += 1;
            let at = self.timer.now();
            self.intervals.record(self.timer.between(last, at));
            last = at;

            let elapsed = self.timer.elapsed(onset);
            if elapsed >= minimum {
                return (elapsed, frames);
            }
            display.present(screen);
        }
    }

    /// Samples `frames` consecutive refreshes and reports their statistics.
    pub async fn calibrate(&mut self, frames: usize) -> CalibrationStats {
        self.intervals.clear();
        self.refresh.next_refresh().await;
        let mut last = self.timer.now();
        for _ in 0..frames {
            self.refresh.next_refresh().await;
            let at = self.timer.now();
            self.intervals.record(self.timer.between(last, at));
            last = at;
        }
        self.intervals.calibration_stats()
    }

    pub fn calibration_stats(&self) -> CalibrationStats {
        self.intervals.calibration_stats()
    }
}
