use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Monotonic clock seam used for every phase and reaction-time measurement.
pub trait Timer: Clone + Send + Sync {
    type Timestamp: Copy + Clone + Send + Sync;
    fn now(&self) -> Self::Timestamp;
    fn elapsed(&self, ts: Self::Timestamp) -> Duration;
    fn between(&self, earlier: Self::Timestamp, later: Self::Timestamp) -> Duration;
}

/// Timer backed by the tokio clock, so paused test time drives it too.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTimer {
    origin: Instant,
}

impl Timer for MonotonicTimer {
    type Timestamp = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, ts: Instant) -> Duration {
        Instant::now().saturating_duration_since(ts)
    }

    fn between(&self, earlier: Instant, later: Instant) -> Duration {
        later.saturating_duration_since(earlier)
    }
}

impl MonotonicTimer {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Time since the timer was created.
    pub fn uptime(&self) -> Duration {
        self.elapsed(self.origin)
    }
}

impl Default for MonotonicTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationStats {
    pub average_frame_time_ns: f64,
    pub jitter_ns: f64,
    pub min_frame_time_ns: f64,
    pub max_frame_time_ns: f64,
    pub effective_fps: f64,
    pub samples: usize,
}

/// Bounded ring of observed refresh intervals.
#[derive(Debug, Clone)]
pub struct FrameIntervals {
    frame_times: VecDeque<Duration>,
    max_samples: usize,
}

impl FrameIntervals {
    pub fn new(max_samples: usize) -> Self {
        Self {
            frame_times: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    pub fn record(&mut self, d: Duration) {
        if self.frame_times.len() >= self.max_samples {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(d);
    }

    pub fn len(&self) -> usize {
        self.frame_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame_times.is_empty()
    }

    pub fn clear(&mut self) {
        self.frame_times.clear();
    }

    pub fn calibration_stats(&self) -> CalibrationStats {
        let times: Vec<f64> = self
            .frame_times
            .iter()
            .map(|d| d.as_nanos() as f64)
            .collect();
        if times.is_empty() {
            return CalibrationStats {
                average_frame_time_ns: 0.0,
                jitter_ns: 0.0,
                min_frame_time_ns: 0.0,
                max_frame_time_ns: 0.0,
                effective_fps: 0.0,
                samples: 0,
            };
        }
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        CalibrationStats {
            average_frame_time_ns: avg,
            jitter_ns: var.sqrt(),
            min_frame_time_ns: min,
            max_frame_time_ns: max,
            effective_fps: if avg > 0.0 { 1e9 / avg } else { 0.0 },
            samples: times.len(),
        }
    }
}

impl Default for FrameIntervals {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_from_steady_intervals() {
        let mut frames = FrameIntervals::new(4);
        for _ in 0..6 {
            frames.record(Duration::from_micros(16_667));
        }
        assert_eq!(frames.len(), 4);
        let stats = frames.calibration_stats();
        assert_eq!(stats.samples, 4);
        assert!(stats.jitter_ns.abs() < 1e-6);
        assert!((stats.effective_fps - 60.0).abs() < 0.01);
    }

    #[test]
    fn empty_ring_reports_zeroes() {
        let stats = FrameIntervals::default().calibration_stats();
        assert_eq!(stats.samples, 0);
        assert_eq!(stats.effective_fps, 0.0);
    }

    #[test]
    fn jitter_is_population_stddev() {
        let mut frames = FrameIntervals::new(10);
        frames.record(Duration::from_millis(10));
        frames.record(Duration::from_millis(20));
        let stats = frames.calibration_stats();
        assert!((stats.jitter_ns - 5_000_000.0).abs() < 1e-3);
        assert_eq!(stats.min_frame_time_ns, 10_000_000.0);
        assert_eq!(stats.max_frame_time_ns, 20_000_000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn monotonic_timer_follows_tokio_clock() {
        let timer = MonotonicTimer::new();
        let t0 = timer.now();
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(timer.elapsed(t0), Duration::from_millis(350));
        assert_eq!(timer.uptime(), Duration::from_millis(350));
    }
}
