use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Display refresh opportunities. Each call resolves on the next one.
pub trait RefreshSource: Send {
    fn next_refresh(&mut self) -> impl Future<Output = ()> + Send;

    /// Drops refreshes that fell due before now, so the next call waits for
    /// a fresh one.
    fn align(&mut self) {}

    /// Nominal time between refreshes.
    fn period(&self) -> Duration;
}

/// Fixed-rate refresh driven by a tokio interval. Missed ticks are skipped,
/// as a late frame simply lands on the next vertical blank.
#[derive(Debug)]
pub struct IntervalRefresh {
    interval: Interval,
    origin: Instant,
}

impl IntervalRefresh {
    pub fn new(period: Duration) -> Self {
        let period = period.max(Duration::from_micros(100));
        let origin = Instant::now();
        let mut interval = tokio::time::interval_at(origin + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval, origin }
    }

    pub fn from_hz(hz: f64) -> Self {
        let hz = if hz.is_finite() && hz > 0.0 { hz } else { 60.0 };
        Self::new(Duration::from_secs_f64(1.0 / hz))
    }
}

impl RefreshSource for IntervalRefresh {
    async fn next_refresh(&mut self) {
        self.interval.tick().await;
    }

    fn align(&mut self) {
        // stay on the vblank grid laid down at construction
        let now = Instant::now();
        let period = self.interval.period().as_nanos();
        let since = now.duration_since(self.origin).as_nanos();
        let ahead = period - since % period;
        self.interval.reset_at(now + Duration::from_nanos(ahead as u64));
    }

    fn period(&self) -> Duration {
        self.interval.period()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_are_spaced_by_the_period() {
        let mut refresh = IntervalRefresh::new(Duration::from_millis(10));
        let start = Instant::now();
        refresh.next_refresh().await;
        refresh.next_refresh().await;
        refresh.next_refresh().await;
        assert_eq!(start.elapsed(), Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn align_discards_stale_ticks_and_keeps_the_grid() {
        let mut refresh = IntervalRefresh::new(Duration::from_millis(10));
        let start = Instant::now();
        tokio::time::sleep(Duration::from_micros(43_500)).await;
        refresh.align();
        refresh.next_refresh().await;
        assert_eq!(start.elapsed(), Duration::from_millis(50));
        refresh.align();
        refresh.next_refresh().await;
        assert_eq!(start.elapsed(), Duration::from_millis(60));
    }

    #[test]
    fn bad_rates_fall_back_to_sixty_hz() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let refresh = rt.block_on(async { IntervalRefresh::from_hz(0.0) });
        assert_eq!(refresh.period(), Duration::from_secs_f64(1.0 / 60.0));
    }
}
