pub mod refresh;
pub mod scheduler;
pub mod timer;

pub use refresh::{IntervalRefresh, RefreshSource};
pub use scheduler::{PhaseScheduler, PhaseTiming};
pub use timer::{CalibrationStats, FrameIntervals, MonotonicTimer, Timer};
