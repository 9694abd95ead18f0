//! Summary statistics shared by the end-of-session report, offline analysis
//! and the live view.

pub mod aggregate;
pub mod live;
pub mod sanity;

pub use aggregate::{Aggregator, CleanWindow, Observation, Summary, SummaryCell, SummaryRow};
pub use live::{Arrival, DEFAULT_QUIET, LiveAggregator, LiveSnapshot, SubjectView, spawn_live_view};
pub use sanity::{HIGH_MISSING_RATE, LOW_ACCURACY, SanityCheck};
