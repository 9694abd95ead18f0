pub mod collector;
pub mod config;
pub mod controller;
pub mod generator;
pub mod input;
pub mod runner;
pub mod sink;

pub use collector::{ResponseCollector, ResponseWindow};
pub use config::{AnalysisConfig, ConfigError, DesignConfig, ExperimentConfig, PracticeConfig, TimingConfig};
pub use controller::{Experiment, SessionError, SessionReport, TrialTimings};
pub use generator::{Design, TrialSequence, generate_main, generate_practice, longest_run, satisfies_run_limit};
pub use input::{GateOutcome, InputEvent, InputHub, KeyBindings, Listener, wait_for_continue};
pub use runner::{TrialOutcome, TrialRun, TrialRunner};
pub use sink::{MemorySink, NullSink, ResultSink, SinkDispatcher, SinkError};
