use clap::{Args, Parser, Subcommand};
use lexmask_core::duration_from_secs;
use lexmask_experiment::ExperimentConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "lexmask")]
#[command(about = "Masked lexical decision experiment")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one participant session on the console
    Run(RunArgs),
    /// Summarize exported sessions
    Analyze(AnalyzeArgs),
    /// Follow the record store and print live summaries
    Watch(WatchArgs),
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Participant identifier
    #[arg(short, long)]
    pub subject: String,

    /// TOML configuration; flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Comma-separated word list
    #[arg(long, value_delimiter = ',')]
    pub words: Option<Vec<String>>,

    /// Comma-separated pseudoword list
    #[arg(long, value_delimiter = ',')]
    pub pseudowords: Option<Vec<String>>,

    /// Stimulus durations in seconds, comma-separated
    #[arg(long, value_delimiter = ',')]
    pub durations: Option<Vec<f64>>,

    /// Fixation duration in seconds
    #[arg(long)]
    pub fixation: Option<f64>,

    /// Mask duration in seconds
    #[arg(long)]
    pub mask: Option<f64>,

    /// Response timeout in seconds
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Feedback duration in seconds
    #[arg(long)]
    pub feedback: Option<f64>,

    /// Inter-trial blank in seconds
    #[arg(long)]
    pub iti: Option<f64>,

    #[arg(long)]
    pub repetitions: Option<usize>,

    /// Longest allowed run of one lexicality
    #[arg(long)]
    pub max_run: Option<usize>,

    /// Exchange the word and nonword keys
    #[arg(long)]
    pub swap_keys: bool,

    /// Run the practice block first
    #[arg(long)]
    pub practice: bool,

    /// Refresh rate the console display is paced at
    #[arg(long, default_value_t = 60.0)]
    pub refresh_hz: f64,

    /// Seed for the trial order
    #[arg(long)]
    pub seed: Option<u64>,

    /// Where per-subject exports are written
    #[arg(long, default_value = "data")]
    pub data_path: PathBuf,

    /// Record store directory (defaults to <data-path>/store)
    #[arg(long)]
    pub store_path: Option<PathBuf>,

    /// Do not write session and trial records
    #[arg(long)]
    pub no_store: bool,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    #[arg(long, default_value = "data")]
    pub data_path: PathBuf,

    /// Configuration whose clean window applies
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Use every trial, without the clean window
    #[arg(long)]
    pub no_clean: bool,

    /// Print JSON instead of tables
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[arg(long, default_value = "data/store")]
    pub store_path: PathBuf,

    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Quiet period before recomputing, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub debounce_ms: u64,

    /// How often the store files are polled, in milliseconds
    #[arg(long, default_value_t = 250)]
    pub poll_ms: u64,
}

impl RunArgs {
    /// Applies command-line overrides on top of a loaded configuration.
    pub fn apply(&self, config: &mut ExperimentConfig) {
        if let Some(words) = &self.words {
            config.words = words.clone();
        }
        if let Some(pseudowords) = &self.pseudowords {
            config.pseudowords = pseudowords.clone();
        }
        if let Some(durations) = &self.durations {
            config.durations = durations.iter().copied().map(duration_from_secs).collect();
        }
        let timing = &mut config.timing;
        for (value, slot) in [
            (self.fixation, &mut timing.fixation),
            (self.mask, &mut timing.mask),
            (self.timeout, &mut timing.response_timeout),
            (self.feedback, &mut timing.feedback),
            (self.iti, &mut timing.inter_trial),
        ] {
            if let Some(secs) = value {
                *slot = duration_from_secs(secs);
            }
        }
        if let Some(repetitions) = self.repetitions {
            config.design.repetitions = repetitions;
        }
        if let Some(max_run) = self.max_run {
            config.design.max_run = max_run;
        }
        config.swap_keys |= self.swap_keys;
        config.practice.enabled |= self.practice;
    }

    pub fn store_dir(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| self.data_path.join("store"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::time::Duration;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn overrides_replace_config_values() {
        let cli = Cli::parse_from([
            "lexmask",
            "run",
            "--subject",
            "07",
            "--durations",
            "0.033,0.1",
            "--mask",
            "0.1",
            "--repetitions",
            "2",
            "--swap-keys",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut config = ExperimentConfig::default();
        args.apply(&mut config);
        assert_eq!(config.durations, vec![Duration::from_millis(33), Duration::from_millis(100)]);
        assert_eq!(config.timing.mask, Duration::from_millis(100));
        assert_eq!(config.timing.fixation, Duration::from_millis(500));
        assert_eq!(config.design.repetitions, 2);
        assert!(config.swap_keys);
        assert!(!config.practice.enabled);
        assert_eq!(args.store_dir(), PathBuf::from("data/store"));
    }
}
