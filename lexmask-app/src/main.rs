use anyhow::Result;
use clap::Parser;
use lexmask_app::{Cli, Command, app};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let result = runtime.block_on(async {
        match cli.command {
            Command::Run(args) => app::run(args).await,
            Command::Analyze(args) => app::analyze(args),
            Command::Watch(args) => app::watch(args).await,
        }
    });
    // a pending stdin read must not keep the process alive
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}
