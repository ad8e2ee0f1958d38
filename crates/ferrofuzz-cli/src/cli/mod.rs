mod fuzz;
mod prune;
mod show;
mod simp;
mod worker_entry;

use std::path::PathBuf;

use anyhow::Context;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, clap::Parser)]
#[command(version, about, styles = clap::builder::Styles::styled())]
pub struct Cli {
    #[clap(flatten)]
    global_options: GlobalOptions,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<std::process::ExitCode> {
        setup_logger(&self.global_options).context("Setting up logger")?;
        match self.command {
            Command::Fuzz(cmd) => cmd.run(self.global_options),
            Command::Show(cmd) => cmd
                .run(self.global_options)
                .map(|()| std::process::ExitCode::SUCCESS),
            Command::Simp(cmd) => cmd
                .run(self.global_options)
                .map(|()| std::process::ExitCode::SUCCESS),
            Command::Prune(cmd) => cmd
                .run(self.global_options)
                .map(|()| std::process::ExitCode::SUCCESS),
            Command::Worker(cmd) => cmd
                .run(self.global_options)
                .map(|()| std::process::ExitCode::SUCCESS),
        }
    }
}

/// Options shared by every subcommand.
#[derive(Debug, clap::Parser)]
pub struct GlobalOptions {
    #[clap(long, default_value = "info")]
    default_log_level: LevelFilter,

    /// Directory holding crash artifacts.
    #[clap(long, default_value = "crashes")]
    crash_dir: PathBuf,
}

impl GlobalOptions {
    pub fn crash_dir(&self) -> &std::path::Path {
        &self.crash_dir
    }
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Run the coverage-guided fuzzer.
    Fuzz(Box<fuzz::FuzzCommand>),
    /// Regression mode: replay every crash artifact and summarize by message.
    Show(show::ShowCommand),
    /// Shrink crash artifacts while preserving their edge signature.
    Simp(simp::SimpCommand),
    /// Delete crash artifacts that no longer reproduce.
    Prune(prune::PruneCommand),
    /// Hidden worker process entry point; spawned by `fuzz`, never invoked
    /// directly by a user.
    #[clap(hide = true)]
    Worker(Box<worker_entry::WorkerCommand>),
}

fn setup_logger(global_opts: &GlobalOptions) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_timer(fmt::time::ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_owned())))
        .with(
            EnvFilter::builder()
                .with_default_directive(global_opts.default_log_level.into())
                .from_env()
                .context("Constructing log filter from env.")?,
        )
        .init();

    Ok(())
}
