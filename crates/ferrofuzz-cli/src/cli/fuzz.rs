//! `fuzz` subcommand: controller bootstrap and main loop, wired to real
//! OS-process workers.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use ferrofuzz_core::controller::{Budget, Controller, WorkerHandle};
use ferrofuzz_core::state::State;
use ferrofuzz_core::tracer::ManualTracer;

use crate::cli::GlobalOptions;
use crate::process::{ProcessWorker, StartMethod};
use crate::targets;

/// Fuzz a registered target.
#[derive(Debug, clap::Parser)]
pub struct FuzzCommand {
    /// Name of a target registered in the demo registry.
    #[clap(long, default_value = "magic-byte")]
    target: String,

    /// Seed files and directories (one level of directory contents is read).
    seeds: Vec<PathBuf>,

    /// Number of parallel workers. Defaults to CPU count minus one.
    #[clap(long, short = 'j')]
    num_workers: Option<usize>,

    #[clap(long, default_value_t = 4096)]
    max_input_size: usize,

    #[clap(long, default_value_t = 16)]
    max_insert_length: usize,

    #[clap(long, default_value_t = 10)]
    max_modifications: usize,

    /// Redirect the target's inherited stdout to `/dev/null` in every worker.
    #[clap(long)]
    close_stdout: bool,

    /// Redirect the target's inherited stderr to `/dev/null` in every worker.
    #[clap(long)]
    close_stderr: bool,

    #[clap(long)]
    max_crashes: Option<u64>,

    #[clap(long)]
    max_runs: Option<u64>,

    /// Stop after this many seconds.
    #[clap(long)]
    max_time_secs: Option<u64>,

    /// Enable adaptive sampling (default; the flag exists only for
    /// symmetry with `--non-adaptive`).
    #[clap(long, conflicts_with = "non_adaptive")]
    adaptive: bool,

    /// Disable adaptive sampling: every sampler behaves as a uniform RNG.
    #[clap(long, conflicts_with = "adaptive")]
    non_adaptive: bool,

    #[clap(long, value_enum, default_value_t = StartMethod::Spawn)]
    start_method: StartMethod,

    /// Path to a JSON snapshot to resume from and persist progress into.
    #[clap(long)]
    state_file: Option<PathBuf>,

    #[clap(long, default_value_t = 3)]
    stat_frequency_secs: u64,

    /// Replay the crash directory at startup so already-known crashes are
    /// folded into coverage instead of being reported again.
    #[clap(long)]
    load_crashes: bool,
}

impl FuzzCommand {
    pub fn run(self, global: GlobalOptions) -> anyhow::Result<ExitCode> {
        let registry = targets::build_registry();
        if registry.get(&self.target).is_none() {
            let available: Vec<&str> = registry.names().collect();
            anyhow::bail!(
                "unknown target {:?} (available: {})",
                self.target,
                available.join(", ")
            );
        }

        let num_workers = self
            .num_workers
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1).max(1));
        let adaptive = !self.non_adaptive;
        let exe = std::env::current_exe().context("locating current executable")?;

        let stop = Arc::new(AtomicBool::new(false));
        {
            let stop = stop.clone();
            ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
                .context("installing Ctrl-C handler")?;
        }

        let state = State::new(
            &self.seeds,
            self.max_input_size,
            self.max_modifications,
            self.max_insert_length,
            adaptive,
            self.state_file.clone(),
        )
        .context("constructing initial state")?;
        tracing::info!(seeds = state.num_seeds(), pool = state.size(), "loaded initial corpus");

        let stat_frequency = Duration::from_secs(self.stat_frequency_secs);
        let mut workers: Vec<Box<dyn WorkerHandle>> = Vec::with_capacity(num_workers);
        for wid in 0..num_workers {
            let worker = ProcessWorker::spawn(
                &exe,
                wid,
                &self.target,
                &self.seeds,
                self.max_input_size,
                self.max_modifications,
                self.max_insert_length,
                adaptive,
                self.close_stdout,
                self.close_stderr,
                stat_frequency,
                self.start_method,
            )
            .with_context(|| format!("spawning worker {wid}"))?;
            workers.push(Box::new(worker));
        }

        let budget = Budget {
            max_runs: self.max_runs,
            max_time: self.max_time_secs.map(Duration::from_secs),
            max_crashes: self.max_crashes,
            stat_frequency,
        };

        let mut controller = Controller::new(workers, state, global.crash_dir().to_path_buf(), budget, stop);

        if self.load_crashes {
            let target = ferrofuzz_core::target::resolve(&registry, &self.target)
                .context("resolving target for crash replay")?;
            let tracer = ManualTracer::new();
            controller
                .load_crashes(target.as_ref(), &tracer)
                .context("replaying existing crash artifacts")?;
        }

        let stats = controller.run().context("running fuzz controller")?;
        tracing::info!(runs = stats.runs, crashes = stats.crashes, "fuzzing stopped");

        if stats.crashes > 0 {
            Ok(ExitCode::from(1))
        } else {
            Ok(ExitCode::SUCCESS)
        }
    }
}
