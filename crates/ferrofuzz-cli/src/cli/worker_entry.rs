//! Hidden `worker` subcommand: the process body the controller re-execs
//! into. Reads `Update`s from the inherited control-in fd, writes
//! `WorkerMessage`s to the control-out fd, and runs the fuzzing loop of
//! `ferrofuzz_core::worker` until the parent kills it.

use std::io::Read;
use std::os::fd::{AsFd, RawFd};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use ferrofuzz_core::error::{Error, Result as CoreResult};
use ferrofuzz_core::state::State;
use ferrofuzz_core::tracer::ManualTracer;
use ferrofuzz_core::worker::{FramedSink, FramedSource, PollableReader, run_loop};
use nix::poll::{PollFd, PollFlags, PollTimeout};

use crate::cli::GlobalOptions;
use crate::process::{self, WORKER_REPORT_FD, WORKER_UPDATE_FD};
use crate::targets;

#[derive(Debug, clap::Parser)]
pub struct WorkerCommand {
    /// Worker index, used only for log lines and message tagging.
    #[clap(long)]
    wid: usize,

    /// Name of a target registered in the demo registry.
    #[clap(long)]
    target: String,

    #[clap(long, default_value_t = 4096)]
    max_input_size: usize,

    #[clap(long, default_value_t = 10)]
    max_modifications: usize,

    #[clap(long, default_value_t = 16)]
    max_insert_length: usize,

    /// Disable adaptive sampling, falling back to uniform draws.
    #[clap(long)]
    non_adaptive: bool,

    /// Redirect the target's inherited stdout to `/dev/null`.
    #[clap(long)]
    close_stdout: bool,

    /// Redirect the target's inherited stderr to `/dev/null`.
    #[clap(long)]
    close_stderr: bool,

    #[clap(long, default_value_t = 3)]
    stat_frequency_secs: u64,

    /// Seed files/directories, mirroring the controller's own initial pool.
    seeds: Vec<PathBuf>,
}

/// Wraps the inherited control-in pipe so it can report non-blocking
/// readiness without a real event loop.
struct PipeReader(std::fs::File);

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl PollableReader for PipeReader {
    fn has_data(&self) -> CoreResult<bool> {
        let fd = self.0.as_fd();
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        let n = nix::poll::poll(&mut fds, PollTimeout::ZERO)
            .map_err(|e| Error::InternalBug(format!("poll on control pipe failed: {e}")))?;
        Ok(n > 0 && fds[0].revents().is_some_and(|r| r.contains(PollFlags::POLLIN)))
    }
}

impl WorkerCommand {
    pub fn run(self, _global: GlobalOptions) -> anyhow::Result<()> {
        let registry = targets::build_registry();
        let target = ferrofuzz_core::target::resolve(&registry, &self.target)
            .with_context(|| format!("resolving target {:?} in worker {}", self.target, self.wid))?;
        let tracer = ManualTracer::new();

        let mut state = State::new(
            &self.seeds,
            self.max_input_size,
            self.max_modifications,
            self.max_insert_length,
            !self.non_adaptive,
            None,
        )
        .context("constructing worker state")?;

        if self.close_stdout {
            redirect_to_dev_null(1)?;
        }
        if self.close_stderr {
            redirect_to_dev_null(2)?;
        }

        // SAFETY: the controller's `ProcessWorker::spawn` dup2'd these onto
        // fixed fd numbers before exec'ing this process.
        let update_file = unsafe { process::file_from_inherited_fd(WORKER_UPDATE_FD) };
        let report_file = unsafe { process::file_from_inherited_fd(WORKER_REPORT_FD) };

        let mut source = FramedSource::new(PipeReader(update_file));
        let mut sink = FramedSink::new(report_file);
        let mut rng = rand::rng();

        run_loop(
            self.wid,
            target,
            &tracer,
            &mut state,
            &mut source,
            &mut sink,
            Duration::from_secs(self.stat_frequency_secs),
            &mut rng,
            || false,
        )
        .context("worker loop exited with an error")?;

        Ok(())
    }
}

fn redirect_to_dev_null(fd: RawFd) -> anyhow::Result<()> {
    let devnull = std::fs::OpenOptions::new()
        .write(true)
        .open("/dev/null")
        .context("opening /dev/null")?;
    nix::unistd::dup2(devnull.as_raw_fd(), fd)
        .map_err(|e| anyhow::anyhow!("redirecting fd {fd} to /dev/null: {e}"))?;
    Ok(())
}
