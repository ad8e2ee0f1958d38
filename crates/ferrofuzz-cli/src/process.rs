//! Process-backed [`WorkerHandle`]: re-execs the current binary as a hidden
//! `worker` subcommand and talks to it over a dedicated pair of pipes.
//!
//! The control channel deliberately does *not* reuse the child's stdin or
//! stdout: `--close-stdout`/`--close-stderr` redirect the *target's*
//! inherited descriptors, and a framed control byte stream living on the
//! same fds as the target's own output would be corrupted by whatever the
//! target itself prints. Instead two anonymous pipes are duped onto fixed
//! fd numbers in the child before exec, leaving fd 0/1/2 free.

use std::os::fd::{AsFd, AsRawFd, FromRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use nix::poll::{PollFd, PollFlags, PollTimeout};
use nix::unistd::pipe;

use ferrofuzz_core::controller::WorkerHandle;
use ferrofuzz_core::error::{Error, Result};
use ferrofuzz_core::ipc::{read_frame, write_frame};
use ferrofuzz_core::messages::{Update, WorkerMessage};

/// fd the child reads controller `Update`s from, after dup2'ing the pipe's
/// read end onto it.
const CHILD_UPDATE_FD: RawFd = 3;
/// fd the child writes `WorkerMessage`s into.
const CHILD_REPORT_FD: RawFd = 4;

/// The worker re-exec's start discipline. Only `Spawn` is implemented;
/// `Fork`/`Forkserver` are accepted on the command line but never take the
/// fork-after-imports path, a known deadlock hazard this implementation
/// avoids entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "kebab-case")]
pub enum StartMethod {
    Spawn,
    Forkserver,
    Fork,
}

/// A worker running in its own OS process, reachable over a pair of pipes.
pub struct ProcessWorker {
    child: Child,
    to_worker: std::fs::File,
    from_worker: std::fs::File,
}

impl ProcessWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        exe: &Path,
        wid: usize,
        target: &str,
        seeds: &[PathBuf],
        max_input_size: usize,
        max_modifications: usize,
        max_insert_length: usize,
        adaptive: bool,
        close_stdout: bool,
        close_stderr: bool,
        stat_frequency: Duration,
        start_method: StartMethod,
    ) -> anyhow::Result<Self> {
        if start_method == StartMethod::Forkserver {
            anyhow::bail!("--start-method=forkserver is not implemented; use spawn");
        }
        if start_method == StartMethod::Fork {
            tracing::warn!(
                "--start-method=fork requested; using spawn semantics anyway \
                 (fork-after-imports is a known deadlock hazard this implementation avoids)"
            );
        }

        let (update_r, update_w) = pipe().map_err(|e| anyhow::anyhow!("creating update pipe: {e}"))?;
        let (report_r, report_w) = pipe().map_err(|e| anyhow::anyhow!("creating report pipe: {e}"))?;

        let mut cmd = Command::new(exe);
        cmd.arg("worker")
            .arg("--wid")
            .arg(wid.to_string())
            .arg("--target")
            .arg(target)
            .arg("--max-input-size")
            .arg(max_input_size.to_string())
            .arg("--max-modifications")
            .arg(max_modifications.to_string())
            .arg("--max-insert-length")
            .arg(max_insert_length.to_string())
            .arg("--stat-frequency-secs")
            .arg(stat_frequency.as_secs().to_string());
        if !adaptive {
            cmd.arg("--non-adaptive");
        }
        if close_stdout {
            cmd.arg("--close-stdout");
        }
        if close_stderr {
            cmd.arg("--close-stderr");
        }
        cmd.args(seeds);
        cmd.stdin(Stdio::null());

        let update_r_raw = update_r.as_raw_fd();
        let report_w_raw = report_w.as_raw_fd();

        // SAFETY: `pre_exec` runs after `fork` and before `exec` in the
        // child only; the closure touches only raw fds already owned by
        // this process and calls only async-signal-safe `dup2`.
        unsafe {
            cmd.pre_exec(move || {
                nix::unistd::dup2(update_r_raw, CHILD_UPDATE_FD).map_err(std::io::Error::from)?;
                nix::unistd::dup2(report_w_raw, CHILD_REPORT_FD).map_err(std::io::Error::from)?;
                if update_r_raw != CHILD_UPDATE_FD {
                    nix::unistd::close(update_r_raw).map_err(std::io::Error::from)?;
                }
                if report_w_raw != CHILD_REPORT_FD {
                    nix::unistd::close(report_w_raw).map_err(std::io::Error::from)?;
                }
                Ok(())
            });
        }

        let child = cmd
            .spawn()
            .map_err(|e| anyhow::anyhow!("spawning worker {wid}: {e}"))?;

        // The controller only ever writes into `update_w` and reads from
        // `report_r`; the other two ends live in the child now.
        drop(update_r);
        drop(report_w);

        Ok(Self {
            child,
            to_worker: std::fs::File::from(update_w),
            from_worker: std::fs::File::from(report_r),
        })
    }

    fn has_data(&self) -> Result<bool> {
        let fd = self.from_worker.as_fd();
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        let n = nix::poll::poll(&mut fds, PollTimeout::ZERO)
            .map_err(|e| Error::InternalBug(format!("poll on worker pipe failed: {e}")))?;
        Ok(n > 0 && fds[0].revents().is_some_and(|r| r.contains(PollFlags::POLLIN)))
    }
}

impl WorkerHandle for ProcessWorker {
    fn send_update(&mut self, update: Update) -> Result<()> {
        write_frame(&mut self.to_worker, &update)
    }

    fn try_recv(&mut self) -> Result<Option<WorkerMessage>> {
        if !self.has_data()? {
            return Ok(None);
        }
        read_frame(&mut self.from_worker)
    }

    fn terminate(&mut self) -> Result<()> {
        let _ = self.child.kill();
        let _ = self.child.wait();
        Ok(())
    }
}

/// Wraps a raw fd the worker inherited (fds 3/4, set up by
/// [`ProcessWorker::spawn`]'s `pre_exec`) as an owned [`std::fs::File`].
///
/// # Safety
/// The caller must ensure `fd` is open, valid, and not otherwise owned.
pub unsafe fn file_from_inherited_fd(fd: RawFd) -> std::fs::File {
    unsafe { std::fs::File::from_raw_fd(fd) }
}

pub const WORKER_UPDATE_FD: RawFd = CHILD_UPDATE_FD;
pub const WORKER_REPORT_FD: RawFd = CHILD_REPORT_FD;
