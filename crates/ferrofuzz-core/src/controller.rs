//! Fan-out coordinator: spawns workers, broadcasts novel inputs, persists
//! crashes and state, and enforces the stop budgets.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::messages::{Update, WorkerMessage};
use crate::state::State;
use crate::target::{RunOutcome, Target, run_once};
use crate::tracer::Tracer;

/// Everything the controller needs to talk to one worker, abstracted so
/// the main loop is testable without real child processes. The production
/// implementation (`ferrofuzz-cli::worker_entry`) backs this with a
/// re-exec'd process and the framed pipes of [`crate::ipc`].
pub trait WorkerHandle {
    fn send_update(&mut self, update: Update) -> Result<()>;
    fn try_recv(&mut self) -> Result<Option<WorkerMessage>>;
    fn terminate(&mut self) -> Result<()>;
}

/// Stop conditions and pacing knobs, mirroring the controller's own state
/// plus the CLI-facing flags layered on top of it.
pub struct Budget {
    pub max_runs: Option<u64>,
    pub max_time: Option<Duration>,
    pub max_crashes: Option<u64>,
    pub stat_frequency: Duration,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_runs: None,
            max_time: None,
            max_crashes: None,
            stat_frequency: Duration::from_secs(3),
        }
    }
}

/// Tallies tracked across the run, surfaced to the CLI for the final exit
/// code and to `_log_stats`-style PULSE/NEW lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub runs: u64,
    pub crashes: u64,
}

pub struct Controller {
    workers: Vec<Box<dyn WorkerHandle>>,
    state: State,
    crash_dir: PathBuf,
    budget: Budget,
    stats: Stats,
    start: Instant,
    last_stats_time: Instant,
    last_stats_runs: u64,
    stop: Arc<AtomicBool>,
}

impl Controller {
    pub fn new(
        workers: Vec<Box<dyn WorkerHandle>>,
        state: State,
        crash_dir: PathBuf,
        budget: Budget,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let now = Instant::now();
        Self {
            workers,
            state,
            crash_dir,
            budget,
            stats: Stats::default(),
            start: now,
            last_stats_time: now,
            last_stats_runs: 0,
            stop,
        }
    }

    /// Replays every file already in the crash directory through `target`,
    /// folding the edges of every reproducing crash into the state's
    /// coverage so the same bug is never reported twice.
    pub fn load_crashes(&mut self, target: &dyn Target, tracer: &dyn Tracer) -> Result<()> {
        if !self.crash_dir.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.crash_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let data = fs::read(entry.path())?;
            tracer.reset();
            if let RunOutcome::Crashed { backtrace, .. } = run_once(target, &data)? {
                let covered = tracer.covered_from_backtrace(&backtrace);
                self.state.store_coverage(covered);
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    fn should_stop(&self) -> bool {
        if self.stop.load(Ordering::Relaxed) {
            return true;
        }
        if let Some(max_runs) = self.budget.max_runs {
            if self.stats.runs >= max_runs {
                return true;
            }
        }
        if let Some(max_time) = self.budget.max_time {
            if self.start.elapsed() >= max_time {
                return true;
            }
        }
        if let Some(max_crashes) = self.budget.max_crashes {
            if self.stats.crashes >= max_crashes {
                return true;
            }
        }
        false
    }

    /// Runs until a stop condition fires, then persists state and tears
    /// down workers. Returns the final tallies.
    pub fn run(&mut self) -> Result<Stats> {
        loop {
            if self.should_stop() {
                break;
            }

            let mut broadcasts: Vec<(usize, Update)> = Vec::new();
            let mut bug: Option<String> = None;
            let mut any_message = false;

            for (idx, worker) in self.workers.iter_mut().enumerate() {
                while let Some(msg) = worker.try_recv()? {
                    any_message = true;
                    match msg {
                        WorkerMessage::Bug(b) => {
                            bug = Some(b.message);
                            break;
                        }
                        WorkerMessage::Error(e) => {
                            self.stats.runs += 1;
                            let is_new = self.state.store_coverage(e.covered);
                            if is_new {
                                self.stats.crashes += 1;
                                self.persist_crash(&e.data)?;
                            }
                        }
                        WorkerMessage::Report(r) => {
                            self.stats.runs += 1;
                            let is_new = self.state.store_coverage(r.covered.clone());
                            if is_new {
                                tracing::info!(wid = r.wid, "NEW coverage");
                                self.state.put_input(r.data.clone());
                                self.state.save()?;
                                broadcasts.push((
                                    idx,
                                    Update {
                                        data: r.data,
                                        covered: r.covered,
                                    },
                                ));
                            }
                        }
                        WorkerMessage::Status(_) => {
                            self.stats.runs += 1;
                        }
                    }
                }
                if bug.is_some() {
                    break;
                }
            }

            if let Some(message) = bug {
                self.terminate_workers();
                return Err(Error::InternalBug(message));
            }

            for (from, update) in broadcasts {
                for (idx, worker) in self.workers.iter_mut().enumerate() {
                    if idx == from {
                        continue;
                    }
                    worker.send_update(update.clone())?;
                }
            }

            if self.last_stats_time.elapsed() >= self.budget.stat_frequency {
                let elapsed = self.last_stats_time.elapsed().as_secs_f64().max(f64::EPSILON);
                let exec_per_sec = (self.stats.runs - self.last_stats_runs) as f64 / elapsed;
                tracing::info!(
                    runs = self.stats.runs,
                    crashes = self.stats.crashes,
                    exec_per_sec,
                    "PULSE"
                );
                self.last_stats_time = Instant::now();
                self.last_stats_runs = self.stats.runs;
            }

            if !any_message {
                // No worker had anything ready; a short poll timeout so the
                // controller doesn't spin a whole core just re-checking
                // empty pipes.
                std::thread::sleep(Duration::from_millis(5));
            }
        }

        self.state.save()?;
        self.terminate_workers();
        Ok(self.stats)
    }

    fn persist_crash(&self, data: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.crash_dir)?;
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        let path = self.crash_dir.join(format!("crash-{hex}"));
        fs::write(&path, data)?;
        if data.len() < 200 {
            let preview: String = data.iter().map(|b| format!("{b:02x}")).collect();
            tracing::info!(sample = %preview, "crash sample");
        }
        tracing::warn!(path = %path.display(), "new crash");
        Ok(())
    }

    fn terminate_workers(&mut self) {
        for worker in &mut self.workers {
            let _ = worker.terminate();
        }
    }
}

/// Regression mode: replay every crash artifact and return a
/// unique-by-message summary.
pub fn regress(target: &dyn Target, tracer: &dyn Tracer, crash_dir: &Path) -> Result<Vec<(String, usize)>> {
    let mut by_message: HashMap<String, usize> = HashMap::new();
    if !crash_dir.exists() {
        return Ok(Vec::new());
    }
    for entry in fs::read_dir(crash_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let data = fs::read(entry.path())?;
        tracer.reset();
        if let RunOutcome::Crashed { message, .. } = run_once(target, &data)? {
            *by_message.entry(message).or_insert(0) += 1;
        }
    }
    let mut summary: Vec<(String, usize)> = by_message.into_iter().collect();
    summary.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::{Edge, Location};
    use crate::messages::{CrashError, Report};
    use crate::tracer::ManualTracer;
    use std::collections::VecDeque;

    use std::sync::Mutex;

    struct MockWorker {
        outbox: VecDeque<WorkerMessage>,
        sent: Arc<Mutex<Vec<Update>>>,
        terminated: Arc<AtomicBool>,
    }

    impl WorkerHandle for MockWorker {
        fn send_update(&mut self, update: Update) -> Result<()> {
            self.sent.lock().unwrap().push(update);
            Ok(())
        }
        fn try_recv(&mut self) -> Result<Option<WorkerMessage>> {
            Ok(self.outbox.pop_front())
        }
        fn terminate(&mut self) -> Result<()> {
            self.terminated.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    fn edge(n: u32) -> crate::edge::CoverageSet {
        let mut s = crate::edge::CoverageSet::new();
        s.insert(Edge {
            from: None,
            to: Location::new("f.rs", n),
        });
        s
    }

    #[test]
    fn new_crash_increments_counter_and_persists_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let worker = MockWorker {
            outbox: VecDeque::from([WorkerMessage::Error(CrashError {
                wid: 0,
                data: b"boom".to_vec(),
                covered: edge(1),
                message: "panic".into(),
            })]),
            sent: Arc::new(Mutex::new(Vec::new())),
            terminated: Arc::new(AtomicBool::new(false)),
        };
        let state = State::new(&[], 64, 4, 8, true, None).unwrap();
        let budget = Budget {
            max_runs: Some(1),
            ..Default::default()
        };
        let mut controller = Controller::new(
            vec![Box::new(worker)],
            state,
            dir.path().to_path_buf(),
            budget,
            Arc::new(AtomicBool::new(false)),
        );
        let stats = controller.run().unwrap();
        assert_eq!(stats.crashes, 1);
        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn report_broadcasts_to_all_but_reporter() {
        let sent_a = Arc::new(Mutex::new(Vec::new()));
        let sent_b = Arc::new(Mutex::new(Vec::new()));
        let worker_a = MockWorker {
            outbox: VecDeque::from([WorkerMessage::Report(Report {
                wid: 0,
                data: b"x".to_vec(),
                covered: edge(2),
            })]),
            sent: sent_a.clone(),
            terminated: Arc::new(AtomicBool::new(false)),
        };
        let worker_b = MockWorker {
            outbox: VecDeque::new(),
            sent: sent_b.clone(),
            terminated: Arc::new(AtomicBool::new(false)),
        };
        let state = State::new(&[], 64, 4, 8, true, None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let budget = Budget {
            max_runs: Some(1),
            ..Default::default()
        };
        let mut controller = Controller::new(
            vec![Box::new(worker_a), Box::new(worker_b)],
            state,
            dir.path().to_path_buf(),
            budget,
            Arc::new(AtomicBool::new(false)),
        );
        controller.run().unwrap();
        // worker_a (index 0) authored the report, so only worker_b (index
        // 1) should have received the broadcast.
        assert!(sent_a.lock().unwrap().is_empty());
        assert_eq!(sent_b.lock().unwrap().len(), 1);
    }

    #[test]
    fn bug_message_terminates_all_workers() {
        let terminated = Arc::new(AtomicBool::new(false));
        let worker = MockWorker {
            outbox: VecDeque::from([WorkerMessage::Bug(crate::messages::Bug {
                wid: 0,
                message: "oops".into(),
            })]),
            sent: Arc::new(Mutex::new(Vec::new())),
            terminated: terminated.clone(),
        };
        let state = State::new(&[], 64, 4, 8, true, None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut controller = Controller::new(
            vec![Box::new(worker)],
            state,
            dir.path().to_path_buf(),
            Budget::default(),
            Arc::new(AtomicBool::new(false)),
        );
        let result = controller.run();
        assert!(matches!(result, Err(Error::InternalBug(_))));
        assert!(terminated.load(Ordering::Relaxed));
    }

    #[test]
    fn regression_mode_dedups_by_message() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("crash-a"), b"trigger").unwrap();
        fs::write(dir.path().join("crash-b"), b"trigger-again").unwrap();
        let target: Arc<dyn Target> = Arc::new(|data: &[u8]| {
            if data.starts_with(b"trigger") {
                panic!("always the same message");
            }
        });
        let tracer = ManualTracer::new();
        let summary = regress(target.as_ref(), &tracer, dir.path()).unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].1, 2);
    }
}
