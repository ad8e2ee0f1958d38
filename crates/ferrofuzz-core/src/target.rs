//! The function under test, and how a worker process finds it again after
//! re-exec.
//!
//! A serialized closure handed to worker processes at spawn time would be
//! the obvious shape, but Rust closures aren't portably serializable
//! across a process boundary. Instead every binary that links this
//! crate registers its targets by name once, in [`TargetRegistry`]; a
//! worker re-exec carries only the name across the pipe and looks it up in
//! its own copy of the same registry (populated identically to the
//! controller's, since both run from the same binary).

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::error::{Error, Result};

/// The function under test. Implementors should panic to signal a crash;
/// anything else is treated as a clean run.
pub trait Target: Send + Sync {
    fn run(&self, data: &[u8]);
}

impl<F: Fn(&[u8]) + Send + Sync> Target for F {
    fn run(&self, data: &[u8]) {
        (self)(data)
    }
}

/// A process-global name → target map, built once per process at startup.
#[derive(Default, Clone)]
pub struct TargetRegistry {
    targets: HashMap<String, Arc<dyn Target>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, target: Arc<dyn Target>) {
        self.targets.insert(name.into(), target);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Target>> {
        self.targets.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }
}

/// The outcome of invoking a target once.
pub enum RunOutcome {
    Clean,
    /// The target panicked. `message` is the panic payload rendered to a
    /// string; `backtrace` is whatever was captured, which may be
    /// [`std::backtrace::Backtrace::disabled`] if `RUST_BACKTRACE` is unset.
    Crashed {
        message: String,
        backtrace: std::backtrace::Backtrace,
    },
}

/// Runs `target` once against `data`, catching a panic instead of letting
/// it unwind past the worker loop.
pub fn run_once(target: &dyn Target, data: &[u8]) -> Result<RunOutcome> {
    let data = AssertUnwindSafe(data);
    let target = AssertUnwindSafe(target);
    let result = catch_unwind(move || target.0.run(data.0));
    match result {
        Ok(_) => Ok(RunOutcome::Clean),
        Err(payload) => {
            let message = panic_message(&payload);
            let backtrace = std::backtrace::Backtrace::capture();
            Ok(RunOutcome::Crashed { message, backtrace })
        }
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "target panicked with a non-string payload".to_string()
    }
}

/// Looks up `name` in `registry`, translating absence into the error kind
/// a worker reports back to the controller over the control pipe.
pub fn resolve(registry: &TargetRegistry, name: &str) -> Result<Arc<dyn Target>> {
    registry
        .get(name)
        .ok_or_else(|| Error::InternalBug(format!("no target registered under name {name:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_run_reports_clean() {
        let target: Arc<dyn Target> = Arc::new(|_: &[u8]| {});
        let outcome = run_once(target.as_ref(), b"anything").unwrap();
        assert!(matches!(outcome, RunOutcome::Clean));
    }

    #[test]
    fn panicking_target_is_caught() {
        let target: Arc<dyn Target> = Arc::new(|data: &[u8]| {
            if data.first() == Some(&0x2a) {
                panic!("boom");
            }
        });
        let outcome = run_once(target.as_ref(), &[0x2a]).unwrap();
        match outcome {
            RunOutcome::Crashed { message, .. } => assert_eq!(message, "boom"),
            RunOutcome::Clean => panic!("expected a crash"),
        }
        let outcome = run_once(target.as_ref(), &[0x00]).unwrap();
        assert!(matches!(outcome, RunOutcome::Clean));
    }

    #[test]
    fn registry_round_trips_by_name() {
        let mut reg = TargetRegistry::new();
        reg.register("noop", Arc::new(|_: &[u8]| {}));
        assert!(reg.get("noop").is_some());
        assert!(reg.get("missing").is_none());
        assert!(resolve(&reg, "missing").is_err());
    }
}
