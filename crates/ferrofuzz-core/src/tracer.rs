//! Coverage collection.
//!
//! A per-line interpreter callback has no direct Rust equivalent, so
//! [`Tracer`] is an explicit trait that a target notifies as it runs, plus
//! a best-effort fallback that recovers a crash's last frame from a
//! [`std::backtrace::Backtrace`] when the target can't or doesn't
//! instrument itself.

use std::backtrace::Backtrace;
use std::cell::RefCell;

use crate::edge::{CoverageSet, Edge, Location};

/// Something that can record edges as a target executes and hand back the
/// accumulated set.
pub trait Tracer: Send + Sync {
    /// Clears per-run state. Called once before every target invocation.
    fn reset(&self);

    /// Notes a step into `loc`. Targets that instrument themselves call
    /// this directly; [`ManualTracer::hit`] is the concrete entry point.
    fn hit(&self, loc: Location);

    /// Returns everything recorded since the last [`Tracer::reset`].
    fn get_covered(&self) -> CoverageSet;

    /// Best-effort recovery of a single edge from a panic's backtrace. This
    /// is the authoritative source of a crash's coverage: callers use it
    /// unconditionally on a crash, in place of (not layered on top of)
    /// whatever [`Tracer::hit`] recorded before the panic, since the frame
    /// that actually faulted is what should be attributed to the crash.
    fn covered_from_backtrace(&self, bt: &Backtrace) -> CoverageSet {
        let mut set = CoverageSet::new();
        if let Some(loc) = last_frame_location(bt) {
            set.insert(Edge { from: None, to: loc });
        }
        set
    }
}

thread_local! {
    static PREV: RefCell<Option<Location>> = const { RefCell::new(None) };
    static SEEN: RefCell<CoverageSet> = RefCell::new(CoverageSet::new());
}

/// The tracer shipped with the engine: thread-local previous-location state
/// plus a per-reset accumulator, scoped per-thread since each worker
/// process runs its target on its own thread.
#[derive(Debug, Default)]
pub struct ManualTracer;

impl ManualTracer {
    pub fn new() -> Self {
        Self
    }

    /// Records a step into `loc`, pairing it with whatever location was
    /// last recorded on this thread.
    pub fn hit(&self, loc: Location) {
        PREV.with(|prev| {
            let from = prev.borrow().clone();
            SEEN.with(|seen| {
                seen.borrow_mut().insert(Edge {
                    from,
                    to: loc.clone(),
                });
            });
            *prev.borrow_mut() = Some(loc);
        });
    }
}

impl Tracer for ManualTracer {
    fn reset(&self) {
        PREV.with(|prev| *prev.borrow_mut() = None);
        SEEN.with(|seen| seen.borrow_mut().clear());
    }

    fn hit(&self, loc: Location) {
        ManualTracer::hit(self, loc);
    }

    fn get_covered(&self) -> CoverageSet {
        SEEN.with(|seen| seen.borrow().clone())
    }
}

/// Parses the innermost non-runtime frame out of a backtrace, in the form
/// `(symbol_file, line)`. Backtraces captured with `BacktraceStatus::Disabled`
/// (i.e. `RUST_BACKTRACE` unset) yield `None`, so [`Tracer::covered_from_backtrace`]
/// reports an empty set rather than anything [`ManualTracer::hit`] recorded
/// before the panic.
fn last_frame_location(bt: &Backtrace) -> Option<Location> {
    if bt.status() != std::backtrace::BacktraceStatus::Captured {
        return None;
    }
    let rendered = bt.to_string();
    for line in rendered.lines() {
        let line = line.trim();
        if let Some(at) = line.strip_prefix("at ") {
            let mut parts = at.rsplitn(2, ':');
            let _col = parts.next()?;
            let rest = parts.next()?;
            let mut parts = rest.rsplitn(2, ':');
            let line_no: u32 = parts.next()?.parse().ok()?;
            let file = parts.next()?.to_string();
            if file.contains("/rustc/") || file.contains("library/") {
                continue;
            }
            return Some(Location::new(file, line_no));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_accumulated_edges() {
        let t = ManualTracer::new();
        t.reset();
        t.hit(Location::new("f.rs", 1));
        t.hit(Location::new("f.rs", 2));
        assert_eq!(t.get_covered().len(), 2);
        t.reset();
        assert!(t.get_covered().is_empty());
    }

    #[test]
    fn consecutive_hits_chain_from_previous() {
        let t = ManualTracer::new();
        t.reset();
        t.hit(Location::new("f.rs", 1));
        t.hit(Location::new("f.rs", 2));
        let covered = t.get_covered();
        assert!(covered.contains(&Edge {
            from: None,
            to: Location::new("f.rs", 1),
        }));
        assert!(covered.contains(&Edge {
            from: Some(Location::new("f.rs", 1)),
            to: Location::new("f.rs", 2),
        }));
    }

    #[test]
    fn backtrace_fallback_is_none_when_not_captured() {
        let t = ManualTracer::new();
        let bt = Backtrace::disabled();
        assert!(t.covered_from_backtrace(&bt).is_empty());
    }
}
