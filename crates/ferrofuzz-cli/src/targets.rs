//! Demo target registry.
//!
//! Stands in for a `--target-executable`-style flag pointed at a real
//! binary: the core's [`ferrofuzz_core::target::TargetRegistry`] needs
//! *some* concrete, by-name-resolvable targets so the `fuzz`/`show`/`simp`/
//! `prune` subcommands and the worker re-exec have something to run without
//! requiring users to compile their own harness binary first. Embedding
//! applications are expected to build their own registry the same way and
//! link against `ferrofuzz-core` directly; this one ships only the toy
//! targets used in this crate's own tests and doc examples.

use std::sync::Arc;

use ferrofuzz_core::edge::Location;
use ferrofuzz_core::target::TargetRegistry;
use ferrofuzz_core::tracer::ManualTracer;

pub fn build_registry() -> TargetRegistry {
    let mut registry = TargetRegistry::new();

    registry.register(
        "noop",
        Arc::new(|_: &[u8]| {
            ManualTracer::new().hit(Location::new("targets.rs", 24));
        }),
    );

    registry.register(
        "magic-byte",
        Arc::new(|data: &[u8]| {
            let tracer = ManualTracer::new();
            if data.first() == Some(&0x2a) {
                tracer.hit(Location::new("targets.rs", 34));
                panic!("input starts with the magic byte 0x2a");
            }
            tracer.hit(Location::new("targets.rs", 37));
        }),
    );

    registry.register(
        "markers",
        Arc::new(|data: &[u8]| {
            let tracer = ManualTracer::new();
            let text = String::from_utf8_lossy(data);
            if text.starts_with("START") {
                tracer.hit(Location::new("targets.rs", 46));
                if text.ends_with("END") {
                    tracer.hit(Location::new("targets.rs", 48));
                    if text.contains("CRASH") {
                        tracer.hit(Location::new("targets.rs", 50));
                        panic!("input matched START..CRASH..END");
                    }
                }
            }
        }),
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_the_demo_targets() {
        let registry = build_registry();
        let mut names: Vec<&str> = registry.names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["magic-byte", "markers", "noop"]);
    }
}
