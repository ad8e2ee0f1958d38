//! Coverage-guided, in-process fuzzing engine: coverage model, adaptive
//! mutator, worker/controller protocol, crash simplifier, and persistent
//! state.
//!
//! This crate is the engine only — argument parsing, process re-exec
//! glue, and logging setup live in `ferrofuzz-cli`.

pub mod bytes;
pub mod controller;
pub mod edge;
pub mod error;
pub mod ipc;
pub mod messages;
pub mod mutator;
pub mod prune;
pub mod sampler;
pub mod simplifier;
pub mod state;
pub mod target;
pub mod tracer;
pub mod worker;

pub use error::{Error, Result};
