//! Messages exchanged between controller and workers: `Update`s flow from
//! controller to worker, everything else flows the other way.

use serde::{Deserialize, Serialize};

use crate::edge::CoverageSet;

/// Sent by the controller down a worker's input channel: a winning input
/// discovered by another worker, broadcast so every worker folds its edges
/// into its own coverage view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub data: Vec<u8>,
    pub covered: CoverageSet,
}

/// A clean run that produced no new coverage; only advances the run count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub wid: usize,
}

/// A clean run that produced new coverage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub wid: usize,
    pub data: Vec<u8>,
    pub covered: CoverageSet,
}

/// The target raised/panicked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashError {
    pub wid: usize,
    pub data: Vec<u8>,
    pub covered: CoverageSet,
    pub message: String,
}

/// An uncaught failure in the worker itself, not the target. Fatal to the
/// whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bug {
    pub wid: usize,
    pub message: String,
}

/// Sent by a worker up its output channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerMessage {
    Status(Status),
    Report(Report),
    Error(CrashError),
    Bug(Bug),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_message_round_trips_through_bincode() {
        let msg = WorkerMessage::Report(Report {
            wid: 3,
            data: vec![1, 2, 3],
            covered: CoverageSet::new(),
        });
        let encoded = bincode::serialize(&msg).unwrap();
        let decoded: WorkerMessage = bincode::deserialize(&encoded).unwrap();
        match decoded {
            WorkerMessage::Report(r) => assert_eq!(r.wid, 3),
            _ => panic!("wrong variant"),
        }
    }
}
