//! Per-worker and per-controller fuzzing state: the cumulative edge set,
//! the mutator, and the optional persistent snapshot.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::edge::{CoverageSet, Edge, Location, has_new_edges};
use crate::error::{Error, Result};
use crate::mutator::Mutator;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEdge(
    Option<String>,
    Option<u32>,
    String,
    u32,
);

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    coverage: Vec<SnapshotEdge>,
    population: Vec<String>,
}

/// Owns the cumulative edge set, the mutator, a seed counter, and an
/// optional snapshot path.
pub struct State {
    covered: CoverageSet,
    mutator: Mutator,
    num_seeds: usize,
    snapshot_path: Option<PathBuf>,
    snapshots_enabled: bool,
}

impl State {
    /// Loads files from `seeds` (files and one level of directory
    /// contents, matching `seeds.glob("*")` in the Python original) into
    /// the mutator's input pool. If nothing was found, inserts a single
    /// empty input so the pool is never empty. Then loads `file` if given.
    pub fn new(
        seeds: &[PathBuf],
        max_input_size: usize,
        max_modifications: usize,
        max_insert_length: usize,
        adaptive: bool,
        file: Option<PathBuf>,
    ) -> Result<Self> {
        let mut mutator = Mutator::new(max_input_size, max_modifications, max_insert_length, adaptive)?;
        let mut num_seeds = 0;

        for seed in seeds {
            for entry in WalkDir::new(seed).min_depth(0).max_depth(1) {
                let entry = entry.map_err(|e| Error::LoadError(e.to_string()))?;
                if entry.file_type().is_file() {
                    let data = fs::read(entry.path())?;
                    mutator.put_input(data);
                    num_seeds += 1;
                }
            }
        }

        if num_seeds == 0 {
            mutator.put_input(Vec::new());
        }

        let mut state = Self {
            covered: CoverageSet::new(),
            mutator,
            num_seeds,
            snapshot_path: file,
            snapshots_enabled: true,
        };
        state.load()?;
        Ok(state)
    }

    pub fn num_seeds(&self) -> usize {
        self.num_seeds
    }

    pub fn size(&self) -> usize {
        self.mutator.corpus_len()
    }

    pub fn covered(&self) -> &CoverageSet {
        &self.covered
    }

    /// Unions `edges` into the cumulative set; returns whether it strictly
    /// increased.
    pub fn store_coverage(&mut self, edges: CoverageSet) -> bool {
        let is_new = has_new_edges(&self.covered, &edges);
        self.covered.extend(edges);
        is_new
    }

    pub fn put_input(&mut self, buf: Vec<u8>) {
        self.mutator.put_input(buf);
    }

    pub fn get_input(&mut self, rng: &mut impl rand::Rng) -> Result<Vec<u8>> {
        self.mutator.get_input(rng)
    }

    pub fn update(&mut self, success: bool) {
        self.mutator.update(success);
    }

    pub fn mutator(&self) -> &Mutator {
        &self.mutator
    }

    /// Writes the JSON snapshot, atomically (temp file + rename in the
    /// same directory, so a crash mid-write never leaves a truncated
    /// snapshot on disk).
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        if !self.snapshots_enabled {
            return Ok(());
        }

        let coverage = self
            .covered
            .iter()
            .map(|e| {
                let (pf, pl) = match &e.from {
                    Some(loc) => (Some(loc.file.clone()), Some(loc.line)),
                    None => (None, None),
                };
                SnapshotEdge(pf, pl, e.to.file.clone(), e.to.line)
            })
            .collect();
        let population = self
            .mutator
            .corpus()
            .iter()
            .map(|buf| base64::engine::general_purpose::STANDARD.encode(buf))
            .collect();
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            coverage,
            population,
        };

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(serde_json::to_string_pretty(&snapshot)?.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .map_err(|e| Error::InternalBug(format!("failed to persist snapshot: {e}")))?;
        Ok(())
    }

    /// Loads the snapshot at `self.snapshot_path`, if any. A missing file
    /// is a no-op; an unknown version is a hard `LoadError`; malformed
    /// JSON deletes the file, logs, and continues with a fresh state; a
    /// path that isn't a regular file disables further snapshots.
    fn load(&mut self) -> Result<()> {
        let Some(path) = self.snapshot_path.clone() else {
            return Ok(());
        };

        if !path.exists() {
            return Ok(());
        }
        if !path.is_file() {
            tracing::warn!(path = %path.display(), "snapshot path is not a regular file, disabling snapshots");
            self.snapshots_enabled = false;
            return Ok(());
        }

        let raw = fs::read_to_string(&path)?;
        let snapshot: Snapshot = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed snapshot, discarding");
                let _ = fs::remove_file(&path);
                return Ok(());
            }
        };

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::LoadError(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }

        for SnapshotEdge(pf, pl, cf, cl) in snapshot.coverage {
            let from = match (pf, pl) {
                (Some(f), Some(l)) => Some(Location::new(f, l)),
                _ => None,
            };
            self.covered.insert(Edge {
                from,
                to: Location::new(cf, cl),
            });
        }

        for encoded in snapshot.population {
            let data = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| Error::LoadError(format!("invalid base64 in snapshot: {e}")))?;
            self.mutator.put_input(data);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn empty_seed_list_inserts_empty_input() {
        let state = State::new(&[], 64, 4, 8, true, None).unwrap();
        assert_eq!(state.size(), 1);
        assert_eq!(state.num_seeds(), 0);
    }

    #[test]
    fn coverage_monotonicity() {
        let mut state = State::new(&[], 64, 4, 8, true, None).unwrap();
        let mut set1 = CoverageSet::new();
        set1.insert(Edge {
            from: None,
            to: Location::new("a.rs", 1),
        });
        assert!(state.store_coverage(set1.clone()));
        assert!(!state.store_coverage(set1));
    }

    #[test]
    fn snapshot_round_trip_preserves_coverage_and_pool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let mut state = State::new(&[], 64, 4, 8, true, Some(path.clone())).unwrap();
        let mut set = CoverageSet::new();
        set.insert(Edge {
            from: None,
            to: Location::new("f.py", 1),
        });
        state.store_coverage(set);
        state.put_input(b"deadbeef".to_vec());
        state.save().unwrap();

        let resumed = State::new(&[], 64, 4, 8, true, Some(path)).unwrap();
        assert!(resumed.size() >= 2);
        assert!(resumed.covered().contains(&Edge {
            from: None,
            to: Location::new("f.py", 1),
        }));
    }

    #[test]
    fn unknown_version_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(&path, r#"{"version":99,"coverage":[],"population":[]}"#).unwrap();
        let result = State::new(&[], 64, 4, 8, true, Some(path));
        assert!(matches!(result, Err(Error::LoadError(_))));
    }

    #[test]
    fn malformed_snapshot_is_discarded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(&path, "{not json").unwrap();
        let state = State::new(&[], 64, 4, 8, true, Some(path.clone()));
        assert!(state.is_ok());
        assert!(!path.exists());
    }

    #[test]
    fn seed_directory_is_loaded_one_level_deep() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("seed1"), b"hello").unwrap();
        fs::write(dir.path().join("seed2"), b"world").unwrap();
        let state = State::new(&[dir.path().to_path_buf()], 64, 4, 8, true, None).unwrap();
        assert_eq!(state.num_seeds(), 2);
        assert_eq!(state.size(), 2);
    }

    #[test]
    fn get_input_draws_from_pool() {
        let mut state = State::new(&[], 64, 4, 8, true, None).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let out = state.get_input(&mut rng).unwrap();
        assert!(out.len() <= 64);
    }
}
