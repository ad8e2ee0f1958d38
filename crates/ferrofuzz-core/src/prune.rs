//! Crash directory pruning: delete every artifact that no longer
//! reproduces a failure.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::target::{RunOutcome, Target, run_once};

/// Runs `target` against every file in `crash_dir`; deletes and returns
/// the paths of files that do not raise.
pub fn prune(target: &dyn Target, crash_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut deleted = Vec::new();
    if !crash_dir.exists() {
        return Ok(deleted);
    }
    for entry in fs::read_dir(crash_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let data = fs::read(&path)?;
        if matches!(run_once(target, &data)?, RunOutcome::Clean) {
            tracing::info!(path = %path.display(), "pruning stale crash artifact");
            fs::remove_file(&path)?;
            deleted.push(path);
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn removes_only_files_that_no_longer_crash() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f1"), b"crash 1").unwrap();
        fs::write(dir.path().join("f2"), b"crash 2").unwrap();
        fs::write(dir.path().join("f3"), b"invalid 1").unwrap();
        fs::write(dir.path().join("f4"), b"invalid 2").unwrap();

        let target: Arc<dyn Target> = Arc::new(|data: &[u8]| {
            if std::str::from_utf8(data).unwrap_or("").contains("crash") {
                panic!("crashes");
            }
        });

        let deleted = prune(target.as_ref(), dir.path()).unwrap();
        assert_eq!(deleted.len(), 2);

        let mut remaining: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        remaining.sort();
        assert_eq!(remaining, vec!["f1", "f2"]);
    }
}
