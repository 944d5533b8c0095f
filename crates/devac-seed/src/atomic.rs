//! Temp-file + rename commit protocol
//!
//! Every relation file is first written to a uniquely named temp file in the
//! seed's `.tmp/` directory (same filesystem as the final target), fsynced,
//! renamed into place, and the parent directory fsynced. A failure before
//! the first rename unlinks every staged temp; a crash between renames
//! leaves a partially updated snapshot, which readers tolerate by treating
//! missing relation files as empty.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::error::SeedError;
use crate::layout;

/// A temp file written and fsynced, awaiting rename into place.
pub struct StagedFile {
    pub temp_path: PathBuf,
    pub final_path: PathBuf,
}

/// Write `bytes` to a fresh temp file under `<seed_dir>/.tmp/`.
pub fn stage(seed_dir: &Path, final_path: &Path, bytes: &[u8]) -> Result<StagedFile, SeedError> {
    let tmp_dir = layout::tmp_dir(seed_dir);
    fs::create_dir_all(&tmp_dir)?;

    let name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SeedError::write_failed("target path has no file name"))?;
    let temp_path = tmp_dir.join(format!(
        "{name}.{}.{}.tmp",
        std::process::id(),
        devac_core::random_hash(8)
    ));

    let result = (|| -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(SeedError::write_failed(format!(
            "staging {} failed: {e}",
            final_path.display()
        )));
    }

    Ok(StagedFile {
        temp_path,
        final_path: final_path.to_path_buf(),
    })
}

/// Rename every staged file into place, then fsync the parent directories.
///
/// Rename is atomic within the filesystem; after the first successful rename
/// a failure no longer rolls back (readers see a partial snapshot of 1–3
/// relations, which is tolerated).
pub fn commit(staged: Vec<StagedFile>) -> Result<(), SeedError> {
    let mut renamed_any = false;
    let mut parents: Vec<PathBuf> = Vec::new();

    for file in &staged {
        if let Some(parent) = file.final_path.parent() {
            fs::create_dir_all(parent)?;
            if !parents.iter().any(|p| p == parent) {
                parents.push(parent.to_path_buf());
            }
        }
        if let Err(e) = fs::rename(&file.temp_path, &file.final_path) {
            if !renamed_any {
                discard(&staged);
            }
            return Err(SeedError::write_failed(format!(
                "rename to {} failed: {e}",
                file.final_path.display()
            )));
        }
        renamed_any = true;
    }

    for parent in parents {
        fsync_dir(&parent)?;
    }
    Ok(())
}

/// Best-effort unlink of staged temps after a failure.
pub fn discard(staged: &[StagedFile]) {
    for file in staged {
        if let Err(e) = fs::remove_file(&file.temp_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove temp file {}: {e}", file.temp_path.display());
            }
        }
    }
}

/// Write a small file (e.g. `meta.json`) atomically via temp + rename.
pub fn write_atomic(seed_dir: &Path, final_path: &Path, bytes: &[u8]) -> Result<(), SeedError> {
    let staged = stage(seed_dir, final_path, bytes)?;
    commit(vec![staged])
}

/// Persist directory metadata so completed renames survive a crash.
fn fsync_dir(dir: &Path) -> Result<(), SeedError> {
    let handle = File::open(dir)?;
    handle.sync_all()?;
    Ok(())
}

/// Remove temp files older than `max_age`, left behind by crashed writers.
pub fn reap_stale_temps(seed_dir: &Path, max_age: Duration) -> usize {
    let tmp_dir = layout::tmp_dir(seed_dir);
    let Ok(entries) = fs::read_dir(&tmp_dir) else {
        return 0;
    };
    let now = SystemTime::now();
    let mut reaped = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let stale = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .map(|age| age >= max_age)
            .unwrap_or(false);
        if stale && fs::remove_file(&path).is_ok() {
            debug!("reaped stale temp file {}", path.display());
            reaped += 1;
        }
    }
    reaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_write_lands_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let seed = dir.path();
        let target = seed.join("base").join("nodes.col");
        fs::create_dir_all(target.parent().unwrap()).unwrap();

        let staged = stage(seed, &target, b"payload").unwrap();
        assert!(staged.temp_path.exists());
        assert!(!target.exists());

        commit(vec![staged]).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"payload");
        // Temp dir is empty again.
        let leftovers: Vec<_> = fs::read_dir(layout::tmp_dir(seed)).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn discard_removes_temps() {
        let dir = tempfile::tempdir().unwrap();
        let seed = dir.path();
        let target = seed.join("base").join("nodes.col");
        let staged = stage(seed, &target, b"payload").unwrap();
        let temp = staged.temp_path.clone();
        discard(&[staged]);
        assert!(!temp.exists());
    }

    #[test]
    fn reap_ignores_fresh_temps() {
        let dir = tempfile::tempdir().unwrap();
        let seed = dir.path();
        let target = seed.join("base").join("edges.col");
        let _staged = stage(seed, &target, b"x").unwrap();
        assert_eq!(reap_stale_temps(seed, Duration::from_secs(60)), 0);
        assert_eq!(reap_stale_temps(seed, Duration::ZERO), 1);
    }
}
