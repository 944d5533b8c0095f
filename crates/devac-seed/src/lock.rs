//! Per-package advisory lock
//!
//! A package serializes all its writers through `.devac.lock` under the seed
//! directory. The lock file records the holder's pid and acquisition time; a
//! lock past the stale threshold whose process is confirmed gone may be
//! force-released by the next acquirer. Readers never take the lock.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SeedError;
use crate::layout;

#[derive(Debug, Clone)]
pub struct LockOptions {
    /// How long `acquire` waits before giving up with `LockTimeout`.
    pub timeout: Duration,
    /// Age past which a lock with a dead holder may be force-released.
    pub stale_after: Duration,
    /// Retry interval while waiting.
    pub poll_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        LockOptions {
            timeout: Duration::from_secs(10),
            stale_after: Duration::from_secs(30),
            poll_interval: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    acquired_at_epoch_ms: u64,
}

/// RAII guard; releases on drop, including error and panic unwinds.
#[derive(Debug)]
pub struct SeedLock {
    path: PathBuf,
}

impl SeedLock {
    /// Block until the lock is acquired or `options.timeout` elapses.
    pub fn acquire(seed_dir: &Path, options: &LockOptions) -> Result<SeedLock, SeedError> {
        fs::create_dir_all(seed_dir)?;
        let path = layout::lock_path(seed_dir);
        let started = Instant::now();

        loop {
            match try_create(&path) {
                Ok(()) => {
                    debug!("acquired seed lock {}", path.display());
                    return Ok(SeedLock { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if try_break_stale(&path, options) {
                        continue;
                    }
                    if started.elapsed() >= options.timeout {
                        return Err(SeedError::LockTimeout { path });
                    }
                    std::thread::sleep(options.poll_interval);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for SeedLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to release seed lock {}: {e}", self.path.display());
            }
        }
    }
}

fn try_create(path: &Path) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let info = LockInfo {
        pid: std::process::id(),
        acquired_at_epoch_ms: epoch_ms(),
    };
    let body = serde_json::to_vec(&info).unwrap_or_default();
    file.write_all(&body)?;
    file.sync_all()?;
    Ok(())
}

/// Force-release a stale lock. Requires both age past the threshold and the
/// recorded process to be confirmed gone; an unreadable lock file is broken
/// on age alone.
fn try_break_stale(path: &Path, options: &LockOptions) -> bool {
    let info: Option<LockInfo> = fs::read(path)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok());

    let stale = match info {
        Some(info) => {
            let age_ms = epoch_ms().saturating_sub(info.acquired_at_epoch_ms);
            Duration::from_millis(age_ms) >= options.stale_after && process_gone(info.pid)
        }
        None => file_age(path)
            .map(|age| age >= options.stale_after)
            .unwrap_or(false),
    };

    if stale {
        warn!("breaking stale seed lock {}", path.display());
        fs::remove_file(path).is_ok()
    } else {
        false
    }
}

/// Confirmed-dead check. Only answers true when /proc is available and the
/// pid is absent; without /proc the holder is assumed alive and the caller
/// times out instead.
fn process_gone(pid: u32) -> bool {
    let proc_root = Path::new("/proc");
    if !proc_root.is_dir() {
        return false;
    }
    !proc_root.join(pid.to_string()).exists()
}

fn file_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    SystemTime::now().duration_since(modified).ok()
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_options() -> LockOptions {
        LockOptions {
            timeout: Duration::from_millis(200),
            stale_after: Duration::from_secs(30),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock_file = layout::lock_path(dir.path());
        {
            let _lock = SeedLock::acquire(dir.path(), &quick_options()).unwrap();
            assert!(lock_file.exists());
        }
        assert!(!lock_file.exists());
    }

    #[test]
    fn contended_lock_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let _held = SeedLock::acquire(dir.path(), &quick_options()).unwrap();
        let err = SeedLock::acquire(dir.path(), &quick_options()).unwrap_err();
        assert!(matches!(err, SeedError::LockTimeout { .. }));
    }

    #[test]
    fn stale_lock_with_dead_holder_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = layout::lock_path(dir.path());
        // A pid that cannot exist and a timestamp far in the past.
        let info = LockInfo {
            pid: u32::MAX - 1,
            acquired_at_epoch_ms: 0,
        };
        fs::write(&path, serde_json::to_vec(&info).unwrap()).unwrap();

        if Path::new("/proc").is_dir() {
            let _lock = SeedLock::acquire(dir.path(), &quick_options()).unwrap();
        } else {
            // Without /proc the holder cannot be confirmed gone.
            assert!(SeedLock::acquire(dir.path(), &quick_options()).is_err());
        }
    }

    #[test]
    fn fresh_lock_of_live_process_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let path = layout::lock_path(dir.path());
        let info = LockInfo {
            pid: std::process::id(),
            acquired_at_epoch_ms: epoch_ms(),
        };
        fs::write(&path, serde_json::to_vec(&info).unwrap()).unwrap();
        let err = SeedLock::acquire(dir.path(), &quick_options()).unwrap_err();
        assert!(matches!(err, SeedError::LockTimeout { .. }));
    }
}
