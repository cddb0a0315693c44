/*
    lock.rs - Exclusive lock file for a storage location

    A replica's local directory is shared by every process started for that
    replica (the `watch` loop, one-off `add`/`delete`/`sync` runs). Holding
    the lock file serializes their read-modify-write cycles.

    - Acquired with create_new, so exactly one holder at a time
    - Owner metadata (pid, acquisition time) written into the file
    - A lock older than `stale_after` is taken over (its owner crashed)
    - Released by removing the file when the guard is dropped
*/

use crate::core_store::store::errors::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Lock file name inside a locked directory
pub const LOCK_FILE: &str = ".postsync.lock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMeta {
    pub pid: u32,
    pub acquired_at_ms: u64,
}

impl LockMeta {
    fn current() -> Self {
        LockMeta { pid: std::process::id(), acquired_at_ms: now_ms() }
    }
}

/// How long to wait for a held lock and when to consider it abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub timeout: Duration,
    pub stale_after: Duration,
    pub retry_every: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        LockPolicy {
            timeout: Duration::from_secs(30),
            stale_after: Duration::from_secs(120),
            retry_every: Duration::from_millis(20),
        }
    }
}

/// Guard for a location lock. Dropping it releases the lock.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LocationLock {
    path: Option<PathBuf>,
}

impl LocationLock {
    /// Guard that holds nothing, for locations only reachable from one process
    pub fn unlocked() -> Self {
        LocationLock { path: None }
    }

    /// Take the lock file in `dir`, waiting up to `policy.timeout` for the current holder
    pub fn acquire(dir: &Path, policy: &LockPolicy) -> StoreResult<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE);
        let deadline = Instant::now() + policy.timeout;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let meta = LockMeta::current();
                    let written = serde_json::to_vec(&meta)
                        .map_err(StoreError::from)
                        .and_then(|bytes| file.write_all(&bytes).map_err(StoreError::from));
                    if let Err(e) = written {
                        let _ = fs::remove_file(&path);
                        return Err(e);
                    }
                    debug!(path = %path.display(), pid = meta.pid, "Acquired lock");
                    return Ok(LocationLock { path: Some(path) });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if let Some(age) = lock_age(&path) {
                        if age >= policy.stale_after {
                            warn!(
                                path = %path.display(),
                                age_secs = age.as_secs(),
                                holder = ?read_meta(&path),
                                "Taking over stale lock"
                            );
                            let _ = fs::remove_file(&path);
                            continue;
                        }
                    }
                    if Instant::now() >= deadline {
                        let holder = read_meta(&path)
                            .map(|m| format!("pid {}", m.pid))
                            .unwrap_or_else(|| "unknown owner".to_string());
                        return Err(StoreError::Locked(format!(
                            "{} held by {}",
                            path.display(),
                            holder
                        )));
                    }
                    std::thread::sleep(policy.retry_every);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Drop for LocationLock {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = fs::remove_file(&path);
        }
    }
}

fn read_meta(path: &Path) -> Option<LockMeta> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Age from the owner's metadata, or from the file time while the owner is
/// still writing it. `None` once the file is gone.
fn lock_age(path: &Path) -> Option<Duration> {
    if let Some(meta) = read_meta(path) {
        return Some(Duration::from_millis(now_ms().saturating_sub(meta.acquired_at_ms)));
    }
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(modified.elapsed().unwrap_or_default())
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use tempfile::tempdir;

    fn quick() -> LockPolicy {
        LockPolicy {
            timeout: Duration::from_millis(100),
            stale_after: Duration::from_secs(60),
            retry_every: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_lock_file_removed_on_drop() {
        let dir = tempdir().unwrap();
        let lock = LocationLock::acquire(dir.path(), &quick()).unwrap();
        let path = lock.path().unwrap().to_path_buf();
        let meta = read_meta(&path).unwrap();
        assert_eq!(meta.pid, std::process::id());

        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_second_holder_times_out() {
        let dir = tempdir().unwrap();
        let _held = LocationLock::acquire(dir.path(), &quick()).unwrap();
        let err = LocationLock::acquire(dir.path(), &quick()).unwrap_err();
        assert!(matches!(err, StoreError::Locked(_)));
        assert!(err.to_string().contains(&format!("pid {}", std::process::id())));
    }

    #[test]
    fn test_waiter_gets_lock_after_release() {
        let dir = tempdir().unwrap();
        let held = LocationLock::acquire(dir.path(), &quick()).unwrap();

        let root = dir.path().to_path_buf();
        let (tx, rx) = mpsc::channel();
        let waiter = std::thread::spawn(move || {
            let policy = LockPolicy { timeout: Duration::from_secs(10), ..quick() };
            let lock = LocationLock::acquire(&root, &policy);
            tx.send(()).unwrap();
            lock.map(|_| ())
        });

        // Still blocked while the first guard lives
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(held);
        waiter.join().unwrap().unwrap();
    }

    #[test]
    fn test_stale_lock_taken_over() {
        let dir = tempdir().unwrap();
        let abandoned = LockMeta { pid: 999_999, acquired_at_ms: now_ms() - 10 * 60 * 1000 };
        fs::write(dir.path().join(LOCK_FILE), serde_json::to_vec(&abandoned).unwrap()).unwrap();

        let lock = LocationLock::acquire(dir.path(), &quick()).unwrap();
        assert_eq!(read_meta(lock.path().unwrap()).unwrap().pid, std::process::id());
    }

    #[test]
    fn test_fresh_lock_without_metadata_is_respected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(LOCK_FILE), b"").unwrap();
        assert!(LocationLock::acquire(dir.path(), &quick()).is_err());
    }

    #[test]
    fn test_unlocked_guard_holds_nothing() {
        let lock = LocationLock::unlocked();
        assert!(lock.path().is_none());
    }
}
