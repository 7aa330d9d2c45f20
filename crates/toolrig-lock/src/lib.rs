//! File-based locking using the `flock(2)` syscall directly.
//!
//! Uses raw `libc::flock` instead of RAII lock wrappers to avoid the
//! self-referential struct problem: an RAII guard borrows the lock owner,
//! making it impossible to store both in the same struct without lifetime
//! gymnastics (`Box::leak`, `ouroboros`, etc.).
//!
//! By calling `flock(2)` directly, we only need to own the `File` (which
//! owns the fd). `Drop` calls `flock(fd, LOCK_UN)` to release.

pub mod slot;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("failed to create lock directory {path}: {source}")]
    CreateDir { path: PathBuf, source: std::io::Error },
    #[error("failed to open lock file {path}: {source}")]
    Open { path: PathBuf, source: std::io::Error },
    #[error("plan '{plan_id}' is already locked by pid {pid} ({reason}, acquired {acquired_at})")]
    Held { plan_id: String, pid: u32, reason: String, acquired_at: DateTime<Utc> },
    #[error("plan '{plan_id}' is locked (diagnostic unreadable)")]
    HeldUnknown { plan_id: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct LockDiagnostic {
    pid: u32,
    plan_id: String,
    acquired_at: DateTime<Utc>,
    reason: String,
}

/// Exclusivity guard for one plan, backed by `flock(2)`.
///
/// Holds the open `File` whose fd carries the advisory lock. On `Drop`
/// the lock is released explicitly via `flock(fd, LOCK_UN)` for
/// deterministic release timing, ahead of the fd actually closing.
pub struct PlanLock {
    file: File,
    lock_path: PathBuf,
}

impl std::fmt::Debug for PlanLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanLock").field("lock_path", &self.lock_path).finish()
    }
}

impl Drop for PlanLock {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
    }
}

impl PlanLock {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

/// Acquire a non-blocking exclusive lock for a plan.
///
/// Lock path: `{state_dir}/locks/{plan_id}.lock`. Prevents two orchestrator
/// instances (e.g. a stray `resume` racing a still-running `install`) from
/// driving the same plan concurrently.
pub fn acquire_plan_lock(state_dir: &Path, plan_id: &str, reason: &str) -> Result<PlanLock, LockError> {
    let locks_dir = state_dir.join("locks");
    fs::create_dir_all(&locks_dir)
        .map_err(|source| LockError::CreateDir { path: locks_dir.clone(), source })?;

    let lock_path = locks_dir.join(format!("{plan_id}.lock"));
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|source| LockError::Open { path: lock_path.clone(), source })?;

    let fd = file.as_raw_fd();
    let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };

    if ret == 0 {
        let mut lock = PlanLock { file, lock_path };
        let diagnostic =
            LockDiagnostic { pid: std::process::id(), plan_id: plan_id.to_string(), acquired_at: Utc::now(), reason: reason.to_string() };
        if let Ok(json) = serde_json::to_string(&diagnostic) {
            let _ = lock.file.set_len(0);
            let _ = lock.file.write_all(json.as_bytes());
            let _ = lock.file.flush();
        }
        return Ok(lock);
    }

    let mut contents = String::new();
    if File::open(&lock_path).ok().and_then(|mut f| f.read_to_string(&mut contents).ok()).is_some()
        && let Ok(diagnostic) = serde_json::from_str::<LockDiagnostic>(&contents)
    {
        return Err(LockError::Held {
            plan_id: plan_id.to_string(),
            pid: diagnostic.pid,
            reason: diagnostic.reason,
            acquired_at: diagnostic.acquired_at,
        });
    }
    Err(LockError::HeldUnknown { plan_id: plan_id.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_lock_succeeds() {
        let dir = tempdir().unwrap();
        let lock = acquire_plan_lock(dir.path(), "01ABC", "install").unwrap();
        assert!(lock.lock_path().exists());
    }

    #[test]
    fn second_acquire_is_rejected() {
        let dir = tempdir().unwrap();
        let _held = acquire_plan_lock(dir.path(), "01ABC", "install").unwrap();
        let second = acquire_plan_lock(dir.path(), "01ABC", "resume");
        assert!(matches!(second, Err(LockError::Held { .. })));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempdir().unwrap();
        {
            let _held = acquire_plan_lock(dir.path(), "01ABC", "install").unwrap();
        }
        let reacquired = acquire_plan_lock(dir.path(), "01ABC", "resume");
        assert!(reacquired.is_ok());
    }

    #[test]
    fn different_plans_are_independent() {
        let dir = tempdir().unwrap();
        let _a = acquire_plan_lock(dir.path(), "plan-a", "install").unwrap();
        let b = acquire_plan_lock(dir.path(), "plan-b", "install");
        assert!(b.is_ok());
    }
}
