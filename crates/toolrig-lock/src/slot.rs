//! Per-package-manager mutual exclusion (§5): two steps whose `command[0]`
//! names the same package manager never run concurrently, since `apt`/
//! `dnf`/etc. hold their own index lock and the second invocation would
//! just fail or block anyway.
//!
//! A slot is a `flock(2)` advisory lock on `{state_dir}/pm-locks/{pm}.lock`.
//! Since exactly one mutator per package manager is ever allowed, this is
//! a single-slot special case of the teacher's multi-slot scheme, kept
//! general enough to raise the limit if that invariant ever loosens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct SlotDiagnostic {
    pid: u32,
    pm: String,
    slot_index: u32,
    acquired_at: DateTime<Utc>,
    plan_id: Option<String>,
}

/// Guard holding an acquired package-manager slot. Releases `flock` on drop.
pub struct PmSlot {
    file: File,
    slot_path: PathBuf,
    pm: String,
    slot_index: u32,
    released: bool,
}

impl std::fmt::Debug for PmSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PmSlot").field("pm", &self.pm).field("slot_index", &self.slot_index).finish()
    }
}

impl Drop for PmSlot {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let fd = self.file.as_raw_fd();
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
        self.released = true;
    }
}

impl PmSlot {
    pub fn pm(&self) -> &str {
        &self.pm
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        let fd = self.file.as_raw_fd();
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
        self.released = true;
    }
}

#[derive(Debug, Clone)]
pub struct SlotStatus {
    pub pm: String,
    pub max_slots: u32,
    pub occupied: u32,
}

impl SlotStatus {
    pub fn free(&self) -> u32 {
        self.max_slots.saturating_sub(self.occupied)
    }
}

pub enum SlotAcquireResult {
    Acquired(PmSlot),
    Exhausted(SlotStatus),
}

/// Try to acquire a package-manager mutex slot (non-blocking). `max_slots`
/// is 1 for the ordinary case; callers outside package-manager mutex
/// duty may pass a higher count for other advisory pools.
pub fn try_acquire_slot(
    state_dir: &Path,
    pm: &str,
    max_slots: u32,
    plan_id: Option<&str>,
) -> std::io::Result<SlotAcquireResult> {
    let pm_dir = state_dir.join("pm-locks").join(pm);
    fs::create_dir_all(&pm_dir)?;

    for index in 0..max_slots {
        let slot_path = pm_dir.join(format!("slot-{index:02}.lock"));
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(false).open(&slot_path)?;
        let fd = file.as_raw_fd();
        let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if ret == 0 {
            let mut slot = PmSlot { file, slot_path, pm: pm.to_string(), slot_index: index, released: false };
            let diagnostic = SlotDiagnostic {
                pid: std::process::id(),
                pm: pm.to_string(),
                slot_index: index,
                acquired_at: Utc::now(),
                plan_id: plan_id.map(str::to_string),
            };
            if let Ok(json) = serde_json::to_string(&diagnostic) {
                let _ = slot.file.set_len(0);
                let _ = slot.file.write_all(json.as_bytes());
                let _ = slot.file.flush();
            }
            return Ok(SlotAcquireResult::Acquired(slot));
        }
    }

    Ok(SlotAcquireResult::Exhausted(SlotStatus { pm: pm.to_string(), max_slots, occupied: max_slots }))
}

/// Current slot usage across every named package manager, for the
/// scheduler's ready-set computation.
pub fn slot_usage(state_dir: &Path, pms: &[(&str, u32)]) -> Vec<SlotStatus> {
    pms.iter()
        .map(|(pm, max)| {
            let pm_dir = state_dir.join("pm-locks").join(pm);
            let mut occupied = 0u32;
            for index in 0..*max {
                let slot_path = pm_dir.join(format!("slot-{index:02}.lock"));
                if let Ok(file) = OpenOptions::new().read(true).write(false).open(&slot_path) {
                    let fd = file.as_raw_fd();
                    let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
                    if ret != 0 {
                        occupied += 1;
                    } else {
                        unsafe {
                            libc::flock(fd, libc::LOCK_UN);
                        }
                    }
                }
            }
            SlotStatus { pm: pm.to_string(), max_slots: *max, occupied }
        })
        .collect()
}
