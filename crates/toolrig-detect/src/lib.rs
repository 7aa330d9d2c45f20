//! System detection (L2): builds and caches `SystemProfile` snapshots.
//!
//! Split into a fast tier (file reads, PATH lookups, no subprocess) and a
//! deep tier (subprocess probes and network checks, each under its own
//! timeout). `DetectionCache` wraps both behind a single entrypoint with
//! the 5-minute TTL the profile itself defines.

pub mod deep;
pub mod fast;
pub mod tools;

use std::path::Path;
use std::sync::Mutex;
use sysinfo::{Disks, System};
use tokio::sync::Mutex as AsyncMutex;
use toolrig_core::{HardwareInfo, ShellInfo, SystemProfile};

const OS_RELEASE_PATH: &str = "/etc/os-release";
const PROC_VERSION_PATH: &str = "/proc/version";

/// Binaries whose presence drives deep-tier tool checks; callers extend
/// this with recipe-specific binaries via [`DetectionCache::refresh_tools`].
const DEFAULT_PROBE_BINARIES: &[&str] = &["git", "curl", "python3"];

/// Caches a [`SystemProfile`] snapshot behind the TTL it defines,
/// re-detecting on expiry or on explicit invalidation (e.g. after a
/// mutating step or on plan resume).
pub struct DetectionCache {
    inner: AsyncMutex<Option<SystemProfile>>,
}

impl Default for DetectionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionCache {
    pub fn new() -> Self {
        Self {
            inner: AsyncMutex::new(None),
        }
    }

    /// Returns a cached profile if fresh, otherwise runs full detection
    /// (fast + deep tiers) and caches the result.
    pub async fn get(&self, http: &reqwest::Client, probe_hosts: &[String]) -> SystemProfile {
        let mut guard = self.inner.lock().await;
        let now = chrono::Utc::now();
        if let Some(profile) = guard.as_ref() {
            if !profile.is_stale(now) {
                return profile.clone();
            }
        }
        let fresh = detect_system(http, probe_hosts, DEFAULT_PROBE_BINARIES).await;
        *guard = Some(fresh.clone());
        fresh
    }

    /// Forces re-detection on the next `get`, e.g. after a mutating step
    /// completes or when a plan is resumed after a process restart.
    pub async fn invalidate(&self) {
        *self.inner.lock().await = None;
    }
}

/// Run the fast tier synchronously, then the deep tier, producing a full
/// [`SystemProfile`]. Callers on a tight latency budget (e.g. the initial
/// `toolrig detect` printout) may call [`detect_fast`] alone and defer the
/// deep tier until a recipe actually needs it.
pub async fn detect_system(
    http: &reqwest::Client,
    probe_hosts: &[String],
    probe_binaries: &[&str],
) -> SystemProfile {
    let mut profile = detect_fast();

    deep::detect_systemd_state(&mut profile.capabilities).await;
    deep::detect_passwordless_sudo(&mut profile.capabilities).await;
    profile.package_manager.snap_available = deep::detect_snap_available(&profile.capabilities);
    profile.libraries = deep::detect_libraries().await;

    let shell_path = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let shell_name = Path::new(&shell_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("sh")
        .to_string();
    let (login, nonlogin, healthy) = deep::detect_shell_path_health(&shell_path).await;
    profile.shell = ShellInfo {
        kind: Some(shell_name),
        rc_file: None,
        login_profile: None,
        path_healthy: healthy,
        path_login: login,
        path_nonlogin: nonlogin,
        restricted: false,
    };

    profile.gpu = deep::detect_gpu().await;
    profile.network = deep::probe_endpoints(http, probe_hosts).await;

    let is_wsl = profile.os.wsl;
    let binaries: Vec<String> = probe_binaries.iter().map(|b| b.to_string()).collect();
    profile.tools = tools::detect_tools(&binaries, is_wsl).await;
    profile.detected_at = chrono::Utc::now();
    profile
}

/// The < 200 ms fast tier alone: OS/distro/container/capability/package-
/// manager detection and hardware inventory via `sysinfo`.
pub fn detect_fast() -> SystemProfile {
    let proc_version = std::fs::read_to_string(PROC_VERSION_PATH).ok();
    let os = fast::detect_os(Path::new(OS_RELEASE_PATH), proc_version.as_deref());
    let distro = fast::read_distro_info(Path::new(OS_RELEASE_PATH));
    let capabilities = fast::detect_capabilities_fast();
    let package_manager = fast::detect_package_managers(&distro);
    let hardware = detect_hardware();

    SystemProfile {
        os,
        distro,
        capabilities,
        package_manager,
        hardware,
        detected_at: chrono::Utc::now(),
        ..Default::default()
    }
}

fn detect_hardware() -> HardwareInfo {
    static SYSTEM: Mutex<Option<System>> = Mutex::new(None);
    let mut guard = SYSTEM.lock().expect("hardware probe mutex poisoned");
    let system = guard.get_or_insert_with(System::new_all);
    system.refresh_cpu_all();
    system.refresh_memory();

    let disks = Disks::new_with_refreshed_list();
    let disk_free_mb = disks
        .iter()
        .map(|d| {
            (
                d.mount_point().display().to_string(),
                d.available_space() / (1024 * 1024),
            )
        })
        .collect();

    HardwareInfo {
        cpu_count: Some(system.cpus().len() as u32),
        ram_total_mb: Some(system.total_memory() / (1024 * 1024)),
        ram_available_mb: Some(system.available_memory() / (1024 * 1024)),
        disk_free_mb,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_profile_has_arch_and_fresh_timestamp() {
        let profile = detect_fast();
        assert!(profile.os.arch.is_some());
        assert!(!profile.is_stale(chrono::Utc::now()));
    }
}
