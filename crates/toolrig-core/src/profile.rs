//! System profile: a point-in-time snapshot of the host machine.
//!
//! Every field is optional except where detection can always answer
//! cheaply (e.g. `arch`). Detection never fails fatally -- a probe that
//! times out or errors leaves its field `None` rather than aborting the
//! whole snapshot.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// CPU/OS architecture, normalized across `uname -m` spellings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Amd64,
    Arm64,
    Armv7,
    Unknown,
}

impl Arch {
    /// Normalize a raw `uname -m` / `platform.machine()` string.
    pub fn from_machine(machine: &str) -> Self {
        match machine {
            "x86_64" => Self::Amd64,
            "aarch64" | "arm64" => Self::Arm64,
            "armv7l" => Self::Armv7,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
            Self::Armv7 => "armv7",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerRuntime {
    Docker,
    Containerd,
    Podman,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContainerInfo {
    #[serde(default)]
    pub in_container: bool,
    #[serde(default)]
    pub runtime: Option<ContainerRuntime>,
    #[serde(default)]
    pub in_k8s: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OsInfo {
    pub system: Option<String>,
    pub release: Option<String>,
    pub machine: Option<String>,
    pub arch: Option<Arch>,
    #[serde(default)]
    pub wsl: bool,
    pub wsl_version: Option<u8>,
    #[serde(default)]
    pub container: ContainerInfo,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistroFamily {
    Debian,
    Rhel,
    Alpine,
    Arch,
    Suse,
    Macos,
    Unknown,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DistroInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub version_tuple: Vec<u32>,
    pub family: Option<DistroFamily>,
    pub codename: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemdState {
    Running,
    Degraded,
    Offline,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub has_systemd: bool,
    pub systemd_state: Option<SystemdState>,
    #[serde(default)]
    pub has_sudo: bool,
    #[serde(default)]
    pub passwordless_sudo: bool,
    #[serde(default)]
    pub is_root: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PackageManagerKind {
    Apt,
    Dnf,
    Yum,
    Apk,
    Pacman,
    Zypper,
    Brew,
    None,
}

impl PackageManagerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apt => "apt",
            Self::Dnf => "dnf",
            Self::Yum => "yum",
            Self::Apk => "apk",
            Self::Pacman => "pacman",
            Self::Zypper => "zypper",
            Self::Brew => "brew",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for PackageManagerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PackageManagerInfo {
    pub primary: Option<PackageManagerKind>,
    #[serde(default)]
    pub available: Vec<PackageManagerKind>,
    #[serde(default)]
    pub snap_available: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LibcType {
    Glibc,
    Musl,
    System,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LibraryInfo {
    pub openssl_version: Option<String>,
    pub glibc_version: Option<String>,
    pub libc_type: Option<LibcType>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ShellInfo {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub rc_file: Option<String>,
    pub login_profile: Option<String>,
    #[serde(default)]
    pub path_healthy: bool,
    pub path_login: Option<String>,
    pub path_nonlogin: Option<String>,
    #[serde(default)]
    pub restricted: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HardwareInfo {
    pub cpu_count: Option<u32>,
    pub ram_total_mb: Option<u64>,
    pub ram_available_mb: Option<u64>,
    #[serde(default)]
    pub disk_free_mb: HashMap<String, u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NvidiaGpu {
    #[serde(default)]
    pub present: bool,
    pub driver_version: Option<String>,
    pub compute_capability: Option<f32>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AmdGpu {
    #[serde(default)]
    pub present: bool,
    pub rocm_version: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GpuInfo {
    #[serde(default)]
    pub nvidia: NvidiaGpu,
    #[serde(default)]
    pub amd: AmdGpu,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatencyClass {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EndpointStatus {
    pub reachable: bool,
    pub latency_ms: Option<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub online: Option<bool>,
    pub proxy_url: Option<String>,
    pub dns_works: Option<bool>,
    pub latency_class: Option<LatencyClass>,
    #[serde(default)]
    pub endpoints: HashMap<String, EndpointStatus>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolStatus {
    pub installed: bool,
    pub version: Option<String>,
    pub path: Option<String>,
}

/// A full snapshot of the host at a moment in time.
///
/// Created lazily with a fast tier (< 200 ms) and enriched on demand by a
/// deep tier. Cached with a short TTL for "installed" checks, invalidated
/// after any successful mutation, and re-detected on plan resume.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SystemProfile {
    #[serde(default)]
    pub os: OsInfo,
    #[serde(default)]
    pub distro: DistroInfo,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub package_manager: PackageManagerInfo,
    #[serde(default)]
    pub libraries: LibraryInfo,
    #[serde(default)]
    pub shell: ShellInfo,
    #[serde(default)]
    pub hardware: HardwareInfo,
    #[serde(default)]
    pub gpu: GpuInfo,
    #[serde(default)]
    pub network: NetworkInfo,
    #[serde(default)]
    pub tools: HashMap<String, ToolStatus>,
    /// When this snapshot was taken; used for TTL invalidation.
    pub detected_at: chrono::DateTime<chrono::Utc>,
}

impl SystemProfile {
    /// TTL for "installed" checks, per spec: re-detection is cheap enough
    /// that a 5-minute cache is safe against drift within a single run.
    pub const INSTALLED_TTL_SECS: i64 = 300;

    pub fn is_stale(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        (now - self.detected_at).num_seconds() > Self::INSTALLED_TTL_SECS
    }

    pub fn tool_installed(&self, tool_id: &str) -> bool {
        self.tools.get(tool_id).is_some_and(|t| t.installed)
    }

    pub fn binary_on_path(&self, binary: &str) -> bool {
        self.tool_installed(binary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arch_normalizes_known_machines() {
        assert_eq!(Arch::from_machine("x86_64"), Arch::Amd64);
        assert_eq!(Arch::from_machine("aarch64"), Arch::Arm64);
        assert_eq!(Arch::from_machine("armv7l"), Arch::Armv7);
        assert_eq!(Arch::from_machine("riscv64"), Arch::Unknown);
    }

    #[test]
    fn stale_after_ttl() {
        let mut profile = SystemProfile {
            detected_at: chrono::Utc::now() - chrono::Duration::seconds(301),
            ..Default::default()
        };
        assert!(profile.is_stale(chrono::Utc::now()));
        profile.detected_at = chrono::Utc::now();
        assert!(!profile.is_stale(chrono::Utc::now()));
    }
}
