//! Fast detection tier (< 200 ms): `/etc/os-release`, `/proc/version`,
//! `/proc/1/cgroup`, environment variables, and `which` for known
//! package-manager binaries. No probe in this tier spawns a subprocess
//! with a meaningful timeout -- everything here is a file read or a PATH
//! lookup.

use std::collections::HashMap;
use std::path::Path;
use toolrig_core::{
    Arch, Capabilities, ContainerInfo, ContainerRuntime, DistroFamily, DistroInfo, OsInfo,
    PackageManagerInfo, PackageManagerKind,
};

fn parse_os_release(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let (key, value) = line.split_once('=')?;
            let value = value.trim_matches('"').to_string();
            Some((key.to_string(), value))
        })
        .collect()
}

fn family_from_id(id: &str, id_like: &str) -> DistroFamily {
    let debian = ["debian", "ubuntu", "raspbian", "linuxmint", "pop"];
    let rhel = ["rhel", "centos", "fedora", "rocky", "almalinux", "amzn"];
    let alpine = ["alpine"];
    let arch = ["arch", "manjaro", "endeavouros"];
    let suse = ["opensuse", "sles", "suse"];

    let matches = |list: &[&str]| list.contains(&id) || list.iter().any(|d| id_like.contains(d));

    if matches(&debian) {
        DistroFamily::Debian
    } else if matches(&rhel) {
        DistroFamily::Rhel
    } else if matches(&alpine) {
        DistroFamily::Alpine
    } else if matches(&arch) {
        DistroFamily::Arch
    } else if matches(&suse) {
        DistroFamily::Suse
    } else {
        DistroFamily::Unknown
    }
}

fn version_tuple(version: &str) -> Vec<u32> {
    version
        .split(['.', '-'])
        .map_while(|part| part.parse::<u32>().ok())
        .collect()
}

pub fn detect_distro_from_os_release(contents: &str) -> DistroInfo {
    let fields = parse_os_release(contents);
    let id = fields.get("ID").cloned().unwrap_or_default();
    let id_like = fields.get("ID_LIKE").cloned().unwrap_or_default();
    let version = fields.get("VERSION_ID").cloned();
    DistroInfo {
        id: Some(id.clone()),
        name: fields.get("NAME").cloned(),
        version: version.clone(),
        version_tuple: version.as_deref().map(version_tuple).unwrap_or_default(),
        family: Some(family_from_id(&id, &id_like)),
        codename: fields.get("VERSION_CODENAME").cloned(),
    }
}

pub fn read_distro_info(os_release_path: &Path) -> DistroInfo {
    match std::fs::read_to_string(os_release_path) {
        Ok(contents) => detect_distro_from_os_release(&contents),
        Err(_) if std::env::consts::OS == "macos" => DistroInfo {
            id: Some("macos".to_string()),
            name: Some("macOS".to_string()),
            version: None,
            version_tuple: vec![],
            family: Some(DistroFamily::Macos),
            codename: None,
        },
        Err(_) => DistroInfo::default(),
    }
}

pub fn detect_os(os_release_path: &Path, proc_version: Option<&str>) -> OsInfo {
    let machine = std::env::consts::ARCH.to_string();
    let arch = Arch::from_machine(normalize_arch_probe(&machine));
    let wsl = proc_version
        .map(|v| v.to_lowercase().contains("microsoft"))
        .unwrap_or(false);
    let wsl_version = proc_version.and_then(|v| {
        let lower = v.to_lowercase();
        if lower.contains("wsl2") {
            Some(2)
        } else if wsl {
            Some(1)
        } else {
            None
        }
    });
    OsInfo {
        system: Some(std::env::consts::OS.to_string()),
        release: None,
        machine: Some(machine),
        arch: Some(arch),
        wsl,
        wsl_version,
        container: detect_container(os_release_path.parent()),
    }
}

/// `std::env::consts::ARCH` already reports the Rust spelling
/// (`x86_64`, `aarch64`); reuse the same normalization table as a real
/// `uname -m` would need.
fn normalize_arch_probe(machine: &str) -> &str {
    machine
}

fn detect_container(etc_dir: Option<&Path>) -> ContainerInfo {
    let cgroup_path = Path::new("/proc/1/cgroup");
    let cgroup_contents = std::fs::read_to_string(cgroup_path).unwrap_or_default();
    let runtime = if cgroup_contents.contains("docker") {
        Some(ContainerRuntime::Docker)
    } else if cgroup_contents.contains("containerd") {
        Some(ContainerRuntime::Containerd)
    } else if cgroup_contents.contains("libpod") || cgroup_contents.contains("podman") {
        Some(ContainerRuntime::Podman)
    } else {
        None
    };
    let dockerenv_marker = etc_dir
        .map(|p| p.join("../.dockerenv"))
        .map(|p| p.exists())
        .unwrap_or_else(|| Path::new("/.dockerenv").exists());
    let in_container = runtime.is_some() || dockerenv_marker;
    let in_k8s = std::env::var("KUBERNETES_SERVICE_HOST").is_ok();
    ContainerInfo {
        in_container,
        runtime,
        in_k8s,
    }
}

/// Quick capability read that doesn't require spawning anything: root via
/// `geteuid`, has_sudo via a PATH lookup for the `sudo` binary.
pub fn detect_capabilities_fast() -> Capabilities {
    let is_root = effective_uid() == 0;
    let has_sudo = which::which("sudo").is_ok();
    Capabilities {
        has_systemd: false,
        systemd_state: None,
        has_sudo,
        passwordless_sudo: false,
        is_root,
    }
}

fn effective_uid() -> u32 {
    #[cfg(unix)]
    {
        // SAFETY: geteuid has no preconditions.
        unsafe { libc::geteuid() }
    }
    #[cfg(not(unix))]
    {
        0
    }
}

const PACKAGE_MANAGER_BINARIES: &[(&str, PackageManagerKind)] = &[
    ("apt-get", PackageManagerKind::Apt),
    ("dnf", PackageManagerKind::Dnf),
    ("yum", PackageManagerKind::Yum),
    ("apk", PackageManagerKind::Apk),
    ("pacman", PackageManagerKind::Pacman),
    ("zypper", PackageManagerKind::Zypper),
    ("brew", PackageManagerKind::Brew),
];

pub fn detect_package_managers(distro: &DistroInfo) -> PackageManagerInfo {
    let available: Vec<PackageManagerKind> = PACKAGE_MANAGER_BINARIES
        .iter()
        .filter(|(bin, _)| which::which(bin).is_ok())
        .map(|(_, kind)| *kind)
        .collect();

    let primary = distro.family.and_then(|family| {
        let preferred = match family {
            DistroFamily::Debian => PackageManagerKind::Apt,
            DistroFamily::Rhel => PackageManagerKind::Dnf,
            DistroFamily::Alpine => PackageManagerKind::Apk,
            DistroFamily::Arch => PackageManagerKind::Pacman,
            DistroFamily::Suse => PackageManagerKind::Zypper,
            DistroFamily::Macos => PackageManagerKind::Brew,
            DistroFamily::Unknown => return None,
        };
        available.contains(&preferred).then_some(preferred)
    });

    PackageManagerInfo {
        primary,
        available,
        // Filled in by the deep tier once systemd state is known.
        snap_available: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_debian_os_release() {
        let contents = "NAME=\"Ubuntu\"\nID=ubuntu\nID_LIKE=debian\nVERSION_ID=\"22.04\"\nVERSION_CODENAME=jammy\n";
        let distro = detect_distro_from_os_release(contents);
        assert_eq!(distro.family, Some(DistroFamily::Debian));
        assert_eq!(distro.codename.as_deref(), Some("jammy"));
        assert_eq!(distro.version_tuple, vec![22, 4]);
    }

    #[test]
    fn falls_back_to_id_like_for_unlisted_id() {
        let contents = "NAME=\"PopOS\"\nID=pop\nID_LIKE=\"ubuntu debian\"\nVERSION_ID=\"22.04\"\n";
        let distro = detect_distro_from_os_release(contents);
        assert_eq!(distro.family, Some(DistroFamily::Debian));
    }

    #[test]
    fn unknown_family_when_nothing_matches() {
        let contents = "NAME=\"Solaris\"\nID=solaris\n";
        let distro = detect_distro_from_os_release(contents);
        assert_eq!(distro.family, Some(DistroFamily::Unknown));
    }

    #[test]
    fn wsl2_detected_from_proc_version_string() {
        let os = detect_os(
            Path::new("/etc/os-release"),
            Some("Linux version 5.15.0 (microsoft-standard-WSL2)"),
        );
        assert!(os.wsl);
        assert_eq!(os.wsl_version, Some(2));
    }

    #[test]
    fn non_wsl_proc_version_is_not_flagged() {
        let os = detect_os(Path::new("/etc/os-release"), Some("Linux version 6.1.0"));
        assert!(!os.wsl);
        assert_eq!(os.wsl_version, None);
    }
}
