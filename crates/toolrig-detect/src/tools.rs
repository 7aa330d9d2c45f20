//! Tool-installed detection: `which`, then `tool --version` parsing, with
//! a WSL-specific guard against stale `.exe` stubs on PATH, plus
//! per-package-manager presence backends.

use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use toolrig_core::{PackageManagerKind, ToolStatus};

static VERSION_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d+(?:\.\d+)?)").expect("valid regex"));

fn is_elf(path: &Path) -> bool {
    let Ok(bytes) = std::fs::read(path) else {
        return false;
    };
    bytes.len() >= 4 && bytes[0..4] == [0x7f, b'E', b'L', b'F']
}

/// Detect whether `binary` is installed and, if so, its version and path.
///
/// On WSL, a `.exe` stub inherited from the Windows PATH can shadow a
/// genuine Linux install; such stubs are rejected in favor of reporting
/// not-installed so the resolver doesn't mistake a Windows binary for a
/// Linux one.
pub async fn detect_tool(binary: &str, is_wsl: bool) -> ToolStatus {
    let Ok(path) = which::which(binary) else {
        return ToolStatus::default();
    };

    if is_wsl {
        let is_windows_stub = path.extension().and_then(|e| e.to_str()) == Some("exe");
        if is_windows_stub && !is_elf(&path) {
            return ToolStatus::default();
        }
    }

    let version = probe_version(binary).await;
    ToolStatus {
        installed: true,
        version,
        path: Some(path.display().to_string()),
    }
}

async fn probe_version(binary: &str) -> Option<String> {
    let mut cmd = Command::new(binary);
    cmd.arg("--version");
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    let output = timeout(Duration::from_secs(5), cmd.output()).await.ok()??;
    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    VERSION_NUMBER
        .captures(&combined)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Check whether `package` is installed via the host's primary package
/// manager, using each family's native query command.
pub async fn package_installed(pm: PackageManagerKind, package: &str) -> bool {
    let (program, args): (&str, Vec<&str>) = match pm {
        PackageManagerKind::Apt => ("dpkg", vec!["-s", package]),
        PackageManagerKind::Dnf | PackageManagerKind::Yum => ("rpm", vec!["-q", package]),
        PackageManagerKind::Apk => ("apk", vec!["info", "-e", package]),
        PackageManagerKind::Pacman => ("pacman", vec!["-Q", package]),
        PackageManagerKind::Brew => return brew_listing().await.contains(&package.to_string()),
        PackageManagerKind::Zypper | PackageManagerKind::None => return false,
    };
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdout(std::process::Stdio::null());
    cmd.stderr(std::process::Stdio::null());
    matches!(
        timeout(Duration::from_secs(5), cmd.status()).await,
        Ok(Ok(status)) if status.success()
    )
}

/// `brew ls --versions` lists every installed formula in one call; used
/// as a batch lookup instead of one subprocess per package.
async fn brew_listing() -> Vec<String> {
    let mut cmd = Command::new("brew");
    cmd.args(["ls", "--versions"]);
    cmd.stdout(std::process::Stdio::piped());
    let Ok(Ok(output)) = timeout(Duration::from_secs(10), cmd.output()).await else {
        return Vec::new();
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.split_whitespace().next().map(str::to_string))
        .collect()
}

pub async fn detect_tools(binaries: &[String], is_wsl: bool) -> HashMap<String, ToolStatus> {
    let mut result = HashMap::new();
    for binary in binaries {
        result.insert(binary.clone(), detect_tool(binary, is_wsl).await);
    }
    result
}
