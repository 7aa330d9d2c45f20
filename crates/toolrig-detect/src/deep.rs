//! Deep detection tier: probes that spawn a subprocess or make a network
//! call, each under its own timeout. Any probe that exceeds its timeout
//! is recorded as unknown rather than failing the whole snapshot.

use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use toolrig_core::{
    AmdGpu, Capabilities, EndpointStatus, GpuInfo, LatencyClass, LibcType, LibraryInfo, NetworkInfo,
    NvidiaGpu, SystemdState,
};

const SYSTEMCTL_TIMEOUT: Duration = Duration::from_secs(5);
const SUDO_TIMEOUT: Duration = Duration::from_secs(5);
const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(5);

async fn run_with_timeout(program: &str, args: &[&str], budget: Duration) -> Option<(bool, String)> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    let spawned = cmd.output();
    match timeout(budget, spawned).await {
        Ok(Ok(output)) => {
            let text = String::from_utf8_lossy(&output.stdout).to_string();
            Some((output.status.success(), text))
        }
        Ok(Err(_)) | Err(_) => None,
    }
}

/// `systemctl is-system-running`, 5s timeout. Populates both
/// `has_systemd` and `systemd_state`; absent/timed-out leaves both at
/// their fast-tier defaults.
pub async fn detect_systemd_state(capabilities: &mut Capabilities) {
    let Some((success, stdout)) =
        run_with_timeout("systemctl", &["is-system-running"], SYSTEMCTL_TIMEOUT).await
    else {
        return;
    };
    capabilities.has_systemd = true;
    let state = stdout.trim();
    capabilities.systemd_state = Some(if success || state == "running" {
        SystemdState::Running
    } else if state == "degraded" {
        SystemdState::Degraded
    } else {
        SystemdState::Offline
    });
}

/// `sudo -n true`, 5s timeout. Only meaningful when `has_sudo` and not
/// root already, per the capability rule in §4.1.
pub async fn detect_passwordless_sudo(capabilities: &mut Capabilities) {
    if capabilities.is_root || !capabilities.has_sudo {
        return;
    }
    if let Some((success, _)) = run_with_timeout("sudo", &["-n", "true"], SUDO_TIMEOUT).await {
        capabilities.passwordless_sudo = success;
    }
}

/// `snap_available` iff systemd is running and `snap` is on PATH.
pub fn detect_snap_available(capabilities: &Capabilities) -> bool {
    capabilities.has_systemd
        && capabilities.systemd_state == Some(SystemdState::Running)
        && which::which("snap").is_ok()
}

pub async fn detect_libraries() -> LibraryInfo {
    let openssl_version = run_with_timeout("openssl", &["version"], Duration::from_secs(3))
        .await
        .map(|(_, out)| out.trim().to_string());

    let libc_type = detect_libc_type().await;

    LibraryInfo {
        openssl_version,
        glibc_version: if libc_type == Some(LibcType::Glibc) {
            detect_glibc_version().await
        } else {
            None
        },
        libc_type,
    }
}

async fn detect_libc_type() -> Option<LibcType> {
    if std::env::consts::OS == "macos" {
        return Some(LibcType::System);
    }
    // `ldd --version` reports "musl" or "GNU libc" on the first line.
    let (_, out) = run_with_timeout("ldd", &["--version"], Duration::from_secs(3)).await?;
    if out.to_lowercase().contains("musl") {
        Some(LibcType::Musl)
    } else {
        Some(LibcType::Glibc)
    }
}

async fn detect_glibc_version() -> Option<String> {
    let (_, out) = run_with_timeout("ldd", &["--version"], Duration::from_secs(3)).await?;
    out.lines().next().and_then(|line| {
        line.rsplit(' ').next().map(str::to_string)
    })
}

/// Compare PATH as seen by a login shell vs a non-login shell; a mismatch
/// means tools installed via a profile-only PATH edit won't be visible in
/// non-interactive contexts (cron, systemd units).
pub async fn detect_shell_path_health(shell: &str) -> (Option<String>, Option<String>, bool) {
    let login = run_with_timeout(shell, &["-lc", "echo $PATH"], Duration::from_secs(5))
        .await
        .map(|(_, out)| out.trim().to_string());
    let nonlogin = run_with_timeout(shell, &["-c", "echo $PATH"], Duration::from_secs(5))
        .await
        .map(|(_, out)| out.trim().to_string());
    let healthy = match (&login, &nonlogin) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };
    (login, nonlogin, healthy)
}

pub async fn detect_gpu() -> GpuInfo {
    let nvidia_smi = run_with_timeout(
        "nvidia-smi",
        &["--query-gpu=driver_version,compute_cap", "--format=csv,noheader"],
        Duration::from_secs(5),
    )
    .await;

    let nvidia = match nvidia_smi {
        Some((true, out)) => {
            let line = out.lines().next().unwrap_or_default();
            let mut parts = line.split(',').map(str::trim);
            let driver = parts.next().map(str::to_string);
            let compute = parts.next().and_then(|s| s.parse::<f32>().ok());
            NvidiaGpu {
                present: true,
                driver_version: driver,
                compute_capability: compute,
            }
        }
        _ => NvidiaGpu::default(),
    };

    let rocminfo = run_with_timeout("rocminfo", &[], Duration::from_secs(5)).await;
    let amd = match rocminfo {
        Some((true, out)) if out.to_lowercase().contains("gfx") => AmdGpu {
            present: true,
            rocm_version: None,
        },
        _ => AmdGpu::default(),
    };

    GpuInfo { nvidia, amd }
}

/// HEAD-probe a set of endpoints with a 5s timeout each.
pub async fn probe_endpoints(client: &reqwest::Client, hosts: &[String]) -> NetworkInfo {
    let mut endpoints = std::collections::HashMap::new();
    let mut any_reachable = false;
    let mut total_latency = Duration::ZERO;
    let mut sample_count = 0u32;

    for host in hosts {
        let url = if host.starts_with("http") {
            host.clone()
        } else {
            format!("https://{host}")
        };
        let started = std::time::Instant::now();
        let result = timeout(ENDPOINT_TIMEOUT, client.head(&url).send()).await;
        let status = match result {
            Ok(Ok(resp)) if resp.status().is_success() || resp.status().is_redirection() => {
                any_reachable = true;
                let latency = started.elapsed();
                total_latency += latency;
                sample_count += 1;
                EndpointStatus {
                    reachable: true,
                    latency_ms: Some(latency.as_millis() as u64),
                }
            }
            _ => EndpointStatus {
                reachable: false,
                latency_ms: None,
            },
        };
        endpoints.insert(host.clone(), status);
    }

    let latency_class = if sample_count == 0 {
        None
    } else {
        let avg_ms = total_latency.as_millis() as u64 / sample_count as u64;
        Some(if avg_ms < 150 {
            LatencyClass::Low
        } else if avg_ms < 600 {
            LatencyClass::Medium
        } else {
            LatencyClass::High
        })
    };

    NetworkInfo {
        online: Some(any_reachable),
        proxy_url: std::env::var("HTTPS_PROXY")
            .or_else(|_| std::env::var("https_proxy"))
            .ok(),
        dns_works: Some(any_reachable),
        latency_class,
        endpoints,
    }
}
