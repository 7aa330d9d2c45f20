//! Build preflight checks (§4.4): disk space and RAM headroom before a
//! `build` step starts, so a doomed build fails fast instead of thrashing
//! for twenty minutes before running out of either.

use toolrig_core::HardwareInfo;

/// Minimum RAM headroom assumed needed per available CPU for a build to
/// proceed safely; below this, parallelism should be capped further or
/// the build refused outright.
const PER_CPU_RAM_MIN_MB: u64 = 512;

#[derive(Debug, Clone, Default)]
pub struct PreflightReport {
    pub ok: bool,
    pub reasons: Vec<String>,
}

/// Check `hardware` against a build step's declared `disk_estimate_mb`
/// and the per-cpu RAM minimum, resolving disk headroom against the
/// filesystem mounted at (or above) `target_path`.
pub fn check_build_preflight(
    hardware: &HardwareInfo,
    disk_estimate_mb: Option<u64>,
    target_path: &str,
) -> PreflightReport {
    let mut reasons = Vec::new();

    if let Some(estimate) = disk_estimate_mb {
        match free_space_for(hardware, target_path) {
            Some(free) if free < estimate => {
                reasons.push(format!(
                    "needs {estimate} MB free at {target_path} but only {free} MB is available"
                ));
            }
            None => reasons.push(format!("could not determine free disk space at {target_path}")),
            _ => {}
        }
    }

    let cpu_count = hardware.cpu_count.unwrap_or(1).max(1) as u64;
    let ram_min = cpu_count * PER_CPU_RAM_MIN_MB;
    if let Some(ram_available) = hardware.ram_available_mb
        && ram_available < ram_min
    {
        reasons.push(format!("needs at least {ram_min} MB RAM for {cpu_count} cpu(s) but only {ram_available} MB is available"));
    }

    PreflightReport { ok: reasons.is_empty(), reasons }
}

fn free_space_for(hardware: &HardwareInfo, target_path: &str) -> Option<u64> {
    hardware
        .disk_free_mb
        .iter()
        .filter(|(mount, _)| target_path.starts_with(mount.as_str()))
        .max_by_key(|(mount, _)| mount.len())
        .map(|(_, free)| *free)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn hardware(cpu: u32, ram_mb: u64, disks: &[(&str, u64)]) -> HardwareInfo {
        HardwareInfo {
            cpu_count: Some(cpu),
            ram_total_mb: Some(ram_mb * 2),
            ram_available_mb: Some(ram_mb),
            disk_free_mb: disks.iter().map(|(k, v)| (k.to_string(), *v)).collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn passes_when_resources_sufficient() {
        let hw = hardware(4, 4096, &[("/", 20_000)]);
        let report = check_build_preflight(&hw, Some(5000), "/home/user/build");
        assert!(report.ok);
    }

    #[test]
    fn fails_when_disk_too_small() {
        let hw = hardware(4, 4096, &[("/", 1000)]);
        let report = check_build_preflight(&hw, Some(5000), "/home/user/build");
        assert!(!report.ok);
        assert!(report.reasons[0].contains("free disk"));
    }

    #[test]
    fn fails_when_ram_below_per_cpu_minimum() {
        let hw = hardware(8, 1024, &[("/", 50_000)]);
        let report = check_build_preflight(&hw, None, "/home/user/build");
        assert!(!report.ok);
    }

    #[test]
    fn resolves_longest_matching_mount_point() {
        let hw = hardware(2, 4096, &[("/", 1_000), ("/home", 50_000)]);
        let report = check_build_preflight(&hw, Some(5000), "/home/user/build");
        assert!(report.ok);
    }
}
