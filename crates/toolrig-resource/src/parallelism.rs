//! Build-parallelism cap (§4.4, §5): `min(nproc, max(1, ram_available_gb/0.5))`.

use toolrig_core::HardwareInfo;

const RAM_PER_JOB_GB: f64 = 0.5;

/// Maximum number of concurrent build jobs this host can sustain without
/// risking an OOM kill, given its detected CPU count and available RAM.
pub fn build_parallelism_cap(hardware: &HardwareInfo) -> u32 {
    let cpu_count = hardware.cpu_count.unwrap_or(1).max(1);
    let ram_available_gb = hardware.ram_available_mb.unwrap_or(0) as f64 / 1024.0;
    let ram_jobs = (ram_available_gb / RAM_PER_JOB_GB).floor().max(1.0) as u32;
    cpu_count.min(ram_jobs)
}

/// Whether `ccache` is on `PATH`, so a build step can prefix its compiler
/// invocation with it.
pub fn ccache_available() -> bool {
    which::which("ccache").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_by_ram_when_ram_scarce() {
        let hw = HardwareInfo {
            cpu_count: Some(16),
            ram_total_mb: Some(4096),
            ram_available_mb: Some(1024),
            disk_free_mb: Default::default(),
        };
        assert_eq!(build_parallelism_cap(&hw), 2);
    }

    #[test]
    fn caps_by_cpu_when_ram_plentiful() {
        let hw = HardwareInfo {
            cpu_count: Some(4),
            ram_total_mb: Some(65536),
            ram_available_mb: Some(32768),
            disk_free_mb: Default::default(),
        };
        assert_eq!(build_parallelism_cap(&hw), 4);
    }

    #[test]
    fn never_returns_zero() {
        let hw = HardwareInfo {
            cpu_count: Some(8),
            ram_total_mb: Some(256),
            ram_available_mb: Some(100),
            disk_free_mb: Default::default(),
        };
        assert_eq!(build_parallelism_cap(&hw), 1);
    }
}
