//! Resident memory probe used for stage telemetry.
//!
//! On Linux the kernel tracks a resident-set high-water mark (`VmHWM`) per
//! process. The executor clears it before a stage starts and samples it once
//! the stage has finished. The figure is the whole process's peak during the
//! attempt, baseline included. Elsewhere no figure is reported.

#[cfg(target_os = "linux")]
use irisatlas_spec::telemetry::bytes_to_mib;

/// Clears the resident high-water mark so the next sample covers only the
/// work that follows. Best effort.
#[cfg(target_os = "linux")]
pub fn reset_peak() {
    // "5" resets the peak RSS counter (see proc(5), clear_refs).
    if let Err(err) = std::fs::write("/proc/self/clear_refs", "5") {
        tracing::debug!(error = %err, "unable to reset peak RSS");
    }
}

#[cfg(not(target_os = "linux"))]
pub fn reset_peak() {}

/// Peak resident memory in MiB, if the platform exposes it.
#[cfg(target_os = "linux")]
pub fn peak_rss_mb() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_hwm(&status).map(|kib| bytes_to_mib(kib * 1024))
}

#[cfg(not(target_os = "linux"))]
pub fn peak_rss_mb() -> Option<f64> {
    None
}

/// Extracts the `VmHWM` value (KiB) from `/proc/<pid>/status` text.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_vm_hwm(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmHWM:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kib| kib.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vm_hwm() {
        let status = "Name:\tcargo\nVmPeak:\t  10000 kB\nVmHWM:\t    2048 kB\nVmRSS:\t 1024 kB\n";
        assert_eq!(parse_vm_hwm(status), Some(2048));
        assert_eq!(parse_vm_hwm("Name:\tx\n"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_peak_covers_process_baseline() {
        reset_peak();
        let peak = peak_rss_mb().unwrap();
        let status = std::fs::read_to_string("/proc/self/status").unwrap();
        let rss_kib: u64 = status
            .lines()
            .find_map(|line| line.strip_prefix("VmRSS:"))
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|kib| kib.parse().ok())
            .unwrap();
        // Sampled after the reset, so the mark is at least what is resident
        // now, minus the slack of pages released in between.
        assert!(peak > 0.0);
        assert!(peak * 1024.0 >= rss_kib as f64 * 0.5, "peak {peak} MiB, rss {rss_kib} KiB");
    }
}
