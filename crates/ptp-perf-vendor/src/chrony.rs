//! Chrony: `chronyd` in the foreground, measurements read by following its
//! measurements log.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use ptp_perf_common::{EndpointId, Result};
use ptp_perf_config::paths::CHRONY_MEASUREMENTS_LOG;
use ptp_perf_invoke::Invocation;
use ptp_perf_store::{LogRecord, Sample};

use crate::parse::{extract_with_pattern, seconds};
use crate::vendor::{VendorContext, VendorProcess};

pub(crate) const CHRONYD: &str = "/usr/sbin/chronyd";

/// The follower is wrapped in `stdbuf`, its output is logged under that name.
pub(crate) const LOG_SOURCE: &str = "stdbuf";

const FOLLOW_DELAY: Duration = Duration::from_secs(1);

const SCI: &str = r"[+-]?\d+\.\d+e[+-]\d+";

fn measurement_pattern() -> String {
    format!(
        r"\d+-\d+-\d+ \d+:\d+:\d+ \d+\.\d+\.\d+\.\d+ .* (?P<offset>{sci})\s*(?P<pd>{sci})\s*{sci}\s+{sci}\s+{sci}\s+",
        sci = SCI
    )
}

/// Starts every run with an empty, world-writable measurements log.
fn recreate_measurements_log(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, "")?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666))?;
    Ok(())
}

pub(crate) fn processes(context: &VendorContext<'_>) -> Result<Vec<VendorProcess>> {
    let measurements = Path::new(CHRONY_MEASUREMENTS_LOG);
    recreate_measurements_log(measurements)?;

    let chronyd = Invocation::of_command([CHRONYD, "-d", "-f"])
        .append_arg(context.paths.vendor_config_file().to_string_lossy())
        .as_privileged();
    let follower = Invocation::of_command(["stdbuf", "-eL", "-oL", "tail", "-f", "--bytes=+0"])
        .append_arg(measurements.to_string_lossy())
        .accept_return_code(-15);

    Ok(vec![
        VendorProcess::restartable(context.supervise(chronyd)),
        VendorProcess::auxiliary(follower, FOLLOW_DELAY),
    ])
}

pub(crate) fn extract_samples(endpoint_id: EndpointId, records: &[LogRecord]) -> Result<Vec<Sample>> {
    extract_with_pattern(endpoint_id, records, &measurement_pattern(), seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::record;

    #[test]
    fn test_extracts_measurements() {
        let records = vec![
            record(
                1,
                "stdbuf",
                "| ========================================================================================================",
            ),
            record(
                2,
                "stdbuf",
                "| 2024-03-05 14:00:01 192.168.1.10    N  1 111 111 1111   4  4 1.00 -1.234e-06  5.678e-05  1.000e-07  0.000e+00  1.221e-04 PPS0 4B K K",
            ),
        ];
        let samples = extract_samples(2, &records).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value, -1234);
        assert_eq!(samples[1].value, 56_780);
    }

    #[test]
    fn test_recreates_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chrony/measurements.log");
        recreate_measurements_log(&path).unwrap();
        std::fs::write(&path, "old").unwrap();
        recreate_measurements_log(&path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o666);
    }
}
