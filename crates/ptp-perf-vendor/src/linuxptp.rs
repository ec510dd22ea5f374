//! LinuxPTP: `ptp4l`, optionally together with `phc2sys`.

use ptp_perf_common::{ClientType, EndpointId, Result};
use ptp_perf_invoke::Invocation;
use ptp_perf_store::{LogRecord, Sample};

use crate::parse::{extract_with_pattern, nanos};
use crate::vendor::{VendorContext, VendorProcess};

pub(crate) const LOG_SOURCE: &str = "ptp4l";

const MEASUREMENT_PATTERN: &str =
    r"master offset\s+(?P<offset>[+-]?\d+)\s+s\d+\s+freq\s+[+-]?\d+\s+path delay\s+(?P<pd>[+-]?\d+)";

pub(crate) fn processes(context: &VendorContext<'_>) -> Result<Vec<VendorProcess>> {
    let client_type = context.client_type()?;
    let machine = context.machine;
    let config_file = context.paths.vendor_config_file();

    let ptp4l = Invocation::of_command(["ptp4l", "-i", machine.ptp_interface.as_str(), "-m", "-f"])
        .append_arg(config_file.to_string_lossy())
        .append_arg_if("-s", client_type == ClientType::Slave)
        .append_arg_if("-S", machine.ptp_software_timestamping)
        .as_privileged();
    let mut processes = vec![VendorProcess::restartable(context.supervise(ptp4l))];

    if machine.ptp_use_phc2sys {
        // A second -r also lets the system clock discipline the PHC.
        let phc2sys = Invocation::of_command(["phc2sys", "-m", "-a", "-r"])
            .append_arg_if("-r", client_type.is_master())
            .as_privileged();
        processes.push(VendorProcess::restartable(context.supervise(phc2sys)));
    }
    Ok(processes)
}

pub(crate) fn extract_samples(endpoint_id: EndpointId, records: &[LogRecord]) -> Result<Vec<Sample>> {
    extract_with_pattern(endpoint_id, records, MEASUREMENT_PATTERN, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::record;
    use ptp_perf_common::SampleType;

    #[test]
    fn test_extracts_master_offset_lines() {
        let records = vec![
            record(1, "ptp4l", "| ptp4l[1234.567]: port 1: UNCALIBRATED to SLAVE on MASTER_CLOCK_SELECTED"),
            record(2, "ptp4l", "| ptp4l[1235.567]: master offset        -12 s2 freq   +3077 path delay      5012"),
            record(3, "ptp4l", "| ptp4l[1236.567]: master offset         40 s2 freq   +3090 path delay      4998"),
        ];

        let samples = extract_samples(3, &records).unwrap();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0].sample_type, SampleType::ClockDiff);
        assert_eq!(samples[0].value, -12);
        assert_eq!(samples[1].sample_type, SampleType::PathDelay);
        assert_eq!(samples[1].value, 5012);
        assert_eq!(samples[2].value, 40);
        assert_eq!(samples[2].timestamp, records[2].timestamp);
    }
}
