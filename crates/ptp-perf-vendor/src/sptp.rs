//! SPTP: `ptp4u` on the master, `sptp` on the slaves.

use std::path::PathBuf;

use ptp_perf_common::{ClientType, EndpointId, Error, Result};
use ptp_perf_invoke::Invocation;
use ptp_perf_store::{LogRecord, Sample};

use crate::parse::{extract_with_pattern, nanos};
use crate::vendor::VendorContext;

pub(crate) const LOG_SOURCE: &str = "sptp";

const MEASUREMENT_PATTERN: &str = r#"msg="offset\s*(?P<offset>[0-9.+-]+)\s* s\d+ freq \s*[0-9.+-]+\s* path delay\s* (?P<pd>[0-9.+-]+) \(\s*[0-9.+-]+:\s*[0-9.+-]+\)""#;

/// Go installs its binaries below the home directory.
fn go_bin_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join("go").join("bin"))
}

pub(crate) fn installed() -> bool {
    ptp_perf_process::executable_in_path("sptp")
        || go_bin_dir().is_some_and(|dir| dir.join("sptp").is_file())
}

pub(crate) fn daemon(context: &VendorContext<'_>) -> Result<Invocation> {
    let machine = context.machine;
    let invocation = match context.client_type()? {
        ClientType::Master => Invocation::of_command(["ptp4u", "-iface", machine.ptp_interface.as_str()])
            .append_args(if machine.ptp_software_timestamping {
                vec!["--timestamptype", "software"]
            } else {
                vec![]
            }),
        ClientType::Slave => {
            let master = context.cluster.ptp_master()?;
            Invocation::of_command(["sptp", "-iface", machine.ptp_interface.as_str(), "-config"])
                .append_arg(context.paths.vendor_config_file().to_string_lossy())
                .append_arg(master.ptp_address.as_str())
        }
        ClientType::FailoverMaster => {
            return Err(Error::invalid_state(
                machine.id.as_str(),
                "SPTP does not support a failover master",
            ))
        }
    };

    let go_bin = format!("{}/../go/bin", machine.remote_root);
    let invocation = invocation
        .extend_environment_variable("PATH", go_bin)
        .accept_return_code(-15)
        .as_privileged();
    Ok(context.supervise(invocation))
}

pub(crate) fn extract_samples(endpoint_id: EndpointId, records: &[LogRecord]) -> Result<Vec<Sample>> {
    extract_with_pattern(endpoint_id, records, MEASUREMENT_PATTERN, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::record;

    #[test]
    fn test_extracts_offsets() {
        let records = vec![
            record(
                1,
                "sptp",
                r#"| time="2024-02-01T10:00:00Z" level=info msg="offset     -121 s2 freq  -10404 path delay      4521 (  4410:  4632)""#,
            ),
            record(2, "sptp", r#"| time="2024-02-01T10:00:00Z" level=info msg="gm changed""#),
            record(
                3,
                "sptp",
                r#"| time="2024-02-01T10:00:01Z" level=info msg="offset   15.6 s2 freq  -10400 path delay  4500.2 (  4410:  4632)""#,
            ),
        ];
        let samples = extract_samples(1, &records).unwrap();
        let values: Vec<i64> = samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![-121, 4521, 16, 4500]);
    }
}
