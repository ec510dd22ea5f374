//! Vendor configuration template rendering.
//!
//! Templates reference fields as `{ptp_config.log_sync_interval}`,
//! `{machine.ptp_interface}` or `{cluster.id}`. Literal braces are written
//! doubled (`{{`, `}}`).

use ptp_perf_common::{Error, Result};
use regex::{Captures, Regex};

use crate::benchmark::PtpConfig;
use crate::machine::{Cluster, Machine};

const PLACEHOLDER: &str = r"\{\{|\}\}|\{(\w+)\.(\w+)\}";

pub fn render_template(
    template: &str,
    ptp_config: &PtpConfig,
    machine: &Machine,
    cluster: &Cluster,
) -> Result<String> {
    let placeholder = Regex::new(PLACEHOLDER).map_err(|e| Error::validation(e.to_string()))?;
    let mut missing = None;
    let rendered = placeholder.replace_all(template, |captures: &Captures| {
        let whole = &captures[0];
        match whole {
            "{{" => return "{".to_string(),
            "}}" => return "}".to_string(),
            _ => {}
        }
        let (object, field) = (&captures[1], &captures[2]);
        let value = match object {
            "ptp_config" => ptp_config.field(field),
            "machine" => machine_field(machine, field),
            "cluster" => cluster_field(cluster, field),
            _ => None,
        };
        value.unwrap_or_else(|| {
            missing.get_or_insert_with(|| format!("{}.{}", object, field));
            String::new()
        })
    });

    match missing {
        Some(field) => Err(Error::config_not_found(format!("template field '{}'", field))),
        None => Ok(rendered.into_owned()),
    }
}

fn machine_field(machine: &Machine, field: &str) -> Option<String> {
    let value = match field {
        "id" => machine.id.clone(),
        "address" => machine.ssh_address().to_string(),
        "ptp_interface" => machine.ptp_interface.clone(),
        "ptp_address" => machine.ptp_address.clone(),
        "ptp_priority_1" => machine.ptp_priority_1.to_string(),
        "ptp_timestamp_type" => machine.ptp_timestamp_type().to_string(),
        "endpoint_type" => machine.endpoint_type.to_string(),
        "remote_root" => machine.remote_root.clone(),
        _ => return None,
    };
    Some(value)
}

fn cluster_field(cluster: &Cluster, field: &str) -> Option<String> {
    match field {
        "id" => Some(cluster.id.clone()),
        "name" => Some(cluster.name.clone()),
        "master_address" => cluster.ptp_master().ok().map(|master| master.ptp_address.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptp_perf_common::{EndpointType, ErrorKind};

    fn fixtures() -> (PtpConfig, Machine, Cluster) {
        let mut machine = Machine::new("rpi08", EndpointType::PrimarySlave);
        machine.ptp_interface = "eth0".to_string();
        machine.ptp_priority_1 = 248;
        let mut master = Machine::new("rpi06", EndpointType::Master);
        master.ptp_address = "10.0.0.6".to_string();
        let cluster = Cluster {
            id: "rpi-4".to_string(),
            name: "Raspberry Pi 4".to_string(),
            machines: vec![master, machine.clone()],
        };
        (PtpConfig::default(), machine, cluster)
    }

    #[test]
    fn test_render_fields() {
        let (ptp_config, machine, cluster) = fixtures();
        let template = "[global]\ndelay_mechanism {ptp_config.delay_mechanism}\n\
                        logSyncInterval {ptp_config.log_sync_interval}\n\
                        priority1 {machine.ptp_priority_1}\n[{machine.ptp_interface}]\n# {cluster.id} {cluster.master_address}\n";

        let rendered = render_template(template, &ptp_config, &machine, &cluster).unwrap();

        assert_eq!(
            rendered,
            "[global]\ndelay_mechanism E2E\nlogSyncInterval 0\npriority1 248\n[eth0]\n# rpi-4 10.0.0.6\n"
        );
    }

    #[test]
    fn test_escaped_braces() {
        let (ptp_config, machine, cluster) = fixtures();
        let rendered = render_template("{{ {machine.id} }}", &ptp_config, &machine, &cluster).unwrap();
        assert_eq!(rendered, "{ rpi08 }");
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let (ptp_config, machine, cluster) = fixtures();
        let err = render_template("{machine.colour}", &ptp_config, &machine, &cluster).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigNotFound);
        assert!(err.to_string().contains("machine.colour"));
    }
}
