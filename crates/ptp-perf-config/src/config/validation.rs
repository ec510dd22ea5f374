use super::*;
use anyhow::{anyhow, Result};
use std::collections::HashSet;

/// Validate the complete configuration
pub fn validate_config(config: &PtpPerfConfig) -> Result<()> {
    validate_machines(&config.machines)?;
    validate_clusters(&config.clusters, &config.machines)?;
    validate_power_strips(&config.power_strips, &config.machines)?;

    if config.remote_worker_command.trim().is_empty() {
        return Err(anyhow!("Remote worker command cannot be empty"));
    }

    Ok(())
}

fn validate_machines(machines: &[Machine]) -> Result<()> {
    if machines.is_empty() {
        return Err(anyhow!("At least one machine must be configured"));
    }

    let mut ids = HashSet::new();
    for machine in machines {
        if machine.id.is_empty() {
            return Err(anyhow!("Machine ID cannot be empty"));
        }
        if !ids.insert(&machine.id) {
            return Err(anyhow!("Duplicate machine ID: {}", machine.id));
        }
        if machine.endpoint_type.runs_worker() && machine.ptp_interface.is_empty() {
            return Err(anyhow!(
                "Machine {} runs a PTP daemon but has no ptp_interface",
                machine.id
            ));
        }
    }

    Ok(())
}

fn validate_clusters(clusters: &[ClusterConfig], machines: &[Machine]) -> Result<()> {
    let mut ids = HashSet::new();
    for cluster in clusters {
        if !ids.insert(&cluster.id) {
            return Err(anyhow!("Duplicate cluster ID: {}", cluster.id));
        }
        if cluster.machines.is_empty() {
            return Err(anyhow!("Cluster {} has no machines", cluster.id));
        }

        let mut members = HashSet::new();
        let mut masters = 0;
        let mut workers = 0;
        for machine_id in &cluster.machines {
            if !members.insert(machine_id) {
                return Err(anyhow!("Cluster {} lists machine {} twice", cluster.id, machine_id));
            }
            let machine = machines
                .iter()
                .find(|machine| &machine.id == machine_id)
                .ok_or_else(|| anyhow!("Cluster {} references unknown machine: {}", cluster.id, machine_id))?;
            if machine.endpoint_type == EndpointType::Master {
                masters += 1;
            }
            if machine.endpoint_type.runs_worker() {
                workers += 1;
            }
        }

        // Clusters that only hold service hosts need no master.
        if workers > 0 && masters != 1 {
            return Err(anyhow!(
                "Cluster {} must have exactly one master, found {}",
                cluster.id,
                masters
            ));
        }
    }

    Ok(())
}

fn validate_power_strips(strips: &[PowerStripConfig], machines: &[Machine]) -> Result<()> {
    let mut ids = HashSet::new();
    let mut plugged = HashSet::new();
    for strip in strips {
        if !ids.insert(&strip.id) {
            return Err(anyhow!("Duplicate power strip ID: {}", strip.id));
        }
        if !strip.set_command.contains("{socket}") || !strip.set_command.contains("{state}") {
            return Err(anyhow!(
                "Power strip {} command must contain {{socket}} and {{state}}",
                strip.id
            ));
        }

        let mut sockets = HashSet::new();
        for (machine_id, socket) in &strip.sockets {
            if !machines.iter().any(|machine| &machine.id == machine_id) {
                return Err(anyhow!(
                    "Power strip {} references unknown machine: {}",
                    strip.id,
                    machine_id
                ));
            }
            if !plugged.insert(machine_id) {
                return Err(anyhow!("Machine {} is plugged into more than one socket", machine_id));
            }
            if !sockets.insert(*socket) {
                return Err(anyhow!("Power strip {} assigns socket {} twice", strip.id, socket));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::SAMPLE;
    use super::*;

    fn error_for(yaml: &str) -> String {
        PtpPerfConfig::load_from_string(yaml)
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn test_duplicate_machine() {
        let yaml = SAMPLE.replace("id: rpi07", "id: rpi08");
        assert!(error_for(&yaml).contains("Duplicate machine ID: rpi08"));
    }

    #[test]
    fn test_unknown_cluster_member() {
        let yaml = SAMPLE.replace("[rpi06, rpi08, rpi07]", "[rpi06, rpi08, rpi09]");
        assert!(error_for(&yaml).contains("unknown machine: rpi09"));
    }

    #[test]
    fn test_cluster_needs_one_master() {
        let yaml = SAMPLE.replace("[rpi06, rpi08, rpi07]", "[rpi08, rpi07]");
        assert!(error_for(&yaml).contains("exactly one master"));
    }

    #[test]
    fn test_machine_on_two_sockets() {
        let yaml = SAMPLE.replace(
            "power_strips:",
            "power_strips:\n  - id: other\n    set_command: \"x {socket} {state}\"\n    sockets:\n      rpi06: 1",
        );
        assert!(error_for(&yaml).contains("rpi06 is plugged into more than one socket"));
    }

    #[test]
    fn test_power_strip_command_placeholders() {
        let yaml = SAMPLE.replace("--state {state}", "--state on");
        assert!(error_for(&yaml).contains("must contain"));
    }
}
