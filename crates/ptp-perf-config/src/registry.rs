//! Compiled-in benchmark registry.

use std::time::Duration;

use once_cell::sync::Lazy;
use ptp_perf_common::{EndpointType, Error, Result};
use regex::Regex;

use crate::benchmark::{tags, Benchmark, PtpConfig};

const LOAD_LEVELS: [u32; 12] = [1, 5, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100];
const CONFIG_TEST_INTERVALS: [i32; 11] = [3, 2, 1, 0, -1, -2, -3, -4, -5, -6, -7];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentionComponent {
    Net,
    Cpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentionType {
    Unprioritized,
    Prioritized,
    Isolated,
}

static BENCHMARKS: Lazy<Vec<Benchmark>> = Lazy::new(build_registry);

/// Lookup of the statically declared benchmarks.
pub struct BenchmarkDb;

impl BenchmarkDb {
    pub fn all() -> &'static [Benchmark] {
        &BENCHMARKS
    }

    pub fn get(id: &str) -> Result<Benchmark> {
        BENCHMARKS
            .iter()
            .find(|benchmark| benchmark.id == id)
            .cloned()
            .ok_or_else(|| Error::config_not_found(format!("benchmark '{}'", id)))
    }

    /// Benchmarks whose id matches `pattern` at its start.
    pub fn matching(pattern: &str) -> Result<Vec<Benchmark>> {
        let regex = Regex::new(&format!("^(?:{})", pattern))
            .map_err(|e| Error::validation(format!("Invalid benchmark pattern '{}': {}", pattern, e)))?;
        Ok(BENCHMARKS
            .iter()
            .filter(|benchmark| regex.is_match(&benchmark.id))
            .cloned()
            .collect())
    }
}

fn build_registry() -> Vec<Benchmark> {
    let mut benchmarks = vec![
        Benchmark::new("base", "Baseline"),
        Benchmark::new("test/test", "Test").with_duration(Duration::from_secs(60)),
        Benchmark::new("test/demo", "Demo").with_duration(Duration::from_secs(5 * 60)),
        Benchmark::new("configuration/no_switch", "No Switch"),
        Benchmark {
            num_machines: 3,
            ..Benchmark::new("scalability/1_to_2", "1 Master 2 Clients")
        },
        Benchmark {
            tags: vec![
                tags::CATEGORY_FAULT.to_string(),
                tags::FAULT_SOFTWARE.to_string(),
                tags::FAULT_LOCATION_SLAVE.to_string(),
            ],
            duration: Duration::from_secs(15 * 60),
            num_machines: 3,
            ptp_keepalive: true,
            fault_software: true,
            fault_interval: Some(Duration::from_secs(10 * 60)),
            fault_duration: Some(Duration::from_secs(60)),
            fault_location: Some(EndpointType::PrimarySlave),
            ..Benchmark::new("fault/software/slave", "Software Fault (Slave)")
        },
        hardware_fault("switch", "Switch", EndpointType::Switch, tags::FAULT_LOCATION_SWITCH),
        hardware_fault("slave", "Slave", EndpointType::PrimarySlave, tags::FAULT_LOCATION_SLAVE),
        hardware_fault("master", "Master", EndpointType::Master, tags::FAULT_LOCATION_MASTER),
    ];

    for component in [ContentionComponent::Net, ContentionComponent::Cpu] {
        for load_level in LOAD_LEVELS {
            benchmarks.push(resource_contention(component, ContentionType::Unprioritized, load_level));
        }
        benchmarks.push(resource_contention(component, ContentionType::Prioritized, 100));
        benchmarks.push(resource_contention(component, ContentionType::Isolated, 100));
    }

    for interval in CONFIG_TEST_INTERVALS {
        benchmarks.push(config_test(
            PtpConfig {
                log_sync_interval: interval,
                log_delayreq_interval: interval,
                ..PtpConfig::default()
            },
            &format!("interval_{}", interval),
        ));
    }

    benchmarks
}

fn hardware_fault(suffix: &str, label: &str, location: EndpointType, location_tag: &str) -> Benchmark {
    // Powering off a worker drops its ssh session, so the session is restarted.
    let worker_fault = location != EndpointType::Switch;
    Benchmark {
        tags: vec![
            tags::CATEGORY_FAULT.to_string(),
            tags::FAULT_HARDWARE.to_string(),
            location_tag.to_string(),
        ],
        num_machines: 3,
        fault_hardware: true,
        fault_interval: Some(Duration::from_secs(2 * 60)),
        fault_duration: Some(Duration::from_secs(5)),
        fault_location: Some(location),
        fault_ssh_keepalive: worker_fault,
        analyze_limit_permissible_clock_steps: if worker_fault { None } else { Some(1) },
        ..Benchmark::new(
            format!("fault/hardware/{}", suffix),
            format!("Hardware Fault ({})", label),
        )
    }
}

fn resource_contention(component: ContentionComponent, kind: ContentionType, load_level: u32) -> Benchmark {
    let (component_id, component_name, component_tag) = match component {
        ContentionComponent::Net => ("net", "Network", tags::COMPONENT_NET),
        ContentionComponent::Cpu => ("cpu", "CPU", tags::COMPONENT_CPU),
    };
    let (kind_id, kind_name, kind_tag) = match kind {
        ContentionType::Unprioritized => ("unprioritized", "Unprioritized", tags::ISOLATION_UNPRIORITIZED),
        ContentionType::Prioritized => ("prioritized", "Prioritized", tags::ISOLATION_PRIORITIZED),
        ContentionType::Isolated => ("isolated", "Isolated", tags::ISOLATION_ISOLATED),
    };

    let mut benchmark = Benchmark::new(
        format!("load/{}_{}/load_{}", component_id, kind_id, load_level),
        format!("{} {} {}% Load", kind_name, component_name, load_level),
    );
    benchmark.tags = vec![
        tags::CATEGORY_LOAD.to_string(),
        component_tag.to_string(),
        kind_tag.to_string(),
    ];

    match component {
        // Percentage of a 1 Gbit/s link
        ContentionComponent::Net => benchmark.artificial_load_network = load_level * 1000 / 100,
        ContentionComponent::Cpu => benchmark.artificial_load_cpu = load_level,
    }

    match (component, kind) {
        (_, ContentionType::Unprioritized) => {}
        // CS1 is the low priority class selector
        (ContentionComponent::Net, ContentionType::Prioritized) => {
            benchmark.artificial_load_network_dscp_priority = Some("cs1".to_string())
        }
        (ContentionComponent::Cpu, ContentionType::Prioritized) => {
            benchmark.artificial_load_cpu_scheduler = Some("idle".to_string())
        }
        (ContentionComponent::Net, ContentionType::Isolated) => {
            benchmark.artificial_load_network_secondary_interface = true
        }
        (ContentionComponent::Cpu, ContentionType::Isolated) => {
            benchmark.artificial_load_cpu_restrict_cores = true
        }
    }

    benchmark
}

fn config_test(ptp_config: PtpConfig, label: &str) -> Benchmark {
    Benchmark {
        tags: vec![
            tags::CATEGORY_CONFIGURATION.to_string(),
            tags::CONFIGURATION_INTERVAL.to_string(),
        ],
        duration: Duration::from_secs(60 * 60),
        ptp_config,
        ..Benchmark::new(format!("config_test_{}", label), format!("Config Test ({})", label))
    }
}
