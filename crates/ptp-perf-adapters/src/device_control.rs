//! Switchable power strips the testbed machines are plugged into.

use std::collections::BTreeMap;

use async_trait::async_trait;
use ptp_perf_common::{Error, Result};
use ptp_perf_config::PowerStripConfig;
use ptp_perf_invoke::Invocation;
use tracing::debug;

fn state_name(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

/// Switches the power of single machines.
#[async_trait]
pub trait PowerSwitch: Send + Sync {
    /// Sets the socket of `machine_id` and returns the state the device
    /// reports afterwards.
    async fn set_state(&self, machine_id: &str, on: bool) -> Result<bool>;
}

/// Power strips driven through their configured shell command.
pub struct CommandPowerSwitch {
    sockets: BTreeMap<String, (PowerStripConfig, u32)>,
}

impl CommandPowerSwitch {
    pub fn new(strips: &[PowerStripConfig]) -> Self {
        let sockets = strips
            .iter()
            .flat_map(|strip| {
                strip
                    .sockets
                    .iter()
                    .map(move |(machine_id, socket)| (machine_id.clone(), (strip.clone(), *socket)))
            })
            .collect();
        Self { sockets }
    }
}

/// Reads the state a power strip command printed last.
fn parse_reported_state(output: &str) -> Option<bool> {
    let last = output.lines().rev().find(|line| !line.trim().is_empty())?;
    match last.trim().to_ascii_lowercase().as_str() {
        "on" | "1" | "true" => Some(true),
        "off" | "0" | "false" => Some(false),
        _ => None,
    }
}

#[async_trait]
impl PowerSwitch for CommandPowerSwitch {
    async fn set_state(&self, machine_id: &str, on: bool) -> Result<bool> {
        let (strip, socket) = self.sockets.get(machine_id).ok_or_else(|| {
            Error::config_not_found(format!("power strip socket of machine {}", machine_id))
        })?;

        let command = Invocation::of_shell(strip.command_for(*socket, on)).hide_unless_failure();
        command.run().await?;
        let output = command.output();
        debug!(strip = %strip.id, socket, "Power strip reported: {}", output.trim());

        parse_reported_state(&output).ok_or_else(|| {
            Error::actuation_failed(
                format!("{} socket {}", strip.id, socket),
                state_name(on),
                format!("unreadable state '{}'", output.trim()),
            )
        })
    }
}

/// Drives machines' power through a [`PowerSwitch`], one socket at a time,
/// and verifies each actuation.
pub struct DeviceController {
    switch: Box<dyn PowerSwitch>,
}

impl DeviceController {
    pub fn new(switch: impl PowerSwitch + 'static) -> Self {
        Self {
            switch: Box::new(switch),
        }
    }

    pub async fn toggle_machine(&self, machine_id: &str, on: bool) -> Result<()> {
        let actual = self.switch.set_state(machine_id, on).await?;
        if actual != on {
            return Err(Error::actuation_failed(
                machine_id,
                state_name(on),
                state_name(actual),
            ));
        }
        Ok(())
    }

    pub async fn toggle_machines(&self, machine_ids: &[String], on: bool) -> Result<()> {
        for machine_id in machine_ids {
            self.toggle_machine(machine_id, on).await?;
        }
        Ok(())
    }
}
