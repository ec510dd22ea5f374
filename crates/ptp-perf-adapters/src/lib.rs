//! Activities that run next to the vendor on an endpoint: fault
//! injection, artificial load and resource monitoring.

pub mod degraders;
pub mod device_control;
pub mod fault;
pub mod hardware_fault;
pub mod resource_monitor;
pub mod software_fault;

pub use degraders::{CpuPerformanceDegrader, IperfRole, NetworkPerformanceDegrader};
pub use device_control::{CommandPowerSwitch, DeviceController, PowerSwitch};
pub use fault::{FaultEvent, FaultEventParser, FaultKind, FaultPhase, FAULT_LOG_SOURCE};
pub use hardware_fault::HardwareFaultGenerator;
pub use resource_monitor::{ResourceMonitor, ResourceSnapshot, RESOURCE_MONITOR_SOURCE};
pub use software_fault::SoftwareFaultGenerator;
