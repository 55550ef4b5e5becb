//! Soil Sensing Node
//!
//! Acquisition core for a microbial-fuel-cell sensing node: drivers for the
//! board's digital potentiometer and ADC, a serial soil probe, and a manager
//! that polls each sensor on its own schedule and fans readings out to
//! adapters.

pub mod core;
pub mod hardware;
pub mod sensors;
pub mod adapters;
pub mod manager;
pub mod utils;

// Re-export commonly used types
pub use crate::core::{unix_timestamp, AdcBank, PotChannel, Reading, ReadingStatus};
pub use hardware::{BusFactory, HardwareError, HwResult, LinuxBusFactory};
pub use sensors::{BoardSensor, ProbeSensor, Sensor};
pub use adapters::{Adapter, AdapterError, JsonLinesAdapter, LoggingAdapter, QueueAdapter};
pub use manager::{ManagerError, SensorManager};
pub use utils::{find_probe_port, HardwareConfig};
