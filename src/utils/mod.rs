//! Utility modules for configuration and port discovery

pub mod config;
pub mod ports;

pub use config::HardwareConfig;
pub use ports::find_probe_port;
