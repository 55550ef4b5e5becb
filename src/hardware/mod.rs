//! Hardware abstraction layer for the sensing board and serial probe
//!
//! Drivers are written against the bus traits in [`bus`] and acquire their
//! handles lazily through a [`BusFactory`]: [`LinuxBusFactory`] on the target,
//! [`mock::MockBus`] in tests.

pub mod bus;
pub mod error;
pub mod linux;
pub mod mock;
pub mod ad5272;
pub mod mcp3564;
pub mod serial;

pub use bus::{BusFactory, Driver, I2cBus, SerialLink, SpiBus};
pub use error::{BusKind, HardwareError, HwResult, TransportError};
pub use linux::LinuxBusFactory;
pub use ad5272::DigitalPotDriver;
pub use mcp3564::AdcDriver;
pub use serial::SerialDriver;
