//! Line-oriented serial driver for the soil probe

use crate::hardware::{BusFactory, BusKind, Driver, HardwareError, HwResult, SerialLink};
use crate::utils::HardwareConfig;
use std::sync::Arc;
use std::thread;

/// Serial connection that remembers which port it is bound to
pub struct SerialDriver {
    config: Arc<HardwareConfig>,
    factory: Arc<dyn BusFactory>,
    connection: Option<Box<dyn SerialLink>>,
    port: Option<String>,
}

impl SerialDriver {
    pub fn new(config: Arc<HardwareConfig>, factory: Arc<dyn BusFactory>) -> Self {
        Self {
            config,
            factory,
            connection: None,
            port: None,
        }
    }

    /// Open `port`, replacing any connection to a different port.
    ///
    /// Waits for the device to settle after opening, then discards anything
    /// already buffered in either direction.
    pub fn connect(&mut self, port: &str) -> HwResult<()> {
        if self.is_connected() && self.port.as_deref() == Some(port) {
            return Ok(());
        }

        self.disconnect();

        let mut connection = self
            .factory
            .open_serial(port, self.config.serial_baudrate, self.config.serial_timeout())
            .map_err(|e| HardwareError::communication(BusKind::Serial, e))?;

        let settle = self.config.serial_settle();
        if !settle.is_zero() {
            thread::sleep(settle);
        }
        connection
            .clear()
            .map_err(|e| HardwareError::communication(BusKind::Serial, e))?;

        tracing::debug!("Opened serial port {}", port);
        self.connection = Some(connection);
        self.port = Some(port.to_string());
        Ok(())
    }

    /// Write `command` and return the next response line, decoded and trimmed.
    ///
    /// An empty string means the device sent nothing before the read timeout.
    pub fn send_command(&mut self, command: &[u8]) -> HwResult<String> {
        let connection = self.connection.as_mut().ok_or(HardwareError::NotConnected)?;

        connection
            .write_all(command)
            .map_err(|e| HardwareError::communication(BusKind::Serial, e))?;
        let line = connection
            .read_line()
            .map_err(|e| HardwareError::communication(BusKind::Serial, e))?;

        Ok(String::from_utf8_lossy(&line).trim().to_string())
    }

    pub fn disconnect(&mut self) {
        if self.connection.take().is_some() {
            if let Some(port) = &self.port {
                tracing::debug!("Closed serial port {}", port);
            }
        }
        self.port = None;
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Port of the open connection
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }
}

impl Driver for SerialDriver {
    fn close(&mut self) {
        self.disconnect();
    }

    fn is_open(&self) -> bool {
        self.is_connected()
    }
}
