//! Bus and transport interfaces the drivers are written against

use crate::hardware::TransportError;
use std::time::Duration;

/// Raw I2C bus access
pub trait I2cBus: Send {
    /// Write `bytes` to the device at `address` in a single transaction
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read `buffer.len()` bytes from the device at `address`
    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), TransportError>;
}

/// Full-duplex SPI access to one chip-select line
pub trait SpiBus: Send {
    /// Clock `buffer` out while chip-select is held, replacing it with the bytes clocked in
    fn transfer(&mut self, buffer: &mut [u8]) -> Result<(), TransportError>;
}

/// Line-oriented serial transport
pub trait SerialLink: Send {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read up to and including the next newline.
    ///
    /// Returns whatever arrived before the port timeout if no newline is seen;
    /// an empty vector means nothing was received.
    fn read_line(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Discard pending input and output
    fn clear(&mut self) -> Result<(), TransportError>;
}

/// Opens bus handles on demand so drivers can acquire them lazily
pub trait BusFactory: Send + Sync {
    fn open_i2c(&self, bus: u8) -> Result<Box<dyn I2cBus>, TransportError>;

    fn open_spi(
        &self,
        bus: u8,
        chip_select: u8,
        max_speed_hz: u32,
    ) -> Result<Box<dyn SpiBus>, TransportError>;

    fn open_serial(
        &self,
        port: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Box<dyn SerialLink>, TransportError>;
}

/// Common surface of every device driver
pub trait Driver: Send {
    /// Release the owned bus handle. Safe to call repeatedly.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}
