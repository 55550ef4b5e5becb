//! Linux character-device backend (`/dev/i2c-*`, `/dev/spidev*`, tty ports)

use crate::hardware::{BusFactory, I2cBus, SerialLink, SpiBus, TransportError};
use embedded_hal::i2c::I2c;
use embedded_hal::spi::SpiDevice;
use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
use linux_embedded_hal::{I2cdev, SpidevDevice};
use serialport::{ClearBuffer, SerialPort};
use std::fmt::Debug;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::time::Duration;

fn transport<E: Debug>(error: E) -> TransportError {
    format!("{:?}", error).into()
}

/// Opens real device nodes on the host
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxBusFactory;

impl BusFactory for LinuxBusFactory {
    fn open_i2c(&self, bus: u8) -> Result<Box<dyn I2cBus>, TransportError> {
        let device = I2cdev::new(format!("/dev/i2c-{}", bus)).map_err(transport)?;
        Ok(Box::new(LinuxI2c(device)))
    }

    fn open_spi(
        &self,
        bus: u8,
        chip_select: u8,
        max_speed_hz: u32,
    ) -> Result<Box<dyn SpiBus>, TransportError> {
        let mut device = SpidevDevice::open(format!("/dev/spidev{}.{}", bus, chip_select))
            .map_err(transport)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(max_speed_hz)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        device.0.configure(&options)?;
        Ok(Box::new(LinuxSpi(device)))
    }

    fn open_serial(
        &self,
        port: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Box<dyn SerialLink>, TransportError> {
        let port = serialport::new(port, baud_rate).timeout(timeout).open()?;
        Ok(Box::new(LinuxSerial {
            reader: BufReader::new(port),
        }))
    }
}

struct LinuxI2c(I2cdev);

impl I2cBus for LinuxI2c {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), TransportError> {
        I2c::write(&mut self.0, address, bytes).map_err(transport)
    }

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), TransportError> {
        I2c::read(&mut self.0, address, buffer).map_err(transport)
    }
}

struct LinuxSpi(SpidevDevice);

impl SpiBus for LinuxSpi {
    fn transfer(&mut self, buffer: &mut [u8]) -> Result<(), TransportError> {
        SpiDevice::transfer_in_place(&mut self.0, buffer).map_err(transport)
    }
}

struct LinuxSerial {
    reader: BufReader<Box<dyn SerialPort>>,
}

impl SerialLink for LinuxSerial {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.reader.get_mut();
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut line = Vec::new();
        match self.reader.read_until(b'\n', &mut line) {
            Ok(_) => Ok(line),
            // Partial data stays in `line`, matching a timed-out readline
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(line),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&mut self) -> Result<(), TransportError> {
        let buffered = self.reader.buffer().len();
        self.reader.consume(buffered);
        self.reader.get_ref().clear(ClearBuffer::All)?;
        Ok(())
    }
}
