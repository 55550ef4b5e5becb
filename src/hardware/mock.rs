//! Simulated buses for testing and development
//!
//! `MockBus` behaves like the sensing board and probe at register level: the
//! I2C side models the channel multiplexer and the AD5272 wiper, the SPI side
//! models the MCP3564 IRQ/MUX/ADCDATA registers per chip-select, and the serial
//! side answers scripted replies per command. All traffic is recorded.

use crate::hardware::{BusFactory, BusKind, I2cBus, SerialLink, SpiBus, TransportError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One recorded bus operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    I2cWrite { address: u8, bytes: Vec<u8> },
    I2cRead { address: u8, len: usize },
    SpiTransfer { chip_select: u8, bytes: Vec<u8> },
    SerialOpen { port: String },
    SerialWrite { bytes: Vec<u8> },
    SerialClear,
}

#[derive(Default)]
struct MockState {
    events: Vec<BusEvent>,
    failing: Vec<BusKind>,
    opens: HashMap<String, usize>,
    // I2C
    mux_select: Option<u8>,
    wiper: u16,
    // SPI, keyed by chip-select
    mux: HashMap<u8, u8>,
    busy_remaining: HashMap<u8, u32>,
    busy_polls: u32,
    conversions: HashMap<(u8, u8), [u8; 3]>,
    // Serial
    replies: HashMap<Vec<u8>, VecDeque<String>>,
    missing_ports: Vec<String>,
}

/// Shared handle onto the simulated hardware; clones observe the same state
#[derive(Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<MockState>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent operation on `bus` fail
    pub fn fail(&self, bus: BusKind, failing: bool) {
        let mut state = self.lock();
        state.failing.retain(|b| *b != bus);
        if failing {
            state.failing.push(bus);
        }
    }

    /// Number of IRQ polls that report "converting" after each conversion start.
    /// `u32::MAX` never completes.
    pub fn set_busy_polls(&self, polls: u32) {
        self.lock().busy_polls = polls;
    }

    /// Conversion result for driver channel `channel` (inputs 2n/2n+1) on `chip_select`
    pub fn set_conversion(&self, chip_select: u8, channel: u8, bytes: [u8; 3]) {
        self.lock().conversions.insert((chip_select, channel), bytes);
    }

    /// Queue a reply line for a serial command; unscripted commands time out
    pub fn script_reply(&self, command: &[u8], reply: &str) {
        self.lock()
            .replies
            .entry(command.to_vec())
            .or_default()
            .push_back(reply.to_string());
    }

    /// Serial opens of `port` fail until cleared
    pub fn remove_port(&self, port: &str, missing: bool) {
        let mut state = self.lock();
        state.missing_ports.retain(|p| p != port);
        if missing {
            state.missing_ports.push(port.to_string());
        }
    }

    /// Wiper position currently latched in the simulated potentiometer
    pub fn wiper(&self) -> u16 {
        self.lock().wiper
    }

    pub fn selected_mux(&self) -> Option<u8> {
        self.lock().mux_select
    }

    /// How many times a given device node or port has been opened
    pub fn open_count(&self, name: &str) -> usize {
        self.lock().opens.get(name).copied().unwrap_or(0)
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    fn check(&self, bus: BusKind) -> Result<(), TransportError> {
        if self.lock().failing.contains(&bus) {
            return Err(format!("simulated {} fault", bus).into());
        }
        Ok(())
    }

    fn record_open(&self, name: String) {
        *self.lock().opens.entry(name).or_insert(0) += 1;
    }
}

impl BusFactory for MockBus {
    fn open_i2c(&self, bus: u8) -> Result<Box<dyn I2cBus>, TransportError> {
        self.check(BusKind::I2c)?;
        self.record_open(format!("i2c-{}", bus));
        Ok(Box::new(MockI2c { bus: self.clone() }))
    }

    fn open_spi(
        &self,
        bus: u8,
        chip_select: u8,
        _max_speed_hz: u32,
    ) -> Result<Box<dyn SpiBus>, TransportError> {
        self.check(BusKind::Spi)?;
        self.record_open(format!("spidev{}.{}", bus, chip_select));
        Ok(Box::new(MockSpi {
            bus: self.clone(),
            chip_select,
        }))
    }

    fn open_serial(
        &self,
        port: &str,
        _baud_rate: u32,
        _timeout: Duration,
    ) -> Result<Box<dyn SerialLink>, TransportError> {
        self.check(BusKind::Serial)?;
        if self.lock().missing_ports.iter().any(|p| p == port) {
            return Err(format!("no such port: {}", port).into());
        }
        self.record_open(port.to_string());
        self.lock().events.push(BusEvent::SerialOpen {
            port: port.to_string(),
        });
        Ok(Box::new(MockSerial {
            bus: self.clone(),
            last_command: None,
        }))
    }
}

const TCA_ADDRESS_RANGE: std::ops::RangeInclusive<u8> = 0x70..=0x77;

struct MockI2c {
    bus: MockBus,
}

impl I2cBus for MockI2c {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), TransportError> {
        self.bus.check(BusKind::I2c)?;
        let mut state = self.bus.lock();
        state.events.push(BusEvent::I2cWrite {
            address,
            bytes: bytes.to_vec(),
        });

        if TCA_ADDRESS_RANGE.contains(&address) {
            state.mux_select = bytes.last().copied();
        } else if let [command, low] = bytes {
            if command >> 2 == 0b0001 {
                state.wiper = (u16::from(command & 0x03) << 8) | u16::from(*low);
            }
        }
        Ok(())
    }

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), TransportError> {
        self.bus.check(BusKind::I2c)?;
        let mut state = self.bus.lock();
        state.events.push(BusEvent::I2cRead {
            address,
            len: buffer.len(),
        });
        let wiper = state.wiper.to_be_bytes();
        for (slot, byte) in buffer.iter_mut().zip(wiper.iter()) {
            *slot = *byte;
        }
        Ok(())
    }
}

struct MockSpi {
    bus: MockBus,
    chip_select: u8,
}

impl SpiBus for MockSpi {
    fn transfer(&mut self, buffer: &mut [u8]) -> Result<(), TransportError> {
        self.bus.check(BusKind::Spi)?;
        let mut state = self.bus.lock();
        let cs = self.chip_select;
        state.events.push(BusEvent::SpiTransfer {
            chip_select: cs,
            bytes: buffer.to_vec(),
        });

        let Some(&command) = buffer.first() else {
            return Ok(());
        };
        let register = (command >> 2) & 0x0F;
        let access = command & 0x03;

        // Fast command: start conversion
        if command == 0b0110_1000 {
            let polls = state.busy_polls;
            state.busy_remaining.insert(cs, polls);
            buffer.fill(0);
            return Ok(());
        }

        let written = buffer.get(1).copied().unwrap_or(0);
        buffer[1..].fill(0);
        match (register, access) {
            (0x06, 0b10) => {
                state.mux.insert(cs, written);
            }
            (0x05, 0b11) if buffer.len() > 1 => {
                let remaining = state.busy_remaining.entry(cs).or_insert(0);
                if *remaining > 0 {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    buffer[1] = 1 << 6;
                }
            }
            (0x00, 0b11) if buffer.len() > 3 => {
                let channel = state.mux.get(&cs).map(|m| (m >> 4) / 2).unwrap_or(0);
                let data = state
                    .conversions
                    .get(&(cs, channel))
                    .copied()
                    .unwrap_or([0, 0, 0]);
                buffer[1..4].copy_from_slice(&data);
            }
            _ => {}
        }
        Ok(())
    }
}

struct MockSerial {
    bus: MockBus,
    last_command: Option<Vec<u8>>,
}

impl SerialLink for MockSerial {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.bus.check(BusKind::Serial)?;
        self.bus.lock().events.push(BusEvent::SerialWrite {
            bytes: bytes.to_vec(),
        });
        self.last_command = Some(bytes.to_vec());
        Ok(())
    }

    fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        self.bus.check(BusKind::Serial)?;
        let Some(command) = self.last_command.take() else {
            return Ok(Vec::new());
        };
        let reply = self
            .bus
            .lock()
            .replies
            .get_mut(&command)
            .and_then(VecDeque::pop_front);
        Ok(reply
            .map(|r| format!("{}\r\n", r).into_bytes())
            .unwrap_or_default())
    }

    fn clear(&mut self) -> Result<(), TransportError> {
        self.bus.check(BusKind::Serial)?;
        self.bus.lock().events.push(BusEvent::SerialClear);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_potentiometer_latches_wiper() {
        let mock = MockBus::new();
        let mut i2c = mock.open_i2c(1).unwrap();
        i2c.write(0x2C, &[0x07, 0xFF]).unwrap();
        assert_eq!(mock.wiper(), 0x3FF);

        let mut buf = [0u8; 2];
        i2c.read(0x2C, &mut buf).unwrap();
        assert_eq!(buf, [0x03, 0xFF]);
    }

    #[test]
    fn test_mock_fault_injection() {
        let mock = MockBus::new();
        mock.fail(BusKind::Spi, true);
        assert!(mock.open_spi(0, 0, 1_000_000).is_err());
        mock.fail(BusKind::Spi, false);
        assert!(mock.open_spi(0, 0, 1_000_000).is_ok());
        assert_eq!(mock.open_count("spidev0.0"), 1);
    }

    #[test]
    fn test_mock_serial_replies_in_order() {
        let mock = MockBus::new();
        mock.script_reply(b"R\n", "1,2,3,4");
        let mut link = mock
            .open_serial("/dev/ttyACM0", 9600, Duration::from_secs(1))
            .unwrap();

        link.write_all(b"R\n").unwrap();
        assert_eq!(link.read_line().unwrap(), b"1,2,3,4\r\n".to_vec());
        link.write_all(b"R\n").unwrap();
        assert!(link.read_line().unwrap().is_empty());
    }
}
