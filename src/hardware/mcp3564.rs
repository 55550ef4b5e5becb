//! MCP3564 delta-sigma ADC driver
//!
//! The board carries one converter per chip-select line. Each line gets the
//! same one-shot configuration the first time it is used; switching lines
//! reopens the SPI device and repeats the initialization.

use crate::core::{AdcBank, MCP3564_DEVICE_ADDRESS, MCP3564_FULL_SCALE, MCP3564_GAIN_CAL};
use crate::hardware::{BusFactory, BusKind, Driver, HardwareError, HwResult, SpiBus};
use crate::utils::HardwareConfig;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Register addresses
pub mod regs {
    pub const ADCDATA: u8 = 0x00;
    pub const CONFIG0: u8 = 0x01;
    pub const CONFIG1: u8 = 0x02;
    pub const CONFIG2: u8 = 0x03;
    pub const CONFIG3: u8 = 0x04;
    pub const IRQ: u8 = 0x05;
    pub const MUX: u8 = 0x06;
    pub const SCAN: u8 = 0x07;
    pub const TIMER: u8 = 0x08;
    pub const OFFSETCAL: u8 = 0x09;
    pub const GAINCAL: u8 = 0x0A;
    pub const LOCK: u8 = 0x0D;
    pub const CRCCFG: u8 = 0x0F;
}

/// Startup register values
mod init {
    /// Internal oscillator, no current bias, ADC in standby
    pub const CONFIG0: u8 = (0b10 << 4) | 0b10;
    /// AMCLK = MCLK/2, oversampling ratio 1024
    pub const CONFIG1: u8 = (0b01 << 6) | (0b0101 << 2);
    /// One-shot conversion, 24-bit output, offset/gain calibration enabled
    pub const CONFIG3: u8 = (0b10 << 6) | (0b00 << 4) | 1;
    /// IRQ pin enabled, push-pull, fast commands enabled
    pub const IRQ: u8 = (0b01 << 2) | (1 << 1) | 1;
}

/// Fast command: start a one-shot conversion
pub const START_CONVERSION: u8 = (MCP3564_DEVICE_ADDRESS << 6) | (0b1010 << 2);

/// Active-low DR_STATUS flag in the IRQ register: set while a conversion is
/// still in progress, cleared once ADCDATA holds a fresh result
const DR_STATUS_BIT: u8 = 1 << 6;

/// Pause between IRQ polls
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Access field of a register command byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Access {
    StaticRead = 0b01,
    Write = 0b10,
    Read = 0b11,
}

/// `(device_address << 6) | (register << 2) | access`
pub fn command(register: u8, access: Access) -> u8 {
    (MCP3564_DEVICE_ADDRESS << 6) | ((register & 0x0F) << 2) | access as u8
}

/// Differential MUX setting for driver channel `channel`: inputs 2n (+) and 2n+1 (-)
pub fn mux_value(channel: u8) -> u8 {
    let positive = channel.wrapping_mul(2) & 0x0F;
    let negative = (positive + 1) & 0x0F;
    (positive << 4) | negative
}

/// Convert a big-endian 24-bit two's-complement sample to volts
pub fn raw_to_voltage(raw: [u8; 3], gain: f64, vref: f64) -> f64 {
    vref * (f64::from(raw_to_signed(raw)) / MCP3564_FULL_SCALE) / gain
}

/// Sign-extend a 24-bit sample
pub fn raw_to_signed(raw: [u8; 3]) -> i32 {
    let value = (i32::from(raw[0]) << 16) | (i32::from(raw[1]) << 8) | i32::from(raw[2]);
    if value & 0x80_0000 != 0 {
        value - 0x100_0000
    } else {
        value
    }
}

pub struct AdcDriver {
    config: Arc<HardwareConfig>,
    factory: Arc<dyn BusFactory>,
    spi: Option<Box<dyn SpiBus>>,
    current_cs: Option<u8>,
    initialized: bool,
}

impl AdcDriver {
    pub fn new(config: Arc<HardwareConfig>, factory: Arc<dyn BusFactory>) -> Self {
        Self {
            config,
            factory,
            spi: None,
            current_cs: None,
            initialized: false,
        }
    }

    /// Chip-select line the open handle is bound to, if any
    pub fn current_chip_select(&self) -> Option<u8> {
        self.current_cs
    }

    /// Acquire the handle for `bank`, reopening and reinitializing on a chip-select change
    fn spi(&mut self, bank: AdcBank) -> HwResult<&mut Box<dyn SpiBus>> {
        let cs = bank.chip_select();
        if self.current_cs != Some(cs) {
            self.spi = None;
            self.initialized = false;
        }

        let spi = match self.spi.take() {
            Some(spi) => spi,
            None => {
                let spi = self
                    .factory
                    .open_spi(self.config.spi_bus, cs, self.config.spi_max_speed)
                    .map_err(|e| HardwareError::communication(BusKind::Spi, e))?;
                self.current_cs = Some(cs);
                spi
            }
        };
        let spi = self.spi.insert(spi);

        if !self.initialized {
            initialize(spi.as_mut())?;
            self.initialized = true;
            tracing::debug!("Initialized ADC on chip-select {}", cs);
        }
        Ok(spi)
    }

    /// Run one differential conversion on `channel` of `bank`.
    ///
    /// Returns `Ok(None)` when the conversion does not finish within the
    /// configured timeout so the caller can skip the sample.
    pub fn read_channel_raw(&mut self, bank: AdcBank, channel: u8) -> HwResult<Option<[u8; 3]>> {
        let timeout = self.config.adc_timeout();
        let spi = self.spi(bank)?;

        xfer(spi.as_mut(), &mut [command(regs::MUX, Access::Write), mux_value(channel)])?;
        xfer(spi.as_mut(), &mut [START_CONVERSION])?;

        let start = Instant::now();
        loop {
            let mut irq = [command(regs::IRQ, Access::Read), 0];
            xfer(spi.as_mut(), &mut irq)?;
            if irq[1] & DR_STATUS_BIT == 0 {
                break;
            }
            if start.elapsed() > timeout {
                tracing::debug!("Conversion timeout on {} channel {}", bank, channel);
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }

        let mut data = [command(regs::ADCDATA, Access::Read), 0, 0, 0];
        xfer(spi.as_mut(), &mut data)?;
        Ok(Some([data[1], data[2], data[3]]))
    }

    /// Convert with the configured converter reference
    pub fn raw_to_voltage(&self, raw: [u8; 3], gain: f64) -> f64 {
        raw_to_voltage(raw, gain, self.config.mcp3564_vref)
    }
}

fn xfer(spi: &mut dyn SpiBus, buffer: &mut [u8]) -> HwResult<()> {
    spi.transfer(buffer)
        .map_err(|e| HardwareError::communication(BusKind::Spi, e))
}

fn initialize(spi: &mut dyn SpiBus) -> HwResult<()> {
    // Sanity read; the value itself is not checked
    xfer(spi, &mut [command(regs::LOCK, Access::Read), 0])?;

    let configs = [
        (regs::CONFIG0, init::CONFIG0),
        (regs::CONFIG1, init::CONFIG1),
        (regs::CONFIG3, init::CONFIG3),
        (regs::IRQ, init::IRQ),
    ];
    for (register, value) in configs {
        xfer(spi, &mut [command(register, Access::Write), value])?;
    }

    let [g0, g1, g2] = MCP3564_GAIN_CAL;
    xfer(spi, &mut [command(regs::GAINCAL, Access::Write), g0, g1, g2])
}

impl Driver for AdcDriver {
    fn close(&mut self) {
        self.spi = None;
        self.current_cs = None;
        self.initialized = false;
    }

    fn is_open(&self) -> bool {
        self.spi.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{BusEvent, MockBus};

    fn driver_with(config: HardwareConfig) -> (AdcDriver, MockBus) {
        let mock = MockBus::new();
        let driver = AdcDriver::new(Arc::new(config), Arc::new(mock.clone()));
        (driver, mock)
    }

    fn spi_writes(mock: &MockBus) -> Vec<(u8, Vec<u8>)> {
        mock.events()
            .into_iter()
            .filter_map(|e| match e {
                BusEvent::SpiTransfer { chip_select, bytes } => Some((chip_select, bytes)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_command_byte_encoding() {
        assert_eq!(command(regs::LOCK, Access::Read), 0x77);
        assert_eq!(command(regs::CONFIG0, Access::Write), 0x46);
        assert_eq!(command(regs::ADCDATA, Access::Read), 0x43);
        assert_eq!(command(regs::IRQ, Access::StaticRead), 0x55);
        assert_eq!(START_CONVERSION, 0x68);
    }

    #[test]
    fn test_init_register_values() {
        assert_eq!(init::CONFIG0, 0x22);
        assert_eq!(init::CONFIG1, 0x54);
        assert_eq!(init::CONFIG3, 0x81);
        assert_eq!(init::IRQ, 0x07);
    }

    #[test]
    fn test_mux_value_wraps() {
        assert_eq!(mux_value(0), 0x01);
        assert_eq!(mux_value(1), 0x23);
        assert_eq!(mux_value(3), 0x67);
        assert_eq!(mux_value(7), 0xEF);
        assert_eq!(mux_value(8), 0x01);
    }

    #[test]
    fn test_raw_to_voltage_boundaries() {
        let vref = 3.32;
        assert_eq!(raw_to_voltage([0x7F, 0xFF, 0xFF], 1.0, vref), vref * (8_388_607.0 / 8_388_608.0));
        assert_eq!(raw_to_voltage([0x80, 0x00, 0x00], 1.0, vref), -vref);
        assert_eq!(raw_to_voltage([0x00, 0x00, 0x00], 1.0, vref), 0.0);
        assert_eq!(raw_to_voltage([0xFF, 0xFF, 0xFF], 1.0, vref), -vref / 8_388_608.0);
        assert_eq!(raw_to_voltage([0x40, 0x00, 0x00], 2.0, 4.0), 1.0);
    }

    #[test]
    fn test_raw_to_signed_polarities() {
        assert_eq!(raw_to_signed([0x00, 0x00, 0x01]), 1);
        assert_eq!(raw_to_signed([0x7F, 0xFF, 0xFF]), 8_388_607);
        assert_eq!(raw_to_signed([0x80, 0x00, 0x00]), -8_388_608);
        assert_eq!(raw_to_signed([0xFF, 0xFF, 0xFF]), -1);
    }

    #[test]
    fn test_first_read_initializes_then_converts() {
        let (mut driver, mock) = driver_with(HardwareConfig::default());
        mock.set_conversion(0, 1, [0x12, 0x34, 0x56]);

        let raw = driver.read_channel_raw(AdcBank::Adc0, 1).unwrap();
        assert_eq!(raw, Some([0x12, 0x34, 0x56]));

        let writes = spi_writes(&mock);
        let expected_prefix: Vec<(u8, Vec<u8>)> = vec![
            (0, vec![0x77, 0x00]),
            (0, vec![0x46, 0x22]),
            (0, vec![0x4A, 0x54]),
            (0, vec![0x52, 0x81]),
            (0, vec![0x56, 0x07]),
            (0, vec![0x6A, 0x7C, 0xAB, 0xD8]),
            (0, vec![0x5A, 0x23]),
            (0, vec![0x68]),
            (0, vec![0x57, 0x00]),
            (0, vec![0x43, 0x00, 0x00, 0x00]),
        ];
        assert_eq!(writes, expected_prefix);
    }

    #[test]
    fn test_initialization_once_per_chip_select() {
        let (mut driver, mock) = driver_with(HardwareConfig::default());
        driver.read_channel_raw(AdcBank::Adc0, 0).unwrap();
        driver.read_channel_raw(AdcBank::Adc0, 1).unwrap();
        assert_eq!(mock.open_count("spidev0.0"), 1);

        driver.read_channel_raw(AdcBank::Adc1, 0).unwrap();
        assert_eq!(driver.current_chip_select(), Some(1));
        driver.read_channel_raw(AdcBank::Adc0, 0).unwrap();
        assert_eq!(mock.open_count("spidev0.0"), 2);
        assert_eq!(mock.open_count("spidev0.1"), 1);

        let gain_writes = spi_writes(&mock)
            .into_iter()
            .filter(|(_, bytes)| bytes[0] == command(regs::GAINCAL, Access::Write))
            .count();
        assert_eq!(gain_writes, 3);
    }

    #[test]
    fn test_busy_poll_then_data() {
        let (mut driver, mock) = driver_with(HardwareConfig {
            mcp3564_timeout: 1.0,
            ..Default::default()
        });
        mock.set_busy_polls(3);
        mock.set_conversion(1, 2, [0x00, 0x00, 0x10]);

        let raw = driver.read_channel_raw(AdcBank::Adc1, 2).unwrap();
        assert_eq!(raw, Some([0x00, 0x00, 0x10]));
        let polls = spi_writes(&mock)
            .into_iter()
            .filter(|(_, bytes)| bytes[0] == command(regs::IRQ, Access::Read))
            .count();
        assert_eq!(polls, 4);
    }

    #[test]
    fn test_conversion_timeout_yields_no_data() {
        let (mut driver, mock) = driver_with(HardwareConfig {
            mcp3564_timeout: 0.005,
            ..Default::default()
        });
        mock.set_busy_polls(u32::MAX);

        let result = driver.read_channel_raw(AdcBank::Adc0, 0);
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn test_spi_fault_is_communication_error() {
        let (mut driver, mock) = driver_with(HardwareConfig::default());
        mock.fail(BusKind::Spi, true);
        let result = driver.read_channel_raw(AdcBank::Adc0, 0);
        assert!(matches!(
            result,
            Err(HardwareError::Communication { bus: BusKind::Spi, .. })
        ));
        assert!(!driver.is_open());
    }

    #[test]
    fn test_close_forces_reinitialization() {
        let (mut driver, mock) = driver_with(HardwareConfig::default());
        driver.read_channel_raw(AdcBank::Adc0, 0).unwrap();
        driver.close();
        assert!(!driver.is_open());
        assert_eq!(driver.current_chip_select(), None);
        driver.read_channel_raw(AdcBank::Adc0, 0).unwrap();
        assert_eq!(mock.open_count("spidev0.0"), 2);
    }
}
