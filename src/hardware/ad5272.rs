//! AD5272 digital potentiometer behind a TCA-style I2C channel multiplexer

use crate::core::{
    PotChannel, AD5272_CMD_READ_RDAC, AD5272_CMD_WRITE_RDAC, AD5272_CONTROL_REGISTER,
    AD5272_RDAC_MASK, AD5272_UNLOCK_VALUE,
};
use crate::hardware::{BusFactory, BusKind, Driver, HardwareError, HwResult, I2cBus};
use crate::utils::HardwareConfig;
use std::sync::Arc;

/// Wiper control for the potentiometer currently routed by the multiplexer
pub struct DigitalPotDriver {
    config: Arc<HardwareConfig>,
    factory: Arc<dyn BusFactory>,
    bus: Option<Box<dyn I2cBus>>,
}

impl DigitalPotDriver {
    pub fn new(config: Arc<HardwareConfig>, factory: Arc<dyn BusFactory>) -> Self {
        Self {
            config,
            factory,
            bus: None,
        }
    }

    /// Opens the bus on first use
    fn bus(&mut self) -> HwResult<&mut Box<dyn I2cBus>> {
        let bus = match self.bus.take() {
            Some(bus) => bus,
            None => self
                .factory
                .open_i2c(self.config.i2c_bus)
                .map_err(|e| HardwareError::communication(BusKind::I2c, e))?,
        };
        Ok(self.bus.insert(bus))
    }

    fn write(&mut self, address: u8, bytes: &[u8]) -> HwResult<()> {
        self.bus()?
            .write(address, bytes)
            .map_err(|e| HardwareError::communication(BusKind::I2c, e))
    }

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> HwResult<()> {
        self.bus()?
            .read(address, buffer)
            .map_err(|e| HardwareError::communication(BusKind::I2c, e))
    }

    /// Route the multiplexer to `channel`
    pub fn select_channel(&mut self, channel: PotChannel) -> HwResult<()> {
        let tca = self.config.tca_address;
        self.write(tca, &[channel.mux_mask()])
    }

    pub fn set_wiper_position(&mut self, position: u16) -> HwResult<()> {
        let max = self.config.ad5272_max_steps;
        if position > max {
            return Err(HardwareError::Range {
                parameter: "wiper position",
                value: i64::from(position),
                max: i64::from(max),
            });
        }

        let address = self.config.ad5272_address;
        self.write(address, &[AD5272_CONTROL_REGISTER, AD5272_UNLOCK_VALUE])?;
        self.write(address, &wiper_command(position))
    }

    pub fn read_wiper_position(&mut self) -> HwResult<u16> {
        let address = self.config.ad5272_address;
        self.write(address, &[AD5272_CMD_READ_RDAC << 2, 0])?;

        let mut data = [0u8; 2];
        self.read(address, &mut data)?;
        Ok(u16::from_be_bytes(data) & AD5272_RDAC_MASK)
    }

    /// Nearest wiper position for `resistance`, clamped to the device range
    pub fn resistance_to_position(&self, resistance: f64) -> u16 {
        let max_resistance = self.config.ad5272_max_resistance;
        let clamped = if resistance.is_nan() {
            0.0
        } else {
            resistance.clamp(0.0, max_resistance)
        };
        let steps = f64::from(self.config.ad5272_max_steps);
        (steps * (clamped / max_resistance)).round() as u16
    }

    pub fn position_to_resistance(&self, position: u16) -> f64 {
        f64::from(position) / f64::from(self.config.ad5272_max_steps)
            * self.config.ad5272_max_resistance
    }
}

/// Two-byte RDAC write: command number and top two bits, then the low byte
fn wiper_command(position: u16) -> [u8; 2] {
    [
        (AD5272_CMD_WRITE_RDAC << 2) | ((position >> 8) & 0x03) as u8,
        (position & 0xFF) as u8,
    ]
}

impl Driver for DigitalPotDriver {
    fn close(&mut self) {
        self.bus = None;
    }

    fn is_open(&self) -> bool {
        self.bus.is_some()
    }
}
