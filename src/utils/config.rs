use crate::hardware::{HardwareError, HwResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for every configured timeout or delay (seconds)
pub const MAX_TIMEOUT_SECS: f64 = 3600.0;

/// Bus addresses, timing and calibration constants shared by every driver.
///
/// Built once at startup and shared read-only (`Arc<HardwareConfig>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// I2C bus index (`/dev/i2c-N`)
    pub i2c_bus: u8,
    /// Channel multiplexer address
    pub tca_address: u8,
    /// Digital potentiometer address behind the multiplexer
    pub ad5272_address: u8,

    /// SPI bus index (`/dev/spidevN.CS`)
    pub spi_bus: u8,
    /// SPI clock (Hz)
    pub spi_max_speed: u32,

    /// End-to-end resistance of the potentiometer (ohms)
    pub ad5272_max_resistance: f64,
    /// Highest wiper position
    pub ad5272_max_steps: u16,

    /// ADC reference voltage (V)
    pub mcp3564_vref: f64,
    /// Conversion poll timeout (seconds)
    pub mcp3564_timeout: f64,
    /// Reference voltage of the board's measurement front end (V)
    pub board_vref: f64,

    pub serial_baudrate: u32,
    /// Per-read serial timeout (seconds)
    pub serial_timeout: f64,
    /// Delay after opening a serial port before flushing it (seconds)
    pub serial_settle: f64,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            tca_address: 0x70,
            ad5272_address: 0x2C,
            spi_bus: 0,
            spi_max_speed: 1_000_000,
            ad5272_max_resistance: 100_000.0,
            ad5272_max_steps: 1023,
            mcp3564_vref: 3.32,
            mcp3564_timeout: 0.01,
            board_vref: 5.3,
            serial_baudrate: 9600,
            serial_timeout: 1.0,
            serial_settle: 2.0,
        }
    }
}

impl HardwareConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> HwResult<Self> {
        let config: HardwareConfig = serde_json::from_str(json)
            .map_err(|e| HardwareError::configuration("json", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> HwResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| HardwareError::configuration("json", e))
    }

    pub fn validate(&self) -> HwResult<()> {
        if self.ad5272_max_steps == 0 {
            return Err(HardwareError::configuration("ad5272_max_steps", self.ad5272_max_steps));
        }

        let positive = [
            ("ad5272_max_resistance", self.ad5272_max_resistance),
            ("mcp3564_vref", self.mcp3564_vref),
            ("board_vref", self.board_vref),
        ];
        for (parameter, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(HardwareError::configuration(parameter, value));
            }
        }

        let durations = [
            ("mcp3564_timeout", self.mcp3564_timeout),
            ("serial_timeout", self.serial_timeout),
            ("serial_settle", self.serial_settle),
        ];
        for (parameter, value) in durations {
            if !(0.0..=MAX_TIMEOUT_SECS).contains(&value) {
                return Err(HardwareError::configuration(parameter, value));
            }
        }

        if self.serial_baudrate == 0 {
            return Err(HardwareError::configuration("serial_baudrate", 0));
        }
        if self.spi_max_speed == 0 {
            return Err(HardwareError::configuration("spi_max_speed", 0));
        }
        if self.tca_address > 0x7F || self.ad5272_address > 0x7F {
            return Err(HardwareError::configuration(
                "i2c address",
                format!("0x{:02X}/0x{:02X} (must be <= 0x7F)", self.tca_address, self.ad5272_address),
            ));
        }

        Ok(())
    }

    pub fn adc_timeout(&self) -> Duration {
        seconds(self.mcp3564_timeout)
    }

    pub fn serial_timeout(&self) -> Duration {
        seconds(self.serial_timeout)
    }

    pub fn serial_settle(&self) -> Duration {
        seconds(self.serial_settle)
    }
}

/// Clamped into `0..=MAX_TIMEOUT_SECS`; NaN becomes zero
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.clamp(0.0, MAX_TIMEOUT_SECS)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HardwareConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.adc_timeout(), Duration::from_millis(10));
        assert_eq!(config.serial_settle(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = HardwareConfig::from_json(r#"{"serial_baudrate": 115200, "board_vref": 5.0}"#)
            .unwrap();
        assert_eq!(config.serial_baudrate, 115200);
        assert_eq!(config.board_vref, 5.0);
        assert_eq!(config.ad5272_max_steps, 1023);
    }

    #[test]
    fn test_json_round_trip() {
        let config = HardwareConfig {
            spi_bus: 1,
            ..Default::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(HardwareConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = HardwareConfig::default();
        config.ad5272_max_steps = 0;
        assert!(matches!(config.validate(), Err(HardwareError::Configuration { .. })));

        let mut config = HardwareConfig::default();
        config.mcp3564_timeout = -1.0;
        assert!(config.validate().is_err());

        let mut config = HardwareConfig::default();
        config.ad5272_address = 0xFF;
        assert!(config.validate().is_err());

        assert!(HardwareConfig::from_json("{not json").is_err());
    }

    #[test]
    fn test_oversized_timeouts_rejected_and_clamped() {
        assert!(HardwareConfig::from_json(r#"{"mcp3564_timeout": 1e30}"#).is_err());
        assert!(HardwareConfig::from_json(r#"{"serial_settle": 3600.5}"#).is_err());
        assert!(HardwareConfig::from_json(r#"{"serial_timeout": 3600.0}"#).is_ok());

        // Accessors never panic, even on a config that skipped validation
        let config = HardwareConfig {
            mcp3564_timeout: 1e30,
            serial_timeout: f64::NAN,
            serial_settle: f64::INFINITY,
            ..Default::default()
        };
        assert_eq!(config.adc_timeout(), Duration::from_secs(3600));
        assert_eq!(config.serial_timeout(), Duration::ZERO);
        assert_eq!(config.serial_settle(), Duration::from_secs(3600));
    }
}
