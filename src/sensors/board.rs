//! Sensing board: potentiometer bank for load control, two ADC banks for measurement

use crate::core::{unix_timestamp, AdcBank, PotChannel, Reading};
use crate::hardware::{AdcDriver, BusFactory, DigitalPotDriver, Driver, HwResult};
use crate::sensors::{lock, Sensor};
use crate::utils::HardwareConfig;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};

/// Payload label and ADC channel of each measurement on a bank, in payload order
const SUB_CHANNELS: [(&str, u8); 4] = [
    ("voltage 1", 1),
    ("current 1", 0),
    ("voltage 2", 3),
    ("current 2", 2),
];

/// Each driver sits behind its own lock so configuration calls from other
/// threads serialize with the polling loop.
pub struct BoardSensor {
    name: String,
    config: Arc<HardwareConfig>,
    adc: Mutex<AdcDriver>,
    pot: Mutex<DigitalPotDriver>,
}

impl BoardSensor {
    pub fn new(name: &str, config: Arc<HardwareConfig>, factory: Arc<dyn BusFactory>) -> Self {
        Self {
            name: name.to_string(),
            adc: Mutex::new(AdcDriver::new(config.clone(), factory.clone())),
            pot: Mutex::new(DigitalPotDriver::new(config.clone(), factory)),
            config,
        }
    }

    /// Route `channel` and move its wiper to the position nearest `resistance`.
    ///
    /// Returns the position written. Errors propagate to the caller.
    pub fn set_resistance(&self, channel: PotChannel, resistance: f64) -> HwResult<u16> {
        let mut pot = lock(&self.pot);
        let result = pot.select_channel(channel).and_then(|()| {
            let position = pot.resistance_to_position(resistance);
            pot.set_wiper_position(position).map(|()| position)
        });

        match &result {
            Ok(position) => tracing::info!(
                sensor = %self.name,
                "Set channel {} to {}Ω (position {})",
                channel,
                resistance,
                position
            ),
            Err(e) => tracing::error!(sensor = %self.name, "Failed to set resistance: {}", e),
        }
        result
    }

    /// Current wiper position of `channel` and the resistance it corresponds to
    pub fn read_wiper(&self, channel: PotChannel) -> HwResult<(u16, f64)> {
        let mut pot = lock(&self.pot);
        pot.select_channel(channel)?;
        let position = pot.read_wiper_position()?;
        Ok((position, pot.position_to_resistance(position)))
    }

    fn read_bank(&self, adc: &mut AdcDriver, bank: AdcBank) -> HwResult<Map<String, Value>> {
        let mut readings = Map::new();
        for (label, channel) in SUB_CHANNELS {
            // Timed-out conversions are left out of the payload
            let Some(raw) = adc.read_channel_raw(bank, channel)? else {
                continue;
            };
            let voltage = crate::hardware::mcp3564::raw_to_voltage(raw, 1.0, self.config.board_vref);
            let raw_value = u32::from_be_bytes([0, raw[0], raw[1], raw[2]]);
            readings.insert(
                label.to_string(),
                json!({
                    "voltage": voltage,
                    "raw_value": raw_value,
                    "channel_index": channel,
                    "bank": bank.name(),
                }),
            );
        }
        Ok(readings)
    }

    fn read_all(&self) -> HwResult<Map<String, Value>> {
        let mut adc = lock(&self.adc);
        let mut data = Map::new();
        for bank in AdcBank::ALL {
            let readings = self.read_bank(&mut adc, bank)?;
            data.insert(bank.name().to_string(), Value::Object(readings));
        }
        Ok(data)
    }
}

impl Sensor for BoardSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> Reading {
        let timestamp = unix_timestamp();
        match self.read_all() {
            Ok(data) => Reading::success(&self.name, timestamp, data),
            // A driver fault discards the whole poll
            Err(e) => Reading::error(&self.name, timestamp, Map::new(), e.to_string()),
        }
    }

    fn close(&self) {
        lock(&self.adc).close();
        lock(&self.pot).close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ReadingStatus;
    use crate::hardware::mock::MockBus;
    use crate::hardware::{BusKind, HardwareError};

    fn sensor_with(config: HardwareConfig) -> (Arc<BoardSensor>, MockBus) {
        let mock = MockBus::new();
        let sensor = BoardSensor::new("pcb_main", Arc::new(config), Arc::new(mock.clone()));
        (Arc::new(sensor), mock)
    }

    fn sensor() -> (Arc<BoardSensor>, MockBus) {
        sensor_with(HardwareConfig::default())
    }

    #[test]
    fn test_read_payload_shape() {
        let (sensor, mock) = sensor();
        mock.set_conversion(0, 1, [0x40, 0x00, 0x00]);
        mock.set_conversion(1, 2, [0xC0, 0x00, 0x00]);

        let reading = sensor.read();
        assert_eq!(reading.status, ReadingStatus::Success);
        assert_eq!(reading.sensor_name, "pcb_main");

        let banks: Vec<&String> = reading.data.keys().collect();
        assert_eq!(banks, vec!["ADC0", "ADC1"]);

        let adc0 = reading.data["ADC0"].as_object().unwrap();
        let labels: Vec<&String> = adc0.keys().collect();
        assert_eq!(labels, vec!["voltage 1", "current 1", "voltage 2", "current 2"]);

        let v1 = &adc0["voltage 1"];
        assert_eq!(v1["voltage"], json!(2.65));
        assert_eq!(v1["raw_value"], json!(0x40_0000));
        assert_eq!(v1["channel_index"], json!(1));
        assert_eq!(v1["bank"], json!("ADC0"));

        let c2 = &reading.data["ADC1"]["current 2"];
        assert_eq!(c2["voltage"], json!(-2.65));
        assert_eq!(c2["raw_value"], json!(0xC0_0000));
    }

    #[test]
    fn test_timeouts_are_omitted_not_errors() {
        let (sensor, mock) = sensor_with(HardwareConfig {
            mcp3564_timeout: 0.002,
            ..Default::default()
        });
        mock.set_busy_polls(u32::MAX);

        let reading = sensor.read();
        assert_eq!(reading.status, ReadingStatus::Success);
        assert!(reading.data["ADC0"].as_object().unwrap().is_empty());
        assert!(reading.data["ADC1"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_huge_adc_timeout_does_not_panic() {
        let (sensor, mock) = sensor_with(HardwareConfig {
            mcp3564_timeout: 1e30,
            ..Default::default()
        });
        mock.set_conversion(0, 1, [0x40, 0x00, 0x00]);

        let reading = std::panic::catch_unwind(|| sensor.read()).expect("read must not panic");
        assert_eq!(reading.status, ReadingStatus::Success);
        assert_eq!(reading.data["ADC0"]["voltage 1"]["voltage"], json!(2.65));
    }

    #[test]
    fn test_driver_fault_yields_empty_error_reading() {
        let (sensor, mock) = sensor();
        mock.fail(BusKind::Spi, true);

        let reading = sensor.read();
        assert_eq!(reading.status, ReadingStatus::Error);
        assert!(reading.data.is_empty());
        assert!(reading.error_message.unwrap().contains("SPI"));
    }

    #[test]
    fn test_set_resistance_writes_position() {
        let (sensor, mock) = sensor();
        let position = sensor.set_resistance(PotChannel::Ad1, 25_000.0).unwrap();
        assert_eq!(position, 256);
        assert_eq!(mock.wiper(), 256);
        assert_eq!(mock.selected_mux(), Some(0x02));

        let (read_back, resistance) = sensor.read_wiper(PotChannel::Ad1).unwrap();
        assert_eq!(read_back, 256);
        assert!((resistance - 25_024.4).abs() < 1.0);
    }

    #[test]
    fn test_set_resistance_propagates_errors() {
        let (sensor, mock) = sensor();
        mock.fail(BusKind::I2c, true);
        let result = sensor.set_resistance(PotChannel::Ad0, 1_000.0);
        assert!(matches!(result, Err(HardwareError::Communication { .. })));
    }

    #[test]
    fn test_configuration_concurrent_with_reads() {
        let (sensor, mock) = sensor();
        let reader = {
            let sensor = sensor.clone();
            std::thread::spawn(move || {
                for _ in 0..20 {
                    assert!(sensor.read().is_success());
                }
            })
        };
        for step in 0..20u16 {
            sensor
                .set_resistance(PotChannel::Ad0, f64::from(step) * 5_000.0)
                .unwrap();
        }
        reader.join().unwrap();
        assert_eq!(mock.wiper(), sensor.set_resistance(PotChannel::Ad0, 95_000.0).unwrap());
    }

    #[test]
    fn test_close_releases_drivers() {
        let (sensor, mock) = sensor();
        sensor.read();
        sensor.close();
        sensor.close();
        sensor.read();
        assert_eq!(mock.open_count("spidev0.0"), 2);
    }
}
