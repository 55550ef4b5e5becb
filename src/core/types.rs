//! Core data types shared by drivers, sensors and adapters

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// ADC chip-select line on the sensing board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdcBank {
    Adc0,
    Adc1,
}

impl AdcBank {
    pub const ALL: [AdcBank; 2] = [AdcBank::Adc0, AdcBank::Adc1];

    /// Chip-select line driven for this bank
    pub fn chip_select(self) -> u8 {
        match self {
            AdcBank::Adc0 => 0,
            AdcBank::Adc1 => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AdcBank::Adc0 => "ADC0",
            AdcBank::Adc1 => "ADC1",
        }
    }
}

impl fmt::Display for AdcBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Multiplexer channel in front of the digital potentiometers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PotChannel {
    Ad0,
    Ad1,
    Ad2,
    Ad3,
}

impl PotChannel {
    pub const ALL: [PotChannel; 4] = [
        PotChannel::Ad0,
        PotChannel::Ad1,
        PotChannel::Ad2,
        PotChannel::Ad3,
    ];

    pub fn index(self) -> u8 {
        match self {
            PotChannel::Ad0 => 0,
            PotChannel::Ad1 => 1,
            PotChannel::Ad2 => 2,
            PotChannel::Ad3 => 3,
        }
    }

    /// Byte written to the multiplexer control register to route this channel
    pub fn mux_mask(self) -> u8 {
        1 << self.index()
    }

    pub fn name(self) -> &'static str {
        match self {
            PotChannel::Ad0 => "AD0",
            PotChannel::Ad1 => "AD1",
            PotChannel::Ad2 => "AD2",
            PotChannel::Ad3 => "AD3",
        }
    }
}

impl fmt::Display for PotChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome classification of a single poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingStatus {
    Success,
    Warning,
    Error,
}

/// Normalized record produced by every sensor poll.
///
/// Serializes to `{sensor_name, timestamp, data, status, error_message}`,
/// the line format consumed by downstream analysis tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_name: String,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub data: Map<String, Value>,
    pub status: ReadingStatus,
    pub error_message: Option<String>,
}

impl Reading {
    pub fn success(sensor_name: &str, timestamp: f64, data: Map<String, Value>) -> Self {
        Self {
            sensor_name: sensor_name.to_string(),
            timestamp,
            data,
            status: ReadingStatus::Success,
            error_message: None,
        }
    }

    pub fn warning(
        sensor_name: &str,
        timestamp: f64,
        data: Map<String, Value>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sensor_name: sensor_name.to_string(),
            timestamp,
            data,
            status: ReadingStatus::Warning,
            error_message: Some(message.into()),
        }
    }

    /// Error readings always carry a message.
    pub fn error(
        sensor_name: &str,
        timestamp: f64,
        data: Map<String, Value>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sensor_name: sensor_name.to_string(),
            timestamp,
            data,
            status: ReadingStatus::Error,
            error_message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReadingStatus::Success
    }

    /// The `status` tag some sensors place inside the payload
    pub fn tag(&self) -> Option<&str> {
        self.data.get("status").and_then(Value::as_str)
    }
}

/// Current wall-clock time as fractional seconds since the epoch
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_encodings() {
        assert_eq!(AdcBank::Adc0.chip_select(), 0);
        assert_eq!(AdcBank::Adc1.chip_select(), 1);
        let masks: Vec<u8> = PotChannel::ALL.iter().map(|c| c.mux_mask()).collect();
        assert_eq!(masks, vec![0x01, 0x02, 0x04, 0x08]);
    }

    #[test]
    fn test_reading_record_shape() {
        let mut data = Map::new();
        data.insert("b".to_string(), json!(1));
        data.insert("a".to_string(), json!(2));
        let reading = Reading::success("pcb_main", 12.5, data);

        let line = serde_json::to_string(&reading).unwrap();
        assert_eq!(
            line,
            r#"{"sensor_name":"pcb_main","timestamp":12.5,"data":{"b":1,"a":2},"status":"success","error_message":null}"#
        );

        let back: Reading = serde_json::from_str(&line).unwrap();
        assert_eq!(back, reading);
    }

    #[test]
    fn test_error_reading_has_message() {
        let reading = Reading::error("probe", 1.0, Map::new(), "bus fault");
        assert_eq!(reading.status, ReadingStatus::Error);
        assert_eq!(reading.error_message.as_deref(), Some("bus fault"));
        assert!(!reading.is_success());
    }
}
