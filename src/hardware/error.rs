//! Hardware error types and handling

use thiserror::Error;

/// Raw failure reported by an underlying bus or transport
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Which physical transport a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    I2c,
    Spi,
    Serial,
}

impl std::fmt::Display for BusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusKind::I2c => f.write_str("I2C"),
            BusKind::Spi => f.write_str("SPI"),
            BusKind::Serial => f.write_str("serial"),
        }
    }
}

/// Errors surfaced by drivers and sensors
#[derive(Debug, Error)]
pub enum HardwareError {
    /// A bus transaction failed
    #[error("{bus} communication error: {details}")]
    Communication { bus: BusKind, details: String },

    /// Caller-supplied value outside the device's bounds; no bus traffic was issued
    #[error("{parameter} must be between 0 and {max}, got {value}")]
    Range {
        parameter: &'static str,
        value: i64,
        max: i64,
    },

    /// The serial probe did not identify itself
    #[error("handshake failed on {port}: expected {expected:?}, received {received:?}")]
    Handshake {
        port: String,
        expected: String,
        received: String,
    },

    /// Operation attempted without an open transport
    #[error("serial connection not established")]
    NotConnected,

    /// Invalid configuration value
    #[error("configuration error: invalid {parameter} = {value}")]
    Configuration { parameter: String, value: String },
}

impl HardwareError {
    pub fn communication(bus: BusKind, source: impl std::fmt::Display) -> Self {
        HardwareError::Communication {
            bus,
            details: source.to_string(),
        }
    }

    pub fn configuration(parameter: &str, value: impl std::fmt::Display) -> Self {
        HardwareError::Configuration {
            parameter: parameter.to_string(),
            value: value.to_string(),
        }
    }
}

/// Result type for hardware operations
pub type HwResult<T> = Result<T, HardwareError>;
