//! Soil probe behind a microcontroller on a serial port
//!
//! The probe must answer a handshake before its data is trusted. The port is
//! rediscovered before every poll so the probe can be unplugged and moved
//! between ports without restarting the node.

use crate::core::{
    unix_timestamp, Reading, PROBE_DATA_REQUEST, PROBE_HANDSHAKE_ACK, PROBE_HANDSHAKE_REQUEST,
};
use crate::hardware::{BusFactory, Driver, HardwareError, HwResult, SerialDriver};
use crate::sensors::{lock, Sensor};
use crate::utils::HardwareConfig;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};

/// Returns the port the probe is currently attached to, if any
pub type PortDetector = Box<dyn Fn() -> Option<String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Verifying,
    Connected,
}

/// Decoded reply to a data request
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeResponse {
    Measurement {
        elapsed_time: i64,
        volumetric_water_content: f64,
        temperature: f64,
        electric_conductivity: f64,
    },
    /// Nothing arrived before the read timeout
    NoResponse,
    /// The device answered with something other than four numeric fields
    Unparseable(String),
}

impl ProbeResponse {
    /// Parse `elapsed_time,vwc,temperature,conductivity`; extra fields are ignored
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ProbeResponse::NoResponse;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 4 {
            return ProbeResponse::Unparseable(line.to_string());
        }

        let measurement = (|| {
            Some(ProbeResponse::Measurement {
                elapsed_time: fields[0].parse().ok()?,
                volumetric_water_content: fields[1].parse().ok()?,
                temperature: fields[2].parse().ok()?,
                electric_conductivity: fields[3].parse().ok()?,
            })
        })();
        measurement.unwrap_or_else(|| ProbeResponse::Unparseable(line.to_string()))
    }
}

struct ProbeLink {
    serial: SerialDriver,
    state: ConnectionState,
    last_port: Option<String>,
}

impl ProbeLink {
    /// Connect to `port` and require the handshake acknowledgment
    fn verify(&mut self, port: &str) -> HwResult<()> {
        self.state = ConnectionState::Verifying;
        let outcome = self.serial.connect(port).and_then(|()| {
            let reply = self.serial.send_command(PROBE_HANDSHAKE_REQUEST)?;
            if reply == PROBE_HANDSHAKE_ACK {
                Ok(())
            } else {
                Err(HardwareError::Handshake {
                    port: port.to_string(),
                    expected: PROBE_HANDSHAKE_ACK.to_string(),
                    received: reply,
                })
            }
        });

        match outcome {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                self.last_port = Some(port.to_string());
                Ok(())
            }
            Err(e) => {
                self.drop_connection();
                Err(e)
            }
        }
    }

    fn drop_connection(&mut self) {
        self.serial.disconnect();
        self.state = ConnectionState::Disconnected;
        self.last_port = None;
    }
}

pub struct ProbeSensor {
    name: String,
    detector: Option<PortDetector>,
    link: Mutex<ProbeLink>,
}

impl ProbeSensor {
    pub fn new(
        name: &str,
        config: Arc<HardwareConfig>,
        factory: Arc<dyn BusFactory>,
        detector: Option<PortDetector>,
    ) -> Self {
        Self {
            name: name.to_string(),
            detector,
            link: Mutex::new(ProbeLink {
                serial: SerialDriver::new(config, factory),
                state: ConnectionState::Disconnected,
                last_port: None,
            }),
        }
    }

    /// Probe on a fixed port
    pub fn with_port(
        name: &str,
        config: Arc<HardwareConfig>,
        factory: Arc<dyn BusFactory>,
        port: &str,
    ) -> Self {
        let port = port.to_string();
        Self::new(name, config, factory, Some(Box::new(move || Some(port.clone()))))
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.link).state
    }

    /// Connect and handshake immediately instead of waiting for the next poll
    pub fn connect(&self, port: &str) -> HwResult<()> {
        let mut link = lock(&self.link);
        link.verify(port)?;
        tracing::info!(sensor = %self.name, "Connected to probe on {}", port);
        Ok(())
    }

    fn ensure_connection(&self, link: &mut ProbeLink) -> HwResult<()> {
        let Some(detector) = &self.detector else {
            return Ok(());
        };

        match detector() {
            Some(port) => {
                if link.last_port.as_deref() != Some(port.as_str()) || !link.serial.is_connected() {
                    link.verify(&port)?;
                    tracing::info!(sensor = %self.name, "Connected to probe on {}", port);
                }
            }
            None => {
                if link.state != ConnectionState::Disconnected {
                    tracing::warn!(sensor = %self.name, "Probe port disappeared");
                }
                link.drop_connection();
            }
        }
        Ok(())
    }

    fn not_connected(&self, timestamp: f64, message: String) -> Reading {
        Reading::warning(&self.name, timestamp, tagged("not_connected"), message)
    }
}

fn tagged(tag: &str) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("status".to_string(), json!(tag));
    data
}

impl Sensor for ProbeSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> Reading {
        let timestamp = unix_timestamp();
        let mut link = lock(&self.link);

        if let Err(e) = self.ensure_connection(&mut link) {
            tracing::warn!(sensor = %self.name, "Connection verification failed: {}", e);
            return self.not_connected(timestamp, e.to_string());
        }
        if !link.serial.is_connected() {
            return self.not_connected(timestamp, "Serial connection not available".to_string());
        }

        let response = match link.serial.send_command(PROBE_DATA_REQUEST) {
            Ok(response) => response,
            Err(e) => {
                // Force a fresh handshake on the next poll
                link.drop_connection();
                return Reading::error(&self.name, timestamp, tagged("error"), e.to_string());
            }
        };

        match ProbeResponse::parse(&response) {
            ProbeResponse::Measurement {
                elapsed_time,
                volumetric_water_content,
                temperature,
                electric_conductivity,
            } => {
                let mut data = Map::new();
                data.insert("elapsed_time".to_string(), json!(elapsed_time));
                data.insert(
                    "volumetric_water_content".to_string(),
                    json!(volumetric_water_content),
                );
                data.insert("temperature".to_string(), json!(temperature));
                data.insert("electric_conductivity".to_string(), json!(electric_conductivity));
                data.insert("status".to_string(), json!("connected"));
                Reading::success(&self.name, timestamp, data)
            }
            ProbeResponse::NoResponse => Reading::warning(
                &self.name,
                timestamp,
                tagged("no_response"),
                "No response from probe",
            ),
            ProbeResponse::Unparseable(raw) => {
                let mut data = Map::new();
                data.insert("raw_response".to_string(), json!(raw));
                data.insert("status".to_string(), json!("parse_error"));
                Reading::warning(&self.name, timestamp, data, "Unparseable probe response")
            }
        }
    }

    fn close(&self) {
        let mut link = lock(&self.link);
        link.serial.close();
        link.state = ConnectionState::Disconnected;
        link.last_port = None;
    }
}
