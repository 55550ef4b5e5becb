use crate::adapters::{Adapter, AdapterError};
use crate::core::Reading;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

/// Writes one JSON record per reading, newline-terminated.
///
/// Records have the shape `{sensor_name, timestamp, data, status, error_message}`.
pub struct JsonLinesAdapter<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesAdapter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> Adapter for JsonLinesAdapter<W> {
    fn process_reading(&self, reading: &Reading) -> Result<(), AdapterError> {
        let mut line = serde_json::to_vec(reading)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};

    #[test]
    fn test_one_record_per_line() {
        let adapter = JsonLinesAdapter::new(Vec::new());
        let mut data = Map::new();
        data.insert("temperature".to_string(), json!(21.5));
        adapter.process_reading(&Reading::success("probe", 10.0, data)).unwrap();
        adapter
            .process_reading(&Reading::error("pcb", 11.0, Map::new(), "SPI fault"))
            .unwrap();

        let output = String::from_utf8(adapter.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(
            first,
            json!({
                "sensor_name": "probe",
                "timestamp": 10.0,
                "data": {"temperature": 21.5},
                "status": "success",
                "error_message": null,
            })
        );
        let second: Reading = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.error_message.as_deref(), Some("SPI fault"));
    }
}
