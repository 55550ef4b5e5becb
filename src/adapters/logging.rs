use crate::adapters::{Adapter, AdapterError};
use crate::core::Reading;

/// Logs every reading: payload at info level, failures at error level
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAdapter;

impl LoggingAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Adapter for LoggingAdapter {
    fn process_reading(&self, reading: &Reading) -> Result<(), AdapterError> {
        if reading.is_success() {
            let payload = serde_json::to_string_pretty(&reading.data)?;
            tracing::info!(sensor = %reading.sensor_name, "{}: {}", reading.sensor_name, payload);
        } else {
            tracing::error!(
                sensor = %reading.sensor_name,
                status = ?reading.status,
                "{} error: {}",
                reading.sensor_name,
                reading.error_message.as_deref().unwrap_or("unknown")
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn test_logs_both_outcomes_without_failing() {
        let adapter = LoggingAdapter::new();
        let ok = Reading::success("pcb", 1.0, Map::new());
        let bad = Reading::error("pcb", 1.0, Map::new(), "bus fault");
        assert!(adapter.process_reading(&ok).is_ok());
        assert!(adapter.process_reading(&bad).is_ok());
    }
}
