//! Serial port discovery for the probe microcontroller

use serialport::{SerialPortInfo, SerialPortType};

const PROBE_MARKERS: [&str; 2] = ["Arduino", "USB"];

/// Human-readable description of a port, built from its USB descriptors
pub fn describe(info: &SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => {
            let parts: Vec<&str> = [usb.manufacturer.as_deref(), usb.product.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            if parts.is_empty() {
                "USB Serial".to_string()
            } else {
                parts.join(" ")
            }
        }
        SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::Unknown => info.port_name.clone(),
    }
}

/// First port whose description mentions an Arduino or a USB adapter
pub fn select_probe_port(ports: &[SerialPortInfo]) -> Option<String> {
    ports
        .iter()
        .find(|info| {
            let description = describe(info);
            PROBE_MARKERS.iter().any(|marker| description.contains(marker))
        })
        .map(|info| info.port_name.clone())
}

/// Scan the system for the probe; `None` when enumeration fails or nothing matches
pub fn find_probe_port() -> Option<String> {
    match serialport::available_ports() {
        Ok(ports) => {
            let found = select_probe_port(&ports);
            tracing::debug!(candidates = ports.len(), port = ?found, "Scanned serial ports");
            found
        }
        Err(e) => {
            tracing::warn!("Error scanning serial ports: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    fn usb(name: &str, manufacturer: Option<&str>, product: Option<&str>) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid: 0x2341,
                pid: 0x0043,
                serial_number: None,
                manufacturer: manufacturer.map(str::to_string),
                product: product.map(str::to_string),
            }),
        }
    }

    #[test]
    fn test_selects_arduino() {
        let ports = vec![
            SerialPortInfo {
                port_name: "/dev/ttyS0".to_string(),
                port_type: SerialPortType::Unknown,
            },
            usb("/dev/ttyACM0", Some("Arduino (www.arduino.cc)"), Some("Uno")),
        ];
        assert_eq!(select_probe_port(&ports).as_deref(), Some("/dev/ttyACM0"));
    }

    #[test]
    fn test_bare_usb_adapter_matches() {
        let ports = vec![usb("/dev/ttyUSB0", None, None)];
        assert_eq!(describe(&ports[0]), "USB Serial");
        assert_eq!(select_probe_port(&ports).as_deref(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn test_no_candidates() {
        let ports = vec![
            SerialPortInfo {
                port_name: "/dev/ttyS0".to_string(),
                port_type: SerialPortType::Unknown,
            },
            SerialPortInfo {
                port_name: "/dev/rfcomm0".to_string(),
                port_type: SerialPortType::BluetoothPort,
            },
        ];
        assert_eq!(select_probe_port(&ports), None);
    }
}
