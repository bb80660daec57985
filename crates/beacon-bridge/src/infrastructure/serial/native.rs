//! [`SerialBackend`] implementation on top of the `serialport` crate.

use std::time::Duration;

use serialport::{SerialPortInfo, SerialPortType};

use super::{BufferedLineSource, SerialBackend, SerialHandles};
use crate::application::command_link::LinkError;
use crate::domain::messages::PortInfo;

/// Description reported for ports the OS says nothing about.
const UNKNOWN_DESCRIPTION: &str = "Unknown";

/// Real serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeSerialBackend;

impl SerialBackend for NativeSerialBackend {
    fn available_ports(&self) -> Result<Vec<PortInfo>, LinkError> {
        let ports =
            serialport::available_ports().map_err(|e| LinkError::Enumerate(e.to_string()))?;
        Ok(ports.into_iter().map(port_info).collect())
    }

    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<SerialHandles, LinkError> {
        let open_error = |e: serialport::Error| LinkError::Open {
            port: port.to_string(),
            reason: e.to_string(),
        };
        let reader = serialport::new(port, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(open_error)?;
        let writer = reader.try_clone().map_err(open_error)?;
        Ok(SerialHandles {
            reader: Box::new(BufferedLineSource::new(reader)),
            writer: Box::new(writer),
        })
    }
}

fn port_info(info: SerialPortInfo) -> PortInfo {
    PortInfo {
        description: describe(&info.port_type),
        device: info.port_name,
    }
}

/// Builds a human-readable description: manufacturer and product for USB
/// ports, the bus name otherwise.
fn describe(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            let parts: Vec<&str> = [usb.manufacturer.as_deref(), usb.product.as_deref()]
                .into_iter()
                .flatten()
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .collect();
            if parts.is_empty() {
                UNKNOWN_DESCRIPTION.to_string()
            } else {
                parts.join(" ")
            }
        }
        SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::Unknown => UNKNOWN_DESCRIPTION.to_string(),
    }
}
