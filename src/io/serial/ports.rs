// src/io/serial/ports.rs
//
// Port enumeration through serialport::available_ports().

use crate::io::{PortEnumerator, PortId, PortInfo};

/// Enumerator backed by the operating system's serial port list.
pub struct SerialportEnumerator;

impl PortEnumerator for SerialportEnumerator {
    fn list_ports(&self) -> Result<Vec<PortId>, String> {
        Ok(list_port_details()?
            .into_iter()
            .map(|p| PortId::new(p.port_name))
            .collect())
    }
}

/// List available serial ports
///
/// On macOS, filters out /dev/tty.* devices and only shows /dev/cu.* devices.
/// The cu (calling unit) devices are non-blocking and preferred for outgoing connections.
/// The tty (terminal) devices block on open waiting for carrier detect.
pub fn list_port_details() -> Result<Vec<PortInfo>, String> {
    let ports =
        serialport::available_ports().map_err(|e| format!("Failed to enumerate ports: {}", e))?;

    Ok(ports
        .into_iter()
        .filter(|p| is_listed(&p.port_name))
        .map(|p| {
            let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    "USB".to_string(),
                    info.manufacturer,
                    info.product,
                    info.serial_number,
                    Some(info.vid),
                    Some(info.pid),
                ),
                serialport::SerialPortType::BluetoothPort => {
                    ("Bluetooth".to_string(), None, None, None, None, None)
                }
                serialport::SerialPortType::PciPort => {
                    ("PCI".to_string(), None, None, None, None, None)
                }
                serialport::SerialPortType::Unknown => {
                    ("Unknown".to_string(), None, None, None, None, None)
                }
            };
            PortInfo {
                port_name: p.port_name,
                port_type,
                manufacturer,
                product,
                serial_number,
                vid,
                pid,
            }
        })
        .collect())
}

#[cfg(target_os = "macos")]
fn is_listed(port_name: &str) -> bool {
    !port_name.starts_with("/dev/tty.")
}

#[cfg(not(target_os = "macos"))]
fn is_listed(_port_name: &str) -> bool {
    true
}
