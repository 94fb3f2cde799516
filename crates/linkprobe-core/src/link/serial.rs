//! Serial port handling
//!
//! Port discovery and the [`Transport`] used against real hardware.

use serde::Serialize;
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::BTreeMap;
#[cfg(target_os = "linux")]
use std::fs;
use tracing::{debug, warn};

use super::{Channel, LinkConfig, ProbeError, SerialChannel, Transport};

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            product: None,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                product: usb.product,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

/// Where a port lands in a listing: CDC-ACM adapters, then USB-serial
/// bridges (each by device number), then anything else by name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum PortOrder {
    Acm(usize),
    UsbSerial(usize),
    Other,
}

impl PortOrder {
    fn of(name: &str) -> Self {
        let device = name.rsplit('/').next().unwrap_or(name);
        let number = |rest: &str| rest.parse().unwrap_or(usize::MAX);
        if let Some(rest) = device.strip_prefix("ttyACM") {
            PortOrder::Acm(number(rest))
        } else if let Some(rest) = device.strip_prefix("ttyUSB") {
            PortOrder::UsbSerial(number(rest))
        } else {
            PortOrder::Other
        }
    }
}

/// Combine enumerated ports with bare device names found elsewhere
///
/// An enumerated entry wins over a bare name for the same device.
fn merge_ports(
    enumerated: impl IntoIterator<Item = PortInfo>,
    bare_names: impl IntoIterator<Item = String>,
) -> Vec<PortInfo> {
    let mut by_order: BTreeMap<(PortOrder, String), PortInfo> = BTreeMap::new();
    let all = enumerated
        .into_iter()
        .chain(bare_names.into_iter().map(PortInfo::bare));
    for port in all {
        by_order
            .entry((PortOrder::of(&port.name), port.name.clone()))
            .or_insert(port);
    }
    by_order.into_values().collect()
}

/// `/dev/ttyACM*` and `/dev/ttyUSB*` nodes, which enumeration misses for
/// some CDC devices
#[cfg(target_os = "linux")]
fn dev_nodes() -> Vec<String> {
    let Ok(entries) = fs::read_dir("/dev") else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with("ttyACM") || name.starts_with("ttyUSB"))
        .map(|name| format!("/dev/{name}"))
        .collect()
}

#[cfg(not(target_os = "linux"))]
fn dev_nodes() -> Vec<String> {
    Vec::new()
}

/// Serial ports on this machine, in listing order
pub fn list_ports() -> Vec<PortInfo> {
    let enumerated = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from);
    merge_ports(enumerated, dev_nodes())
}

/// Opens real serial devices through the `serialport` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialTransport;

impl SerialTransport {
    fn configure(port: &mut dyn SerialPort, config: &LinkConfig) -> serialport::Result<()> {
        port.set_data_bits(config.data_bits)?;
        port.set_parity(config.parity)?;
        port.set_stop_bits(config.stop_bits)?;
        port.set_flow_control(config.flow_control)?;
        Ok(())
    }

    /// Assert DTR/RTS; some adapters refuse, which is not fatal
    fn assert_control_lines(port: &mut dyn SerialPort) {
        if let Err(e) = port.write_data_terminal_ready(true) {
            warn!(port = ?port.name(), "failed to set DTR high: {e}");
        }
        if let Err(e) = port.write_request_to_send(true) {
            warn!(port = ?port.name(), "failed to set RTS high: {e}");
        }
    }
}

impl Transport for SerialTransport {
    fn open(&self, id: &str, config: &LinkConfig) -> Result<Box<dyn Channel>, ProbeError> {
        let mut port = serialport::new(id, config.baud_rate)
            .timeout(config.read_timeout)
            .open()
            .map_err(|e| ProbeError::connection(id, e))?;

        Self::configure(port.as_mut(), config).map_err(|e| ProbeError::connection(id, e))?;
        if config.assert_control_lines {
            Self::assert_control_lines(port.as_mut());
        }

        let mut channel = SerialChannel::new(port);
        channel
            .clear_input()
            .map_err(|e| ProbeError::connection(id, e))?;
        debug!(port = id, baud = config.baud_rate, "opened");
        Ok(Box::new(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(ports: &[PortInfo]) -> Vec<&str> {
        ports.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_port_order() {
        assert_eq!(PortOrder::of("/dev/ttyACM3"), PortOrder::Acm(3));
        assert_eq!(PortOrder::of("ttyUSB12"), PortOrder::UsbSerial(12));
        assert_eq!(PortOrder::of("COM4"), PortOrder::Other);
        assert!(PortOrder::of("/dev/ttyACM9") < PortOrder::of("/dev/ttyUSB0"));
        assert!(PortOrder::of("/dev/ttyUSB9") < PortOrder::of("/dev/ttyS0"));
    }

    #[test]
    fn test_merge_orders_numerically() {
        let bare = ["/dev/ttyUSB10", "/dev/ttyS1", "/dev/ttyACM2", "/dev/ttyUSB2", "COM3"];
        let ports = merge_ports(Vec::new(), bare.iter().map(|s| s.to_string()));
        assert_eq!(
            names(&ports),
            vec!["/dev/ttyACM2", "/dev/ttyUSB2", "/dev/ttyUSB10", "/dev/ttyS1", "COM3"]
        );
    }

    #[test]
    fn test_merge_prefers_enumerated_entry() {
        let usb = PortInfo {
            name: "/dev/ttyUSB0".to_string(),
            vid: Some(0x0403),
            pid: Some(0x6001),
            product: Some("FT232R".to_string()),
        };
        let ports = merge_ports(vec![usb.clone()], vec!["/dev/ttyUSB0".to_string()]);
        assert_eq!(ports, vec![usb]);
    }

    #[test]
    fn test_list_ports_is_sorted() {
        let ports = list_ports();
        let mut sorted = ports.clone();
        sorted.sort_by_key(|p| (PortOrder::of(&p.name), p.name.clone()));
        assert_eq!(ports, sorted);
    }

    #[test]
    fn test_open_missing_device_is_connection_error() {
        let err = SerialTransport
            .open("/dev/linkprobe-does-not-exist", &LinkConfig::default())
            .err()
            .expect("opening a missing device must fail");
        assert!(matches!(err, ProbeError::Connection { .. }));
    }
}
