//! Serial port handling
//!
//! Opens and configures the UART the radar is attached to.

use serde::{Deserialize, Serialize};
use serialport::{SerialPortInfo, SerialPortType};
use std::collections::BTreeMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::time::Duration;
use tracing::debug;

use super::{ByteChannel, RadarError, SerialChannel, DEFAULT_BAUD_RATE};

/// Number of data bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBits {
    /// 5 data bits
    Five,
    /// 6 data bits
    Six,
    /// 7 data bits
    Seven,
    /// 8 data bits
    Eight,
}

/// Number of stop bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    /// 1 stop bit
    One,
    /// 2 stop bits
    Two,
}

/// Parity checking mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    /// No parity bit
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// UART settings for the radar link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Serial port name (e.g. "/dev/ttyUSB0" or "COM3")
    pub name: String,
    /// Line speed, 115200 on stock firmware
    pub baud_rate: u32,
    /// Data bits per character
    pub data_bits: DataBits,
    /// Stop bits per character
    pub stop_bits: StopBits,
    /// Parity mode
    pub parity: Parity,
    /// How long a read waits for the first byte before reporting a timeout
    pub read_timeout_ms: u64,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            read_timeout_ms: 100,
        }
    }
}

/// Information about an available serial port
#[derive(Debug, Clone)]
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

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                (Some(usb_info.vid), Some(usb_info.pid), usb_info.product)
            }
            _ => (None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            product,
        }
    }
}

/// Device name prefixes of USB serial bridges, in listing order.
///
/// Radar boards ship with a USB-UART bridge (`ttyUSB*`); CDC-ACM adapters
/// (`ttyACM*`) come next.
const USB_TTY_PREFIXES: [&str; 2] = ["ttyUSB", "ttyACM"];

/// Position of a port in [`list_ports`] output
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct PortRank {
    /// Index into [`USB_TTY_PREFIXES`], or its length for other ports
    class: usize,
    /// Numeric device suffix, so `ttyUSB10` follows `ttyUSB2`
    index: u32,
    path: String,
}

impl PortRank {
    fn of(path: &str) -> Self {
        let device = path.rsplit('/').next().unwrap_or(path);
        let (class, index) = USB_TTY_PREFIXES
            .iter()
            .enumerate()
            .find_map(|(class, prefix)| {
                let suffix = device.strip_prefix(prefix)?;
                Some((class, suffix.parse().unwrap_or(u32::MAX)))
            })
            .unwrap_or((USB_TTY_PREFIXES.len(), 0));

        Self {
            class,
            index,
            path: path.to_string(),
        }
    }
}

/// Device nodes of USB serial bridges that enumeration may have missed
#[cfg(target_os = "linux")]
fn usb_tty_nodes() -> Vec<String> {
    let Ok(entries) = fs::read_dir("/dev") else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| USB_TTY_PREFIXES.iter().any(|p| name.starts_with(p)))
        .map(|name| format!("/dev/{}", name))
        .collect()
}

#[cfg(not(target_os = "linux"))]
fn usb_tty_nodes() -> Vec<String> {
    Vec::new()
}

/// Serial ports the radar may be attached to.
///
/// USB bridges come first so the likeliest radar port heads the list. Each
/// port appears once; enumerated entries keep their USB details.
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: BTreeMap<PortRank, PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from)
        .map(|port| (PortRank::of(&port.name), port))
        .collect();

    for path in usb_tty_nodes() {
        ports
            .entry(PortRank::of(&path))
            .or_insert_with(|| PortInfo {
                name: path,
                vid: None,
                pid: None,
                product: None,
            });
    }

    debug!("list_ports: {} candidates", ports.len());
    ports.into_values().collect()
}

/// Open and configure the serial port described by `config`
pub fn open_port(config: &PortConfig) -> Result<SerialChannel, RadarError> {
    if config.name.is_empty() {
        return Err(RadarError::Config("no serial port name given".to_string()));
    }

    debug!(
        "open_port: {} at {} baud ({:?}/{:?}/{:?})",
        config.name, config.baud_rate, config.data_bits, config.parity, config.stop_bits
    );

    let port = serialport::new(&config.name, config.baud_rate)
        .data_bits(config.data_bits.into())
        .stop_bits(config.stop_bits.into())
        .parity(config.parity.into())
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_millis(config.read_timeout_ms))
        .open()
        .map_err(|e| RadarError::Serial(format!("{}: {}", config.name, e)))?;

    // Drop whatever the radar streamed before we were listening
    let mut channel = SerialChannel::new(port);
    channel
        .clear_input()
        .map_err(|e| RadarError::Serial(e.to_string()))?;
    Ok(channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_config() {
        let config = PortConfig::default();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.parity, Parity::None);
    }

    #[test]
    fn test_open_without_name_fails() {
        let err = open_port(&PortConfig::default()).unwrap_err();
        assert!(matches!(err, RadarError::Config(_)));
    }

    #[test]
    fn test_usb_bridges_listed_first() {
        let mut paths = vec![
            "/dev/ttyACM1",
            "/dev/ttyS0",
            "/dev/ttyUSB10",
            "/dev/ttyACM0",
            "COM3",
            "/dev/ttyUSB2",
        ];
        paths.sort_by_key(|p| PortRank::of(p));

        assert_eq!(
            paths,
            vec![
                "/dev/ttyUSB2",
                "/dev/ttyUSB10",
                "/dev/ttyACM0",
                "/dev/ttyACM1",
                "/dev/ttyS0",
                "COM3",
            ]
        );
    }

    #[test]
    fn test_odd_suffix_sorts_after_numbered_nodes() {
        assert!(PortRank::of("/dev/ttyUSB3") < PortRank::of("/dev/ttyUSB_radar"));
        assert!(PortRank::of("/dev/ttyUSB_radar") < PortRank::of("/dev/ttyACM0"));
    }

    #[test]
    fn test_port_config_json() {
        let config: PortConfig =
            serde_json::from_str(r#"{"name": "COM3", "parity": "Even"}"#).unwrap();
        assert_eq!(config.name, "COM3");
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
    }
}
