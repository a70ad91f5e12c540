//! Serial port communication implementation
//!
//! Provides low-level serial port operations for direct hardware connection
//! to the motor controller via USB or RS-232.
//!
//! Supports:
//! - Port enumeration and discovery by pattern
//! - Opening a port with a short read timeout
//! - Flushing stale input
//! - Blocking read/write operations

use regex::Regex;
use serialport::SerialPort as _;
use std::io::{self, Read, Write};
use std::time::Duration;
use stgctl_core::{ConnectionError, Error, Result};

/// Read timeout used for opened ports so polling loops stay responsive
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB-to-Serial Comm Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Serial number if available
    pub serial_number: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set serial number
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }

    /// Hardware id in `VID:PID` form, if known
    pub fn hwid(&self) -> Option<String> {
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => Some(format!("{:04X}:{:04X}", vid, pid)),
            _ => None,
        }
    }

    /// Check the port name, description, manufacturer, serial number and hwid against a pattern
    pub fn matches(&self, pattern: &Regex) -> bool {
        pattern.is_match(&self.port_name)
            || pattern.is_match(&self.description)
            || self
                .manufacturer
                .as_deref()
                .is_some_and(|m| pattern.is_match(m))
            || self
                .serial_number
                .as_deref()
                .is_some_and(|s| pattern.is_match(s))
            || self.hwid().is_some_and(|h| pattern.is_match(&h))
    }
}

/// List available serial ports on the system
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    match serialport::available_ports() {
        Ok(ports) => Ok(ports
            .iter()
            .map(|port| {
                let info = SerialPortInfo::new(&port.port_name, get_port_description(port));

                match &port.port_type {
                    serialport::SerialPortType::UsbPort(usb_info) => {
                        let mut info = info.with_usb_ids(usb_info.vid, usb_info.pid);
                        if let Some(ref mfg) = usb_info.manufacturer {
                            info = info.with_manufacturer(mfg);
                        }
                        if let Some(ref serial) = usb_info.serial_number {
                            info = info.with_serial_number(serial);
                        }
                        info
                    }
                    _ => info,
                }
            })
            .collect()),
        Err(e) => {
            tracing::error!("Failed to enumerate serial ports: {}", e);
            Err(ConnectionError::SerialError {
                reason: format!("Failed to enumerate ports: {}", e),
            }
            .into())
        }
    }
}

/// Filter a port listing by pattern
pub fn filter_ports(ports: Vec<SerialPortInfo>, pattern: &Regex) -> Vec<SerialPortInfo> {
    ports.into_iter().filter(|p| p.matches(pattern)).collect()
}

/// Search attached devices for serial ports matching a pattern
pub fn grep_ports(pattern: &Regex) -> Result<Vec<SerialPortInfo>> {
    tracing::debug!("Using port pattern {}", pattern);
    let matched = filter_ports(list_ports()?, pattern);
    tracing::debug!("Matched serial ports: {:?}", matched);
    Ok(matched)
}

/// Pick the port to open
///
/// An explicit port always wins. Otherwise the first port matching `pattern`
/// in `available` is chosen, with a warning when several match.
pub fn select_port(
    explicit: Option<&str>,
    pattern: &Regex,
    available: Vec<SerialPortInfo>,
) -> Result<String> {
    if let Some(port) = explicit.filter(|p| !p.is_empty()) {
        return Ok(port.to_string());
    }

    let matched = filter_ports(available, pattern);
    match matched.as_slice() {
        [] => Err(ConnectionError::PortNotFound {
            pattern: pattern.to_string(),
        }
        .into()),
        [only] => Ok(only.port_name.clone()),
        [first, ..] => {
            tracing::warn!(
                "Multiple serial ports matched '{}', selecting {}",
                pattern,
                first.port_name
            );
            Ok(first.port_name.clone())
        }
    }
}

/// Resolve the port from an explicit name or by scanning attached devices
pub fn resolve_port(explicit: Option<&str>, pattern: &Regex) -> Result<String> {
    let available = match explicit.filter(|p| !p.is_empty()) {
        Some(_) => Vec::new(),
        None => list_ports()?,
    };
    let port = select_port(explicit, pattern, available)?;
    tracing::debug!("Using serial port '{}'", port);
    Ok(port)
}

/// Get a user-friendly description for a port
fn get_port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => usb_info
            .product
            .clone()
            .unwrap_or_else(|| {
                format!(
                    "USB {} Serial Port",
                    usb_info.manufacturer.as_deref().unwrap_or("Device")
                )
            }),
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Low-level serial port interface
///
/// Reads never block longer than the port's read timeout. A read that times
/// out reports `Ok(0)` or an error of kind `TimedOut`/`WouldBlock`.
pub trait SerialPort: Send {
    /// Write data to the port
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Read data from the port
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Discard any bytes received but not yet read
    fn clear_input(&mut self) -> io::Result<()>;

    /// Get the port name
    fn name(&self) -> String;

    /// Close the port
    fn close(&mut self) -> io::Result<()>;
}

/// Real serial port implementation using serialport crate
pub struct RealSerialPort {
    name: String,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl RealSerialPort {
    /// Open a serial port at the given baud rate
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self> {
        let builder = serialport::new(port_name, baud_rate)
            .timeout(READ_TIMEOUT)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None);

        match builder.open() {
            Ok(port) => Ok(RealSerialPort {
                name: port_name.to_string(),
                port: Some(port),
            }),
            Err(e) => {
                tracing::warn!("Failed to open serial port {}: {}", port_name, e);
                Err(Error::from(ConnectionError::FailedToOpen {
                    port: port_name.to_string(),
                    reason: e.to_string(),
                }))
            }
        }
    }

    fn port_mut(&mut self) -> io::Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port is closed"))
    }
}

impl SerialPort for RealSerialPort {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let port = self.port_mut()?;
        port.write_all(data)?;
        port.flush()?;
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port_mut()?.read(buf)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port_mut()?
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::from)
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn close(&mut self) -> io::Result<()> {
        // Dropping the handle releases the OS port
        self.port.take();
        Ok(())
    }
}
