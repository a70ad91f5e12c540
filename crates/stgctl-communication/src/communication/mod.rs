//! Serial link to the controller
//!
//! Port discovery and the [`SerialPort`] abstraction the drivers talk through.

pub mod serial;

pub use serial::{
    filter_ports, grep_ports, list_ports, resolve_port, select_port, RealSerialPort, SerialPort,
    SerialPortInfo,
};
