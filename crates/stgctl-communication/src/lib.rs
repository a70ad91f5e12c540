//! # stgctl Communication
//!
//! Serial communication and the VMX motor controller protocol.

pub mod communication;
pub mod firmware;

pub use communication::{
    grep_ports, list_ports, resolve_port, RealSerialPort, SerialPort, SerialPortInfo,
};
pub use firmware::vmx::{
    Command, CommandBuffer, CommandFamily, DeviceState, ExecutionMode, Operation, Reply,
    SimulatedPort, SimulatorConfig, SimulatorHandle, StatusQuery, Vmx, VmxConfig,
};
