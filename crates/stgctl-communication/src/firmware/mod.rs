//! Firmware implementations for supported motor controllers
//!
//! Supported controllers:
//! - VMX: ASCII program protocol over RS-232/USB

pub mod vmx;

pub use vmx::{Vmx, VmxConfig};
