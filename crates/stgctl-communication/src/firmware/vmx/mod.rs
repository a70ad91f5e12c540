//! VMX stepping motor controller
//!
//! Command vocabulary, program buffering and the serial driver for the VMX
//! protocol, plus a simulated controller for running without hardware.

pub mod command;
pub mod controller;
pub mod program;
pub mod simulator;

pub use command::{
    Arity, Command, CommandFamily, CommandSpec, ExecutionMode, Operation, StatusQuery,
    COMMAND_TABLE, PROGRAM_COMPLETE, READY_CODE,
};
pub use controller::{parse_position, DeviceState, Reply, Vmx, VmxConfig};
pub use program::CommandBuffer;
pub use simulator::{SimulatedPort, SimulatorConfig, SimulatorHandle};
