//! # stgctl Core
//!
//! Core types and error taxonomy shared by the stgctl crates.

pub mod error;
pub mod types;

pub use error::{CalibrationError, ConnectionError, ControllerError, Error, Result, SignalError};
pub use types::{Axis, Size};
