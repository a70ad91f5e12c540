//! Error handling for stgctl
//!
//! Provides error types for all layers of the application:
//! - Controller errors (protocol sequencing, readiness, completion timeouts)
//! - Connection errors (serial port discovery and I/O)
//! - Calibration errors (limit switch samples)
//! - Signal errors (remote acquisition trigger)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Controller error type
///
/// Represents errors raised while building, sending or waiting on VMX programs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// Token is not part of the controller vocabulary for its family
    #[error("{token} is not a supported {family} command")]
    UnsupportedCommand {
        /// The rejected token text.
        token: String,
        /// The command family the token was checked against.
        family: String,
    },

    /// Command would break the controller's program ordering rules
    #[error("Invalid command sequence: {reason}")]
    InvalidSequence {
        /// Why the sequence is invalid.
        reason: String,
    },

    /// Controller never reported ready during bring-up
    #[error("Controller not ready after {timeout_ms}ms")]
    DeviceNotReady {
        /// The bring-up timeout in milliseconds.
        timeout_ms: u64,
    },

    /// No completion byte arrived before the deadline
    #[error("Waiting for program to complete timed out after {timeout_ms}ms")]
    CommandTimeout {
        /// The completion timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Reply could not be decoded
    #[error("Invalid controller response to {command}: {response:?}")]
    InvalidResponse {
        /// The status command that was sent.
        command: String,
        /// The raw reply, lossily decoded.
        response: String,
    },
}

/// Connection error type
///
/// Represents errors related to the serial link to the controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// No port matched the configured device pattern
    #[error("Could not find serial port matching '{pattern}'. Please specify the port.")]
    PortNotFound {
        /// The pattern used for discovery.
        pattern: String,
    },

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Session was already closed
    #[error("Controller session is closed")]
    NotConnected,

    /// Serial port error
    #[error("Serial port error: {reason}")]
    SerialError {
        /// The reason for the serial port error.
        reason: String,
    },
}

/// Calibration error type
///
/// Represents failures turning limit switch samples into raster parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    /// Sample does not hold the origin plus four corners
    #[error("Limit switch sample has {found} of 5 positions")]
    IncompleteSample {
        /// How many positions were recorded.
        found: usize,
    },

    /// Every travel delta on an axis was filtered out
    #[error("No usable travel measured on {axis} axis")]
    NoUsableTravel {
        /// The axis without usable travel.
        axis: String,
    },

    /// Neither an explicit step size nor a sample is available
    #[error("Either set raster step size or run startup to record limit switch positions")]
    MissingSample,

    /// Grid size has a non-positive component
    #[error("Grid size must be positive, got {grid_size}")]
    InvalidGridSize {
        /// The offending grid size.
        grid_size: String,
    },
}

/// Signal error type
///
/// Represents failures invoking the remote acquisition trigger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// Signal command could not be started
    #[error("Failed to run signal command '{command}': {reason}")]
    Spawn {
        /// The remote command.
        command: String,
        /// The reason the process did not start.
        reason: String,
    },

    /// Signal command exited unsuccessfully
    #[error("Signal command '{command}' failed with status {status:?}: {stderr}")]
    CommandFailed {
        /// The remote command.
        command: String,
        /// The exit code if the process exited normally.
        status: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },
}

/// Main error type for stgctl
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Calibration error
    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    /// Signal error
    #[error(transparent)]
    Signal(#[from] SignalError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a completion or bring-up timeout
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Controller(ControllerError::CommandTimeout { .. })
                | Error::Controller(ControllerError::DeviceNotReady { .. })
        )
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a controller error
    pub fn is_controller_error(&self) -> bool {
        matches!(self, Error::Controller(_))
    }

    /// Check if this is a sequencing or vocabulary violation
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Error::Controller(ControllerError::UnsupportedCommand { .. })
                | Error::Controller(ControllerError::InvalidSequence { .. })
        )
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
