//! # stgctl
//!
//! Drives a pair of motorised stages through a VMX stepping motor controller:
//! - VMX protocol driver over a serial link (or a built-in simulator)
//! - Homing and limit switch calibration
//! - Back-and-forth raster scans with a remote acquisition trigger
//! - Point to point moves and a trigger wiring test
//!
//! ## Architecture
//!
//! 1. **stgctl-core** - Axis and size types, error taxonomy
//! 2. **stgctl-communication** - Serial ports, VMX vocabulary, driver, simulator
//! 3. **stgctl-settings** - Configuration files and environment overrides
//! 4. **stgctl-stage** - XY stage orchestration
//! 5. **stgctl** - Command line binary that ties the crates together

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

pub use stgctl_communication::{
    list_ports, resolve_port, Command, Operation, RealSerialPort, SerialPort, SerialPortInfo,
    SimulatedPort, SimulatorConfig, SimulatorHandle, StatusQuery, Vmx, VmxConfig,
};
pub use stgctl_core::{
    Axis, CalibrationError, ConnectionError, ControllerError, Error, Result, SignalError, Size,
};
pub use stgctl_settings::{
    Config, DeviceSettings, LoggingSettings, MotionSettings, RasterSettings, SignalSettings,
};
pub use stgctl_stage::{
    calibrate, Calibration, DryRunSignaller, LimitSwitchSample, MoveOutcome, Signaller,
    SshSignaller, Trajectory, XyStage,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the log file for a session started now
pub fn log_file_name() -> String {
    format!(
        "stgctl_{}.log",
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    )
}

/// Initialize logging
///
/// Sets up structured logging with:
/// - Console output
/// - A plain text copy in a timestamped file under the configured directory
/// - RUST_LOG environment variable support, falling back to the configured level
///
/// Returns the path of the log file.
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))?;

    std::fs::create_dir_all(&settings.directory)?;
    let log_path = settings.directory.join(log_file_name());
    let file = std::fs::File::create(&log_path)?;

    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_level(true);

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(log_path)
}

/// Driver timing from device settings
pub fn vmx_config(settings: &DeviceSettings) -> VmxConfig {
    VmxConfig {
        response_delay: Duration::from_millis(settings.response_delay_ms),
        settle_delay: Duration::from_millis(settings.settle_delay_ms),
        ready_poll_interval: Duration::from_millis(settings.ready_poll_ms),
        ready_timeout: Duration::from_millis(settings.ready_timeout_ms),
    }
}

/// Build a stage on a simulated controller that only logs trigger signals
pub fn simulated_stage(config: &Config) -> Result<(XyStage, SimulatorHandle)> {
    tracing::info!("Using simulated VMX controller");
    let (sim, handle) = SimulatedPort::new(SimulatorConfig::default());
    let vmx = Vmx::connect(Box::new(sim), VmxConfig::instant())?;
    Ok((XyStage::new(vmx, Box::new(DryRunSignaller), config), handle))
}

/// Connect to the controller and build the stage
///
/// With `simulate`, a [`SimulatedPort`] stands in for the controller and
/// trigger signals are only logged. Otherwise `port` (or the configured
/// port, or discovery) selects the serial device and signals go over ssh.
pub fn open_stage(config: &Config, port: Option<&str>, simulate: bool) -> Result<XyStage> {
    if simulate {
        return simulated_stage(config).map(|(stage, _handle)| stage);
    }

    let pattern = config.device.pattern()?;
    let explicit = port.or_else(|| config.device.explicit_port());
    let port_name = resolve_port(explicit, &pattern)?;
    tracing::info!("Connecting to VMX on {}", port_name);

    let serial = RealSerialPort::open(&port_name, config.device.baud_rate)?;
    let vmx = Vmx::connect(Box::new(serial), vmx_config(&config.device))?;
    let signaller = SshSignaller::new(&config.signal);
    Ok(XyStage::new(vmx, Box::new(signaller), config))
}

/// Establish the origin and raster parameters before a raster
///
/// A saved limit switch file stands in for the homing traversal. Without
/// one, a configured step size still needs homing for the origin, and
/// otherwise the full startup traversal is run to calibrate.
pub fn prepare_raster(stage: &mut XyStage, limit_switch_file: Option<&Path>) -> Result<()> {
    if let Some(path) = limit_switch_file {
        return stage.load_limit_switch_positions(path);
    }

    if stage.raster_settings().step_size.is_some() {
        if stage.home()? == MoveOutcome::TimedOut {
            return Err(Error::other(
                "Homing did not complete; refusing to raster from an unknown origin",
            ));
        }
        return Ok(());
    }

    let sample = stage.startup(false)?;
    sample.ensure_complete()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vmx_config_from_settings() {
        let settings = DeviceSettings {
            response_delay_ms: 50,
            settle_delay_ms: 250,
            ready_poll_ms: 10,
            ready_timeout_ms: 2000,
            ..DeviceSettings::default()
        };
        let config = vmx_config(&settings);
        assert_eq!(config.response_delay, Duration::from_millis(50));
        assert_eq!(config.settle_delay, Duration::from_millis(250));
        assert_eq!(config.ready_poll_interval, Duration::from_millis(10));
        assert_eq!(config.ready_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_default_timing_matches_driver_default() {
        assert_eq!(vmx_config(&DeviceSettings::default()), VmxConfig::default());
    }

    #[test]
    fn test_log_file_name() {
        let name = log_file_name();
        assert!(name.starts_with("stgctl_"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "stgctl_2024-01-01_00-00-00.log".len());
    }
}
