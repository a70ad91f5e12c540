//! Configuration management for stgctl
//!
//! Provides configuration file handling, environment overrides and validation.
//! Supports JSON and TOML file formats.
//!
//! Configuration is organized into logical sections:
//! - Device settings (port, discovery pattern, serial timing)
//! - Raster settings (grid, step size, observe time, limit switch file)
//! - Motion settings (speeds and completion timeouts)
//! - Signal settings (acquisition trigger host and commands)
//! - Logging settings (level and log directory)

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use stgctl_core::{Error, Result, Size};

/// Prefix of every recognized environment variable
pub const ENV_PREFIX: &str = "STGCTL_";

/// Controller connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Explicit serial port; discovery is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Regex matched against attached ports during discovery
    pub device_pattern: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Wait before reading an immediate command's reply
    pub response_delay_ms: u64,
    /// Wait after reset during bring-up
    pub settle_delay_ms: u64,
    /// Interval between ready checks during bring-up
    pub ready_poll_ms: u64,
    /// Bring-up timeout
    pub ready_timeout_ms: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            port: None,
            device_pattern: "USB-to-Serial".to_string(),
            baud_rate: 9600,
            response_delay_ms: 100,
            settle_delay_ms: 1000,
            ready_poll_ms: 100,
            ready_timeout_ms: 5000,
        }
    }
}

impl DeviceSettings {
    /// Compiled discovery pattern
    pub fn pattern(&self) -> Result<Regex> {
        Regex::new(&self.device_pattern).map_err(|e| {
            Error::other(format!(
                "Invalid device pattern '{}': {}",
                self.device_pattern, e
            ))
        })
    }

    /// Explicit port, ignoring an empty string
    pub fn explicit_port(&self) -> Option<&str> {
        self.port.as_deref().filter(|p| !p.is_empty())
    }
}

/// Raster scan settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterSettings {
    /// Number of points along X and Y
    pub grid_size: Size,
    /// Distance between points; calibrated from the limit switches when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_size: Option<Size>,
    /// Seconds to hold still at each point
    pub observe_time_s: f64,
    /// Traverse speed in steps per second
    pub speed: u32,
    /// Where limit switch positions are saved
    pub limit_switch_file: PathBuf,
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self {
            grid_size: Size::new(60, 60),
            step_size: None,
            observe_time_s: 15.0,
            speed: 1500,
            limit_switch_file: PathBuf::from("limit_switch_positions.json"),
        }
    }
}

impl RasterSettings {
    /// Observe time as a duration
    pub fn observe_time(&self) -> Duration {
        seconds(self.observe_time_s)
    }
}

/// Motion speeds and completion timeouts
///
/// Timeouts are in seconds and may be fractional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    /// Speed used while homing
    pub home_speed: u32,
    /// Default speed for goto
    pub goto_speed: u32,
    /// Speed used by the signal test
    pub test_speed: u32,
    /// Relative move made by the signal test
    pub test_offset: i64,
    /// Homing timeout
    pub home_timeout_s: f64,
    /// Timeout for each corner of the limit switch traversal
    pub corner_timeout_s: f64,
    /// Timeout for each raster point
    pub point_timeout_s: f64,
    /// Goto timeout
    pub goto_timeout_s: f64,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            home_speed: 2000,
            goto_speed: 1500,
            test_speed: 1500,
            test_offset: -5000,
            home_timeout_s: 600.0,
            corner_timeout_s: 600.0,
            point_timeout_s: 600.0,
            goto_timeout_s: 600.0,
        }
    }
}

impl MotionSettings {
    /// Homing timeout
    pub fn home_timeout(&self) -> Duration {
        seconds(self.home_timeout_s)
    }

    /// Per-corner timeout
    pub fn corner_timeout(&self) -> Duration {
        seconds(self.corner_timeout_s)
    }

    /// Per-point timeout
    pub fn point_timeout(&self) -> Duration {
        seconds(self.point_timeout_s)
    }

    /// Goto timeout
    pub fn goto_timeout(&self) -> Duration {
        seconds(self.goto_timeout_s)
    }
}

/// Remote acquisition trigger settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalSettings {
    /// Host the trigger commands run on
    pub host: String,
    /// Login user; the ssh default is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Command that starts acquisition
    pub start_command: String,
    /// Command that stops acquisition
    pub stop_command: String,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            user: None,
            start_command: "hostname".to_string(),
            stop_command: "hostname".to_string(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter level; `RUST_LOG` takes precedence
    pub level: String,
    /// Directory for timestamped log files
    pub directory: PathBuf,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
            directory: PathBuf::from("logs"),
        }
    }
}

/// Complete application configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Device settings
    pub device: DeviceSettings,
    /// Raster settings
    pub raster: RasterSettings,
    /// Motion settings
    pub motion: MotionSettings,
    /// Signal settings
    pub signal: SignalSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform config file location (`<config dir>/stgctl/config.toml`)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        path.push("stgctl");
        path.push("config.toml");
        path
    }

    /// Resolve the effective configuration
    ///
    /// Reads `path` when given, else the default path if it exists, else
    /// starts from defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::load_from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::other(format!("Failed to read config file: {}", e)))?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .map_err(|e| Error::other(format!("Invalid JSON config: {}", e)))?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content)
                .map_err(|e| Error::other(format!("Invalid TOML config: {}", e)))?
        } else {
            return Err(Error::other("Config file must be .json or .toml"));
        };

        config.validate()?;
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;

        let content = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::to_string_pretty(self)
                .map_err(|e| Error::other(format!("Failed to serialize config: {}", e)))?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::to_string_pretty(self)
                .map_err(|e| Error::other(format!("Failed to serialize config: {}", e)))?
        } else {
            return Err(Error::other("Config file must be .json or .toml"));
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .map_err(|e| Error::other(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Apply `STGCTL_*` variables from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply `STGCTL_*` overrides from an arbitrary lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{}{}", ENV_PREFIX, suffix));

        if let Some(port) = var("VMX_DEVICE_PORT") {
            self.device.port = Some(port).filter(|p| !p.is_empty());
        }
        if let Some(pattern) = var("VMX_DEVICE_REGEX") {
            self.device.device_pattern = pattern;
        }
        if let Some(grid) = var("GRID_SIZE") {
            self.raster.grid_size = parse_size("STGCTL_GRID_SIZE", &grid)?;
        }
        if let Some(step) = var("STEP_SIZE") {
            self.raster.step_size = if step.trim().is_empty() {
                None
            } else {
                Some(parse_size("STGCTL_STEP_SIZE", &step)?)
            };
        }
        if let Some(observe) = var("OBSERVE_TIME") {
            self.raster.observe_time_s = observe.trim().parse().map_err(|_| {
                Error::other(format!("Invalid STGCTL_OBSERVE_TIME '{}'", observe))
            })?;
        }
        if let Some(host) = var("SIGNAL_HOST") {
            self.signal.host = host;
        }
        if let Some(user) = var("SIGNAL_USER") {
            self.signal.user = Some(user).filter(|u| !u.is_empty());
        }
        if let Some(cmd) = var("START_AQ_CMD") {
            self.signal.start_command = cmd;
        }
        if let Some(cmd) = var("END_AQ_CMD") {
            self.signal.stop_command = cmd;
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        // Validate device settings
        self.device.pattern()?;

        if self.device.baud_rate == 0 {
            return Err(Error::other("Baud rate must be > 0"));
        }

        if self.device.ready_timeout_ms == 0 {
            return Err(Error::other("Ready timeout must be > 0"));
        }

        // Validate raster settings
        if self.raster.grid_size.x <= 0 || self.raster.grid_size.y <= 0 {
            return Err(Error::other(format!(
                "Grid size must be positive, got {}",
                self.raster.grid_size
            )));
        }

        if let Some(step) = self.raster.step_size {
            if step.x <= 0 || step.y <= 0 {
                return Err(Error::other(format!(
                    "Step size must be positive, got {}",
                    step
                )));
            }
        }

        if !self.raster.observe_time_s.is_finite() || self.raster.observe_time_s < 0.0 {
            return Err(Error::other("Observe time must be >= 0"));
        }

        // Validate motion settings
        if self.raster.speed == 0
            || self.motion.home_speed == 0
            || self.motion.goto_speed == 0
            || self.motion.test_speed == 0
        {
            return Err(Error::other("Speeds must be > 0"));
        }

        if [
            self.motion.home_timeout_s,
            self.motion.corner_timeout_s,
            self.motion.point_timeout_s,
            self.motion.goto_timeout_s,
        ]
        .iter()
        .any(|t| !t.is_finite() || *t <= 0.0)
        {
            return Err(Error::other("Motion timeouts must be > 0"));
        }

        // Validate signal settings
        if self.signal.host.trim().is_empty() {
            return Err(Error::other("Signal host must not be empty"));
        }

        if self.logging.level.trim().is_empty() {
            return Err(Error::other("Log level must not be empty"));
        }

        Ok(())
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

fn parse_size(name: &str, value: &str) -> Result<Size> {
    value
        .parse()
        .map_err(|e| Error::other(format!("Invalid {} '{}': {}", name, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.raster.grid_size, Size::new(60, 60));
        assert_eq!(config.raster.step_size, None);
        assert_eq!(config.device.device_pattern, "USB-to-Serial");
        assert_eq!(config.motion.home_timeout(), Duration::from_secs(600));
        assert_eq!(config.raster.observe_time(), Duration::from_secs(15));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides_from(lookup(&[
                ("STGCTL_VMX_DEVICE_PORT", "/dev/ttyUSB3"),
                ("STGCTL_GRID_SIZE", "10,20"),
                ("STGCTL_STEP_SIZE", "(100, 150)"),
                ("STGCTL_OBSERVE_TIME", "2.5"),
                ("STGCTL_SIGNAL_USER", "daq"),
                ("STGCTL_START_AQ_CMD", "start-run"),
                ("STGCTL_END_AQ_CMD", "stop-run"),
                ("STGCTL_LOG_LEVEL", "info"),
            ]))
            .unwrap();
        assert_eq!(config.device.explicit_port(), Some("/dev/ttyUSB3"));
        assert_eq!(config.raster.grid_size, Size::new(10, 20));
        assert_eq!(config.raster.step_size, Some(Size::new(100, 150)));
        assert_eq!(config.raster.observe_time_s, 2.5);
        assert_eq!(config.signal.user.as_deref(), Some("daq"));
        assert_eq!(config.signal.start_command, "start-run");
        assert_eq!(config.signal.stop_command, "stop-run");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_empty_overrides_clear_optional_values() {
        let mut config = Config::default();
        config.device.port = Some("/dev/ttyS0".to_string());
        config.raster.step_size = Some(Size::new(5, 5));
        config
            .apply_overrides_from(lookup(&[
                ("STGCTL_VMX_DEVICE_PORT", ""),
                ("STGCTL_STEP_SIZE", ""),
            ]))
            .unwrap();
        assert_eq!(config.device.port, None);
        assert_eq!(config.raster.step_size, None);
    }

    #[test]
    fn test_bad_override_is_reported() {
        let mut config = Config::default();
        let err = config
            .apply_overrides_from(lookup(&[("STGCTL_GRID_SIZE", "sixty")]))
            .unwrap_err();
        assert!(err.to_string().contains("STGCTL_GRID_SIZE"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.raster.grid_size = Size::new(0, 60);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.device.device_pattern = "(unclosed".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.raster.observe_time_s = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.motion.point_timeout_s = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.raster.step_size = Some(Size::new(10, 0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_path_ends_with_app_dir() {
        let path = Config::default_path();
        assert!(path.ends_with("stgctl/config.toml"));
    }
}
