//! stgctl Settings Crate
//!
//! Handles application configuration, file persistence and environment overrides.

pub mod config;

pub use config::{
    Config, DeviceSettings, LoggingSettings, MotionSettings, RasterSettings, SignalSettings,
    ENV_PREFIX,
};
