//! # stgctl Stage
//!
//! XY stage orchestration on top of the VMX driver: homing, limit switch
//! calibration, back-and-forth raster trajectories with a guarded
//! acquisition trigger, and point to point moves.

pub mod calibration;
pub mod limit_switch;
pub mod signal;
pub mod stage;
pub mod trajectory;

pub use calibration::{calibrate, Calibration};
pub use limit_switch::LimitSwitchSample;
pub use signal::{DryRunSignaller, SignalOutput, Signaller, SshSignaller, TriggerSession};
pub use stage::{MoveOutcome, XyStage};
pub use trajectory::{generate, Trajectory};
