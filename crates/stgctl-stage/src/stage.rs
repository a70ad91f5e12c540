//! XY stage orchestration
//!
//! Sequences VMX programs into physically meaningful operations on a pair of
//! stages: homing, recording the limit switches, rastering and goto.
//!
//! Homing and goto timeouts are reported as [`MoveOutcome::TimedOut`] and the
//! stage position must then be treated as unknown. Raster timeouts propagate,
//! after the acquisition trigger has been released.

use crate::calibration::{calibrate, Calibration};
use crate::limit_switch::{LimitSwitchSample, CORNERS};
use crate::signal::{Signaller, TriggerSession};
use crate::trajectory::Trajectory;
use std::path::Path;
use std::time::Duration;
use stgctl_communication::{Operation, Vmx};
use stgctl_core::{Axis, CalibrationError, ControllerError, Error, Result, Size};
use stgctl_settings::{Config, MotionSettings, RasterSettings};

/// Whether a motion confirmed completion
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The controller reported completion
    Completed,
    /// No completion before the deadline; position is unknown
    TimedOut,
}

impl MoveOutcome {
    /// Whether the controller reported completion
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Two stages driven by one VMX controller
pub struct XyStage {
    vmx: Vmx,
    signaller: Box<dyn Signaller>,
    raster: RasterSettings,
    motion: MotionSettings,
    limit_switch_positions: Option<LimitSwitchSample>,
    calibration: Option<Calibration>,
    trajectory: Trajectory,
}

impl XyStage {
    /// Create a stage from a connected controller
    pub fn new(vmx: Vmx, signaller: Box<dyn Signaller>, config: &Config) -> Self {
        Self {
            vmx,
            signaller,
            raster: config.raster.clone(),
            motion: config.motion.clone(),
            limit_switch_positions: None,
            calibration: None,
            trajectory: Trajectory::default(),
        }
    }

    /// The controller session
    pub fn vmx(&self) -> &Vmx {
        &self.vmx
    }

    /// The controller session, mutably
    pub fn vmx_mut(&mut self) -> &mut Vmx {
        &mut self.vmx
    }

    /// Give back the controller session
    pub fn into_vmx(self) -> Vmx {
        self.vmx
    }

    /// Raster settings in use
    pub fn raster_settings(&self) -> &RasterSettings {
        &self.raster
    }

    /// Most recently generated trajectory
    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// Calibration behind the current trajectory, if one was derived
    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Recorded or loaded limit switch positions
    pub fn limit_switch_positions(&self) -> Option<&LimitSwitchSample> {
        self.limit_switch_positions.as_ref()
    }

    /// Use previously recorded positions instead of running startup
    pub fn set_limit_switch_positions(&mut self, sample: LimitSwitchSample) -> Result<()> {
        sample.ensure_complete()?;
        self.limit_switch_positions = Some(sample);
        self.calibration = None;
        Ok(())
    }

    /// Load positions saved by a previous startup
    pub fn load_limit_switch_positions(&mut self, path: &Path) -> Result<()> {
        let sample = LimitSwitchSample::load(path)?;
        tracing::info!("Loaded limit switch positions from {}", path.display());
        self.set_limit_switch_positions(sample)
    }

    fn wait(&mut self, timeout: Duration) -> Result<MoveOutcome> {
        match self.vmx.wait_for_complete(timeout) {
            Ok(()) => Ok(MoveOutcome::Completed),
            Err(Error::Controller(ControllerError::CommandTimeout { .. })) => {
                Ok(MoveOutcome::TimedOut)
            }
            Err(e) => Err(e),
        }
    }

    fn set_speed(&mut self, speed: u32) -> Result<()> {
        self.vmx
            .clear()?
            .speed(Axis::X, speed)?
            .speed(Axis::Y, speed)?
            .run()?;
        self.vmx.send()
    }

    /// Index to the positive limit switches and make that the origin
    pub fn home(&mut self) -> Result<MoveOutcome> {
        tracing::info!("Sending stages to positive limit switches.");
        let speed = self.motion.home_speed;
        self.vmx
            .clear()?
            .speed(Axis::X, speed)?
            .speed(Axis::Y, speed)?
            .to_limit(Axis::X, true)?
            .to_limit(Axis::Y, true)?
            .run()?;
        self.vmx.send()?;

        match self.wait(self.motion.home_timeout())? {
            MoveOutcome::Completed => {
                tracing::info!("Stages have finished indexing to the positive limit switches.");
                self.vmx.clear()?.origin()?;
                self.vmx.send()?;
                tracing::info!("Origin set.");
                Ok(MoveOutcome::Completed)
            }
            MoveOutcome::TimedOut => {
                tracing::warn!(
                    "Waiting for homing to complete timed out. The stages could be anywhere."
                );
                Ok(MoveOutcome::TimedOut)
            }
        }
    }

    /// Home, then visit the four corners recording each limit switch position
    ///
    /// Stops at the first corner that does not complete and returns the
    /// partial sample. Only a complete sample is kept and, with `save`,
    /// written to the configured limit switch file.
    pub fn startup(&mut self, save: bool) -> Result<LimitSwitchSample> {
        tracing::info!(
            "Sending stages to the four limit switches to get index counts for raster."
        );
        let mut sample = LimitSwitchSample::new();
        if self.home()? == MoveOutcome::TimedOut {
            tracing::warn!("Skipping limit switch traversal after failed homing.");
            return Ok(sample);
        }
        // The positive limit corner is the origin by definition
        sample.push(Size::new(0, 0));

        for (x_positive, y_positive) in CORNERS {
            self.vmx
                .clear()?
                .to_limit(Axis::X, x_positive)?
                .to_limit(Axis::Y, y_positive)?
                .run()?;
            self.vmx.send()?;

            let corner = format!(
                "({}X,{}Y)",
                if x_positive { '+' } else { '-' },
                if y_positive { '+' } else { '-' }
            );
            if self.wait(self.motion.corner_timeout())? == MoveOutcome::TimedOut {
                tracing::warn!(
                    "Waiting for stages to reach {} timed out; recorded {} of 5 positions.",
                    corner,
                    sample.len()
                );
                return Ok(sample);
            }
            tracing::info!("Stages have finished indexing to {} limit switches.", corner);

            let x = self.vmx.position(Axis::X, false)?;
            let y = self.vmx.position(Axis::Y, false)?;
            tracing::debug!("VMX reports stage position ({},{}).", x, y);
            sample.push(Size::new(x, y));
        }

        tracing::info!("Stages have recorded limit switch positions.");
        self.limit_switch_positions = Some(sample.clone());
        self.calibration = None;

        if save {
            sample.save(&self.raster.limit_switch_file)?;
            tracing::info!(
                "Saved limit switch positions to {}",
                self.raster.limit_switch_file.display()
            );
        }
        Ok(sample)
    }

    /// Compute the raster trajectory in stage coordinates
    ///
    /// A configured step size wins over calibration; the inward offset then
    /// still comes from the limit switches when they are known, else zero.
    pub fn gen_trajectory(&mut self) -> Result<&Trajectory> {
        let grid_size = self.raster.grid_size;
        let (step_size, offset) = if let Some(step_size) = self.raster.step_size {
            tracing::info!("Using grid and step size from settings.");
            let offset = match &self.limit_switch_positions {
                Some(sample) => match calibrate(sample, grid_size) {
                    Ok(calibration) => {
                        let offset = calibration.offset;
                        self.calibration = Some(calibration);
                        offset
                    }
                    Err(e) => {
                        tracing::warn!("Ignoring limit switch positions: {}", e);
                        Size::default()
                    }
                },
                None => {
                    tracing::warn!(
                        "No limit switch positions recorded; the raster starts on the positive limit switches. Run startup to offset it inward."
                    );
                    Size::default()
                }
            };
            (step_size, offset)
        } else if let Some(sample) = &self.limit_switch_positions {
            tracing::info!("Using grid and step size generated from limit switch positions.");
            tracing::debug!("Using limit switch positions {:?}", sample.positions());
            let calibration = calibrate(sample, grid_size)?;
            let params = (calibration.step_size, calibration.offset);
            self.calibration = Some(calibration);
            params
        } else {
            tracing::warn!("Either set raster parameters manually or run startup.");
            return Err(CalibrationError::MissingSample.into());
        };

        tracing::debug!(
            "Generating 2D raster trajectory with grid size {} and step size {}, offset {}.",
            grid_size,
            step_size,
            offset
        );
        self.trajectory = Trajectory::generate(grid_size, step_size).to_stage(offset);
        Ok(&self.trajectory)
    }

    /// Visit every trajectory point, holding for the observe time at each
    ///
    /// With `with_trigger`, acquisition is started before the first point and
    /// stopped exactly once before this returns, whether or not a point
    /// failed.
    pub fn raster(&mut self, with_trigger: bool) -> Result<()> {
        self.gen_trajectory()?;

        let speed = self.raster.speed;
        tracing::debug!("Setting motor speed to {} for both motors.", speed);
        self.set_speed(speed)?;

        let session = if with_trigger {
            Some(TriggerSession::acquire(self.signaller.as_mut())?)
        } else {
            None
        };

        let result = run_points(
            &mut self.vmx,
            &self.trajectory,
            &self.raster,
            self.motion.point_timeout(),
        );

        if let Some(session) = session {
            session.release();
        }
        result?;

        tracing::info!("Completed {} raster.", self.raster.grid_size);
        Ok(())
    }

    /// Move to index coordinates
    pub fn goto(&mut self, target: Size, relative: bool, speed: u32) -> Result<MoveOutcome> {
        if relative && target == Size::default() {
            tracing::info!("Relative move of {} requested; nothing to do.", target);
            return Ok(MoveOutcome::Completed);
        }

        self.set_speed(speed)?;
        tracing::info!("Set motor speed to {} idx/s", speed);

        tracing::info!(
            "Moving to {}{}.",
            target,
            if relative { " (relative)" } else { "" }
        );
        self.vmx
            .clear()?
            .move_index(Axis::X, target.x, relative)?
            .move_index(Axis::Y, target.y, relative)?
            .run()?;
        self.vmx.send()?;

        let outcome = self.wait(self.motion.goto_timeout())?;
        if outcome == MoveOutcome::TimedOut {
            tracing::warn!(
                "Waiting for VMX program to complete timed out. The stages could be anywhere."
            );
        }
        Ok(outcome)
    }

    /// Home, start acquisition, make a test move, stop acquisition, home again
    ///
    /// The stop is sent whether or not the test move completes; a failed test
    /// move is returned without the second homing.
    pub fn test_signal_setup(&mut self) -> Result<()> {
        if self.home()? == MoveOutcome::TimedOut {
            tracing::warn!("Continuing signal test from an unknown position.");
        }

        let speed = self.motion.test_speed;
        self.set_speed(speed)?;
        tracing::info!("Set motor speed to {} idx/s", speed);

        let session = TriggerSession::acquire(self.signaller.as_mut())?;
        let offset = self.motion.test_offset;
        tracing::info!("Moving to {}.", offset);
        let result = test_move(
            &mut self.vmx,
            offset,
            self.raster.observe_time(),
            self.motion.goto_timeout(),
        );
        session.release();
        tracing::info!("Testing signalling complete.");
        result?;

        if self.home()? == MoveOutcome::TimedOut {
            tracing::warn!("Stages did not return home after the signal test.");
        }
        Ok(())
    }
}

fn run_points(
    vmx: &mut Vmx,
    trajectory: &Trajectory,
    raster: &RasterSettings,
    timeout: Duration,
) -> Result<()> {
    vmx.execute_now(Operation::Clear.into())?;

    let total = trajectory.len();
    let columns = raster.grid_size.x.max(1) as usize;
    tracing::info!("Starting a raster with {} points.", total);

    for (i, point) in trajectory.iter().enumerate() {
        tracing::info!("Now indexing to {}.", point);
        vmx.clear()?
            .move_index(Axis::X, point.x, false)?
            .move_index(Axis::Y, point.y, false)?
            .pause(raster.observe_time())?
            .run()?;
        vmx.send()?;
        tracing::info!(
            "Point {}/{} (row {}/{}).",
            i + 1,
            total,
            i / columns + 1,
            raster.grid_size.y
        );
        vmx.wait_for_complete(timeout)?;
        tracing::debug!("Program complete, moving to next position.");
    }
    Ok(())
}

fn test_move(vmx: &mut Vmx, offset: i64, observe: Duration, timeout: Duration) -> Result<()> {
    vmx.clear()?
        .move_index(Axis::X, offset, true)?
        .move_index(Axis::Y, offset, true)?
        .pause(observe)?
        .run()?;
    vmx.send()?;
    vmx.wait_for_complete(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::DryRunSignaller;
    use stgctl_communication::{SimulatedPort, SimulatorConfig, SimulatorHandle, VmxConfig};
    use tracing_test::traced_test;

    fn stage(config: &Config) -> (XyStage, SimulatorHandle) {
        let (port, handle) = SimulatedPort::new(SimulatorConfig::default());
        let vmx = Vmx::connect(Box::new(port), VmxConfig::instant()).unwrap();
        handle.clear_writes();
        (XyStage::new(vmx, Box::new(DryRunSignaller), config), handle)
    }

    fn quick_config() -> Config {
        let mut config = Config::default();
        config.motion.home_timeout_s = 0.05;
        config.motion.corner_timeout_s = 0.05;
        config.motion.point_timeout_s = 0.05;
        config.motion.goto_timeout_s = 0.05;
        config.raster.observe_time_s = 0.0;
        config
    }

    #[test]
    #[traced_test]
    fn test_home_timeout_warns_and_skips_origin() {
        let (mut stage, handle) = stage(&quick_config());
        handle.hang_program(0);
        assert_eq!(stage.home().unwrap(), MoveOutcome::TimedOut);
        assert!(logs_contain("The stages could be anywhere"));
        assert_eq!(handle.writes(), vec!["C,S1M2000,S2M2000,I1M0,I2M0,R"]);
    }

    #[test]
    fn test_home_sets_origin() {
        let (mut stage, handle) = stage(&quick_config());
        assert_eq!(stage.home().unwrap(), MoveOutcome::Completed);
        assert_eq!(
            handle.writes(),
            vec!["C,S1M2000,S2M2000,I1M0,I2M0,R", "C,N"]
        );
        assert_eq!(handle.position(Axis::X), 0);
        assert_eq!(handle.position(Axis::Y), 0);
    }

    #[test]
    fn test_missing_sample_without_step_size() {
        let (mut stage, _handle) = stage(&quick_config());
        let err = stage.gen_trajectory().unwrap_err();
        assert!(matches!(
            err,
            Error::Calibration(CalibrationError::MissingSample)
        ));
    }

    #[test]
    #[traced_test]
    fn test_explicit_step_without_sample_has_no_offset() {
        let mut config = quick_config();
        config.raster.grid_size = Size::new(2, 2);
        config.raster.step_size = Some(Size::new(10, 10));
        let (mut stage, _handle) = stage(&config);
        let trajectory = stage.gen_trajectory().unwrap();
        assert_eq!(
            trajectory.points(),
            &[
                Size::new(0, 0),
                Size::new(-10, 0),
                Size::new(-10, -10),
                Size::new(0, -10)
            ]
        );
        assert!(logs_contain("the raster starts on the positive limit switches"));
    }
}
