use std::sync::{Arc, Mutex};
use stgctl_communication::{SimulatedPort, SimulatorConfig, SimulatorHandle, Vmx, VmxConfig};
use stgctl_core::{Axis, Error, Result, SignalError, Size};
use stgctl_settings::Config;
use stgctl_stage::{LimitSwitchSample, MoveOutcome, SignalOutput, Signaller, XyStage};
use tempfile::TempDir;

// Signaller that records each call together with how many payloads the
// controller had received at that moment
struct RecordingSignaller {
    events: Arc<Mutex<Vec<String>>>,
    controller: SimulatorHandle,
    fail_start: bool,
}

impl Signaller for RecordingSignaller {
    fn signal_start(&mut self) -> Result<SignalOutput> {
        let writes = self.controller.writes().len();
        self.events
            .lock()
            .unwrap()
            .push(format!("start@{}", writes));
        if self.fail_start {
            return Err(SignalError::CommandFailed {
                command: "start".to_string(),
                status: Some(1),
                stderr: "refused".to_string(),
            }
            .into());
        }
        Ok(SignalOutput::default())
    }

    fn signal_stop(&mut self) -> Result<SignalOutput> {
        let writes = self.controller.writes().len();
        self.events.lock().unwrap().push(format!("stop@{}", writes));
        Ok(SignalOutput::default())
    }
}

struct Rig {
    stage: XyStage,
    controller: SimulatorHandle,
    events: Arc<Mutex<Vec<String>>>,
}

impl Rig {
    fn new(config: &Config) -> Self {
        Self::with_start_failure(config, false)
    }

    fn with_start_failure(config: &Config, fail_start: bool) -> Self {
        let (port, controller) = SimulatedPort::new(SimulatorConfig::default());
        let vmx = Vmx::connect(Box::new(port), VmxConfig::instant()).unwrap();
        controller.clear_writes();
        let events = Arc::new(Mutex::new(Vec::new()));
        let signaller = RecordingSignaller {
            events: events.clone(),
            controller: controller.clone(),
            fail_start,
        };
        Self {
            stage: XyStage::new(vmx, Box::new(signaller), config),
            controller,
            events,
        }
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn signal_kinds(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|e| e.split('@').next().unwrap_or_default().to_string())
            .collect()
    }
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

fn small_grid_config() -> Config {
    let mut config = quick_config();
    config.raster.grid_size = Size::new(2, 2);
    config.raster.step_size = Some(Size::new(10, 10));
    config
}

#[test]
fn test_startup_records_all_corners() {
    let mut rig = Rig::new(&quick_config());
    let sample = rig.stage.startup(false).unwrap();
    assert_eq!(
        sample.positions(),
        &[
            Size::new(0, 0),
            Size::new(0, -11979),
            Size::new(-11954, -11979),
            Size::new(-11954, 0),
            Size::new(0, 0),
        ]
    );
    assert_eq!(rig.stage.limit_switch_positions(), Some(&sample));

    let writes = rig.controller.writes();
    assert!(writes.contains(&"C,I1M0,I2M-0,R".to_string()));
    assert!(writes.contains(&"C,I1M-0,I2M-0,R".to_string()));
    assert!(writes.contains(&"C,I1M-0,I2M0,R".to_string()));
    assert!(writes.contains(&"C,I1M0,I2M0,R".to_string()));
}

#[test]
fn test_startup_stops_at_first_corner_timeout() {
    let mut rig = Rig::new(&quick_config());
    // program 0 is homing, 1 is the first corner
    rig.controller.hang_program(2);
    let sample = rig.stage.startup(false).unwrap();
    assert_eq!(sample.len(), 2);
    assert!(!sample.is_complete());
    assert!(rig.stage.limit_switch_positions().is_none());
    assert_eq!(rig.controller.programs_run(), 3);
}

#[test]
fn test_startup_after_homing_timeout_is_empty() {
    let mut rig = Rig::new(&quick_config());
    rig.controller.hang_program(0);
    let sample = rig.stage.startup(false).unwrap();
    assert!(sample.is_empty());
    assert_eq!(rig.controller.programs_run(), 1);
}

#[test]
fn test_startup_saves_and_reloads() {
    let dir = TempDir::new().unwrap();
    let mut config = quick_config();
    config.raster.limit_switch_file = dir.path().join("limit_switch_positions.json");

    let mut rig = Rig::new(&config);
    let sample = rig.stage.startup(true).unwrap();
    assert_eq!(
        LimitSwitchSample::load(&config.raster.limit_switch_file).unwrap(),
        sample
    );

    let mut fresh = Rig::new(&config);
    fresh
        .stage
        .load_limit_switch_positions(&config.raster.limit_switch_file)
        .unwrap();
    assert_eq!(fresh.stage.limit_switch_positions(), Some(&sample));
}

#[test]
fn test_calibrated_raster_visits_every_point() {
    let mut config = quick_config();
    config.raster.grid_size = Size::new(2, 2);
    let mut rig = Rig::new(&config);
    rig.stage.startup(false).unwrap();
    rig.controller.clear_writes();

    rig.stage.raster(true).unwrap();

    let calibration = rig.stage.calibration().unwrap();
    assert_eq!(calibration.offset, Size::new(398, 399));
    assert_eq!(calibration.step_size, Size::new(5579, 5590));
    assert_eq!(
        rig.stage.trajectory().points(),
        &[
            Size::new(-398, -399),
            Size::new(-5977, -399),
            Size::new(-5977, -5989),
            Size::new(-398, -5989),
        ]
    );

    let writes = rig.controller.writes();
    assert_eq!(writes[0], "C,S1M1500,S2M1500,R");
    assert_eq!(writes[1], "C");
    assert_eq!(writes[2], "C,IA1M-398,IA2M-399,P0,R");
    assert_eq!(writes.len(), 6);
    assert_eq!(rig.controller.position(Axis::X), -398);
    assert_eq!(rig.controller.position(Axis::Y), -5989);
    assert_eq!(rig.events(), vec!["start@1", "stop@6"]);
}

#[test]
fn test_raster_releases_trigger_on_any_failing_point() {
    for failing_point in 0..4 {
        let mut rig = Rig::new(&small_grid_config());
        // program 0 sets the speed; points follow
        rig.controller.hang_program(1 + failing_point);

        let err = rig.stage.raster(true).unwrap_err();
        assert!(err.is_timeout(), "point {}: {}", failing_point, err);
        assert_eq!(rig.signal_kinds(), vec!["start", "stop"]);

        // speed, immediate clear, then every point up to the failing one
        let sent = 2 + failing_point + 1;
        assert_eq!(rig.controller.writes().len(), sent);
        assert_eq!(rig.events()[1], format!("stop@{}", sent));
    }
}

#[test]
fn test_raster_without_trigger() {
    let mut rig = Rig::new(&small_grid_config());
    rig.stage.raster(false).unwrap();
    assert!(rig.events().is_empty());
    assert_eq!(rig.controller.writes().len(), 6);
}

#[test]
fn test_raster_start_failure_stops_and_aborts() {
    let mut rig = Rig::with_start_failure(&small_grid_config(), true);
    let err = rig.stage.raster(true).unwrap_err();
    assert!(matches!(err, Error::Signal(SignalError::CommandFailed { .. })));
    assert_eq!(rig.signal_kinds(), vec!["start", "stop"]);
    assert_eq!(rig.controller.writes(), vec!["C,S1M1500,S2M1500,R"]);
}

#[test]
fn test_raster_needs_sample_or_step() {
    let mut rig = Rig::new(&quick_config());
    let err = rig.stage.raster(true).unwrap_err();
    assert!(matches!(err, Error::Calibration(_)));
    assert!(rig.events().is_empty());
    assert!(rig.controller.writes().is_empty());
}

#[test]
fn test_goto_absolute_and_relative() {
    let mut rig = Rig::new(&quick_config());
    assert!(rig.stage.home().unwrap().is_completed());

    let outcome = rig.stage.goto(Size::new(-100, -200), false, 1200).unwrap();
    assert_eq!(outcome, MoveOutcome::Completed);
    assert_eq!(rig.controller.position(Axis::X), -100);
    assert_eq!(rig.controller.position(Axis::Y), -200);

    let outcome = rig.stage.goto(Size::new(-50, 0), true, 1200).unwrap();
    assert_eq!(outcome, MoveOutcome::Completed);
    assert_eq!(rig.controller.position(Axis::X), -150);
    assert_eq!(rig.controller.position(Axis::Y), -200);

    let writes = rig.controller.writes();
    assert!(writes.contains(&"C,S1M1200,S2M1200,R".to_string()));
    assert!(writes.contains(&"C,IA1M-100,IA2M-200,R".to_string()));
    assert_eq!(writes.last().map(String::as_str), Some("C,I1M-50,R"));
}

#[test]
fn test_goto_timeout_is_not_an_error() {
    let mut rig = Rig::new(&quick_config());
    // program 0 sets the speed, 1 is the move
    rig.controller.hang_program(1);
    let outcome = rig.stage.goto(Size::new(-10, -10), false, 1500).unwrap();
    assert_eq!(outcome, MoveOutcome::TimedOut);
}

#[test]
fn test_zero_relative_goto_sends_nothing() {
    let mut rig = Rig::new(&quick_config());
    let outcome = rig.stage.goto(Size::new(0, 0), true, 1500).unwrap();
    assert_eq!(outcome, MoveOutcome::Completed);
    assert!(rig.controller.writes().is_empty());
}

#[test]
fn test_signal_test_sequence() {
    let mut rig = Rig::new(&quick_config());
    rig.stage.test_signal_setup().unwrap();
    assert_eq!(rig.signal_kinds(), vec!["start", "stop"]);

    let writes = rig.controller.writes();
    assert!(writes.contains(&"C,I1M-5000,I2M-5000,P0,R".to_string()));
    // homed again at the end
    assert_eq!(writes[writes.len() - 1], "C,N");
    assert_eq!(rig.controller.position(Axis::X), 0);
}

#[test]
fn test_signal_test_stops_when_move_times_out() {
    let mut rig = Rig::new(&quick_config());
    // home, speed, test move
    rig.controller.hang_program(2);
    let err = rig.stage.test_signal_setup().unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(rig.signal_kinds(), vec!["start", "stop"]);
    assert_eq!(rig.controller.programs_run(), 3);
}

#[test]
fn test_goto_with_enormous_timeout_completes() {
    let mut config = quick_config();
    config.motion.goto_timeout_s = 1e30;
    config.validate().unwrap();

    let mut rig = Rig::new(&config);
    let outcome = rig.stage.goto(Size::new(-10, -10), false, 1500).unwrap();
    assert_eq!(outcome, MoveOutcome::Completed);
}
