use stgctl::{
    open_stage, prepare_raster, simulated_stage, Config, LimitSwitchSample, MoveOutcome, Size,
};
use tempfile::TempDir;

fn simulated_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.raster.grid_size = Size::new(3, 2);
    config.raster.observe_time_s = 0.0;
    config.raster.limit_switch_file = dir.path().join("limit_switch_positions.json");
    config.motion.home_timeout_s = 1.0;
    config.motion.corner_timeout_s = 1.0;
    config.motion.point_timeout_s = 1.0;
    config.motion.goto_timeout_s = 1.0;
    config
}

#[test]
fn test_startup_then_raster() {
    let dir = TempDir::new().unwrap();
    let config = simulated_config(&dir);

    let mut stage = open_stage(&config, None, true).unwrap();
    let sample = stage.startup(true).unwrap();
    assert!(sample.is_complete());
    assert!(config.raster.limit_switch_file.exists());

    stage.raster(true).unwrap();
    assert_eq!(stage.trajectory().len(), 6);
    let calibration = stage.calibration().unwrap();
    assert_eq!(calibration.offset, Size::new(398, 399));
}

#[test]
fn test_raster_from_saved_positions() {
    let dir = TempDir::new().unwrap();
    let config = simulated_config(&dir);
    LimitSwitchSample::from_positions(vec![
        Size::new(0, 0),
        Size::new(0, -11979),
        Size::new(-11954, -11979),
        Size::new(-11954, 0),
        Size::new(0, 0),
    ])
    .save(&config.raster.limit_switch_file)
    .unwrap();

    let mut stage = open_stage(&config, None, true).unwrap();
    assert!(stage.home().unwrap().is_completed());
    stage
        .load_limit_switch_positions(&config.raster.limit_switch_file)
        .unwrap();
    stage.raster(false).unwrap();

    let first = stage.trajectory().points()[0];
    assert_eq!(first, Size::new(-398, -399));
}

#[test]
fn test_goto_on_simulated_stage() {
    let dir = TempDir::new().unwrap();
    let config = simulated_config(&dir);
    let mut stage = open_stage(&config, None, true).unwrap();
    assert!(stage.home().unwrap().is_completed());
    let outcome = stage.goto(Size::new(-1000, -2000), false, 1500).unwrap();
    assert_eq!(outcome, MoveOutcome::Completed);

    let x = stage.vmx_mut().position(stgctl::Axis::X, false).unwrap();
    let y = stage.vmx_mut().position(stgctl::Axis::Y, false).unwrap();
    assert_eq!((x, y), (-1000, -2000));
}

#[test]
fn test_explicit_step_raster_homes_first() {
    let dir = TempDir::new().unwrap();
    let mut config = simulated_config(&dir);
    config.raster.step_size = Some(Size::new(100, 100));

    let (mut stage, controller) = simulated_stage(&config).unwrap();
    controller.clear_writes();
    prepare_raster(&mut stage, None).unwrap();
    stage.raster(false).unwrap();

    let writes = controller.writes();
    assert_eq!(writes[0], "C,S1M2000,S2M2000,I1M0,I2M0,R");
    assert_eq!(writes[1], "C,N");
    assert!(stage.limit_switch_positions().is_none());
}

#[test]
fn test_explicit_step_raster_refuses_unknown_origin() {
    let dir = TempDir::new().unwrap();
    let mut config = simulated_config(&dir);
    config.raster.step_size = Some(Size::new(100, 100));
    config.motion.home_timeout_s = 0.05;

    let (mut stage, controller) = simulated_stage(&config).unwrap();
    controller.hang_program(0);
    controller.clear_writes();
    assert!(prepare_raster(&mut stage, None).is_err());
    assert_eq!(controller.writes(), vec!["C,S1M2000,S2M2000,I1M0,I2M0,R"]);
}

#[test]
fn test_raster_without_step_runs_startup() {
    let dir = TempDir::new().unwrap();
    let config = simulated_config(&dir);

    let (mut stage, controller) = simulated_stage(&config).unwrap();
    prepare_raster(&mut stage, None).unwrap();
    assert!(stage.limit_switch_positions().unwrap().is_complete());
    // homing plus four corners
    assert_eq!(controller.programs_run(), 5);
}

#[test]
fn test_saved_positions_skip_homing() {
    let dir = TempDir::new().unwrap();
    let config = simulated_config(&dir);
    let (mut first, _) = simulated_stage(&config).unwrap();
    first.startup(true).unwrap();

    let (mut stage, controller) = simulated_stage(&config).unwrap();
    controller.clear_writes();
    prepare_raster(&mut stage, Some(&config.raster.limit_switch_file)).unwrap();
    assert!(controller.writes().is_empty());
    assert!(stage.limit_switch_positions().is_some());
}
