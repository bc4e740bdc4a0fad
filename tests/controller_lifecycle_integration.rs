//! Integration tests for the device controller
//!
//! These tests validate the complete controller workflow:
//! - Connection and disconnection
//! - Experiment start/stop and the commands sent to the rig
//! - Sensor-source remapping before the sink

mod common;

use common::mock_helpers::{fast_reader_config, ScriptedLink};
use common::{assert_float_eq, config_in, wait_until};
use tribodaq_rs::session::read_log;
use tribodaq_rs::types::{ConnectionStatus, RunState};
use tribodaq_rs::{DaqError, DeviceController, SensorSource};

fn controller(link: &ScriptedLink, dir: &std::path::Path) -> DeviceController {
    DeviceController::with_reader_config(link.clone(), &config_in(dir, 64), fast_reader_config())
}

#[test]
fn test_full_experiment_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let link = ScriptedLink::new();
    let config = config_in(dir.path(), 64);
    let mut controller = controller(&link, dir.path());

    controller.connect(&config.serial).unwrap();
    assert_eq!(controller.status(), ConnectionStatus::Connected);
    assert_eq!(controller.endpoint().as_deref(), Some("scripted"));
    assert!(controller.is_reading());

    let mut params = config.experiment.clone();
    params.experiment_duration_s = 10.0;
    let log_path = controller.start_experiment(&params).unwrap();
    assert_eq!(controller.run_state(), RunState::Running);
    assert_eq!(link.written(), vec!["CFG,0,500,80,60,10,F", "3"]);

    link.push_line("Experiment started");
    for t in 1..=5 {
        link.push_line(&format!(">Time:{},Fixed_X:{},Fixed_Z:0.5", t, t));
    }
    assert!(wait_until(|| controller.reader_stats().readings == 6));
    assert_float_eq(controller.progress(10.0), 50.0, 1e-9);

    let stats = controller.statistics();
    assert_eq!(stats.count, 5);
    assert_float_eq(stats.force_x.unwrap().mean, 3.0, 1e-9);

    assert_eq!(controller.stop_experiment(), Some(log_path.clone()));
    assert_eq!(link.written().last().map(String::as_str), Some("stop"));
    assert_eq!(controller.run_state(), RunState::Idle);
    assert_eq!(controller.progress(10.0), 0.0);

    assert_eq!(read_log(&log_path).unwrap().len(), 6);
    let reports = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("experiment_summary_"))
        .count();
    assert_eq!(reports, 1);

    controller.disconnect();
    assert!(!controller.is_connected());
    assert!(!controller.is_reading());
}

#[test]
fn test_connect_failure_leaves_controller_disconnected() {
    let dir = tempfile::tempdir().unwrap();
    let link = ScriptedLink::new();
    link.reject_open();
    let mut controller = controller(&link, dir.path());

    let err = controller
        .connect(&config_in(dir.path(), 8).serial)
        .unwrap_err();
    assert!(matches!(err, DaqError::Connect { .. }));
    assert!(!controller.is_connected());
    assert!(!controller.is_reading());
}

#[test]
fn test_start_requires_connection() {
    let dir = tempfile::tempdir().unwrap();
    let link = ScriptedLink::new();
    let mut controller = controller(&link, dir.path());

    let err = controller
        .start_experiment(&Default::default())
        .unwrap_err();
    assert!(matches!(err, DaqError::NotConnected));
    assert!(link.written().is_empty());
}

#[test]
fn test_failed_start_command_rolls_back_run() {
    let dir = tempfile::tempdir().unwrap();
    let link = ScriptedLink::new();
    let config = config_in(dir.path(), 8);
    let mut controller = controller(&link, dir.path());
    controller.connect(&config.serial).unwrap();

    link.fail_writes();
    let err = controller.start_experiment(&config.experiment).unwrap_err();
    assert!(matches!(err, DaqError::Write(_)));
    assert_eq!(controller.run_state(), RunState::Idle);
}

#[test]
fn test_controlled_source_remaps_forces() {
    let dir = tempfile::tempdir().unwrap();
    let link = ScriptedLink::new();
    let config = config_in(dir.path(), 8);
    let mut controller = controller(&link, dir.path());
    controller.set_sensor_source(SensorSource::Controlled);
    controller.connect(&config.serial).unwrap();
    controller.start_experiment(&config.experiment).unwrap();
    assert_eq!(link.written()[0], "CFG,0,500,80,60,282.1,C");

    link.push_line(">Time:1,Fixed_X:1.0,Fixed_Z:2.0,Fx:10.0,Fz:20.0");
    link.push_line(">Time:2,Fixed_X:3.0,Fixed_Z:4.0");
    assert!(wait_until(|| controller.reader_stats().readings == 2));

    let snapshot = controller.snapshot_handle().unwrap().load();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].force_x, Some(10.0));
    assert_eq!(snapshot[0].force_z, Some(20.0));
    // No controlled values: the parser's fixed values stay
    assert_eq!(snapshot[1].force_x, Some(3.0));

    // The queue carries readings as decoded
    let queued = controller.drain_queued();
    assert_eq!(queued[0].force_x, Some(1.0));
}

#[test]
fn test_clear_discards_run() {
    let dir = tempfile::tempdir().unwrap();
    let link = ScriptedLink::new();
    let config = config_in(dir.path(), 8);
    let mut controller = controller(&link, dir.path());
    controller.connect(&config.serial).unwrap();
    controller.start_experiment(&config.experiment).unwrap();

    link.push_line(">Time:1,Fixed_X:1.0");
    assert!(wait_until(|| controller.reader_stats().readings == 1));

    controller.clear().unwrap();
    assert_eq!(controller.run_state(), RunState::Idle);
    assert!(controller.statistics().is_empty());
    assert!(controller.snapshot_handle().unwrap().load().is_empty());
    assert!(controller.sink().lock().unwrap().run_info().is_none());
}

#[test]
fn test_disconnect_during_run_closes_log() {
    let dir = tempfile::tempdir().unwrap();
    let link = ScriptedLink::new();
    let config = config_in(dir.path(), 8);
    let mut controller = controller(&link, dir.path());
    controller.connect(&config.serial).unwrap();
    let log_path = controller.start_experiment(&config.experiment).unwrap();

    link.push_line(">Time:1,Fixed_X:1.0");
    assert!(wait_until(|| controller.reader_stats().readings == 1));
    controller.disconnect();

    assert_eq!(controller.run_state(), RunState::Idle);
    assert_eq!(read_log(&log_path).unwrap().len(), 1);
}
