//! Range-discovery wizard driven against the simulated arm.

use std::sync::Arc;
use std::time::Duration;

use soarm_config::{
    CalibrationProfile, LegacyTickProfile, PidGains, ProfileStore, TcpOffset, VoltageClass,
};
use soarm_core::mocks::RecordingSink;
use soarm_core::{
    AdapterCfg, CalibrationEngine, CalibrationError, EventLevel, JointLimit, RobotAdapter,
    RobotIdentity, StepStatus, WizardStep,
};
use soarm_hardware::SimulatedArm;
use soarm_traits::{ManualClock, Register};

const MINUS_45: i32 = 1536;
const PLUS_45: i32 = 2560;

fn identity(dir: &std::path::Path) -> RobotIdentity {
    RobotIdentity {
        model: "so-100".into(),
        serial_id: "bench".into(),
        profile_dir: dir.to_path_buf(),
    }
}

fn rig(dir: &std::path::Path) -> (SimulatedArm, RobotAdapter, CalibrationEngine, RecordingSink) {
    let arm = SimulatedArm::six_axis();
    let mut robot = RobotAdapter::new(Box::new(arm.opener()), AdapterCfg::default());
    robot.connect("sim").unwrap();
    let sink = RecordingSink::new();
    let engine = CalibrationEngine::new(identity(dir))
        .with_clock(Arc::new(ManualClock::new()))
        .with_sink(Arc::new(sink.clone()));
    (arm, robot, engine, sink)
}

fn set_all(arm: &SimulatedArm, ticks: i32) {
    for id in 1..=6 {
        arm.set_position(id, ticks);
    }
}

/// Steps 0 and 1, leaving the wizard measuring joint 0.
fn to_range_discovery(robot: &mut RobotAdapter, engine: &mut CalibrationEngine) {
    assert_eq!(engine.calibrate_step(robot).status, StepStatus::InProgress);
    assert_eq!(engine.step(), WizardStep::ConfirmMiddle);
    assert_eq!(engine.calibrate_step(robot).status, StepStatus::InProgress);
    assert_eq!(engine.step(), WizardStep::RangeDiscovery);
    assert_eq!(engine.session().current_joint_index, 0);
}

#[test]
fn full_wizard_installs_ranges_and_saves_profile() {
    let dir = tempfile::tempdir().unwrap();
    let (arm, mut robot, mut engine, sink) = rig(dir.path());

    to_range_discovery(&mut robot, &mut engine);
    for id in 1..=6 {
        assert_eq!(arm.register(id, Register::TorqueEnable), Some(0));
    }

    for joint in 0..6 {
        set_all(&arm, MINUS_45);
        engine.update_realtime_positions(&mut robot);
        set_all(&arm, PLUS_45);
        let snap = engine.update_realtime_positions(&mut robot);
        assert_eq!(snap.current_joint_index, joint);
        assert_eq!(snap.min_positions[joint], Some(-45.0));
        assert_eq!(snap.max_positions[joint], Some(45.0));

        assert!(engine.record_joint_min(&mut robot));
        assert!(engine.record_joint_max(&mut robot));
        assert_eq!(engine.session().current_joint_index, joint + 1);
        assert_eq!(engine.session().realtime_min[joint], None);
    }

    let report = engine.calibrate_step(&mut robot);
    assert_eq!(report.status, StepStatus::InProgress);
    assert_eq!(engine.step(), WizardStep::Commit);

    let report = engine.calibrate_step(&mut robot);
    assert_eq!(report.status, StepStatus::Success, "{}", report.message);
    assert_eq!(engine.step(), WizardStep::Init);

    for limit in robot.limits() {
        assert_eq!(*limit, JointLimit::new(-45.0, 45.0));
    }
    for id in 1..=6 {
        assert_eq!(arm.register(id, Register::TorqueEnable), Some(1));
    }

    let stored = ProfileStore::new(dir.path())
        .load("so-100", "bench")
        .unwrap()
        .expect("profile written");
    let ranges = stored.joint_ranges.unwrap();
    assert_eq!(ranges.middle, [0.0; 6]);
    assert_eq!(ranges.min, [-45.0; 6]);
    assert_eq!(stored.joint_offsets, [0.0; 6]);
    assert!(sink.count(EventLevel::Success) >= 1);
}

#[test]
fn asymmetric_range_offsets_by_negated_middle() {
    let dir = tempfile::tempdir().unwrap();
    let (arm, mut robot, mut engine, _sink) = rig(dir.path());
    to_range_discovery(&mut robot, &mut engine);

    arm.set_position(1, 1024);
    engine.update_realtime_positions(&mut robot);
    arm.set_position(1, 2048);
    engine.update_realtime_positions(&mut robot);
    assert!(engine.auto_record_current_joint());
    for _ in 1..6 {
        assert!(engine.next_joint());
    }
    engine.calibrate_step(&mut robot);
    let report = engine.calibrate_step(&mut robot);
    assert_eq!(report.status, StepStatus::Success);

    let p = engine.profile();
    assert_eq!(p.joint_offsets[0], 45.0);
    assert_eq!(robot.limits()[0], JointLimit::new(-90.0, 0.0));
    // skipped joints fall back to a full turn
    assert_eq!(robot.limits()[3], JointLimit::FULL_TURN);
}

#[test]
fn record_max_without_min_stays_on_joint() {
    let dir = tempfile::tempdir().unwrap();
    let (arm, mut robot, mut engine, _sink) = rig(dir.path());
    to_range_discovery(&mut robot, &mut engine);

    arm.set_position(1, PLUS_45);
    assert!(engine.record_joint_max(&mut robot));
    assert_eq!(engine.session().current_joint_index, 0);
    assert_eq!(engine.session().recorded_max[0], Some(45.0));

    arm.set_position(1, MINUS_45);
    assert!(engine.record_joint_min(&mut robot));
    assert_eq!(engine.session().current_joint_index, 0);
    assert!(engine.record_joint_max(&mut robot));
    assert_eq!(engine.session().current_joint_index, 1);
}

#[test]
fn recording_outside_range_discovery_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let (_arm, mut robot, mut engine, _sink) = rig(dir.path());
    assert!(!engine.record_joint_min(&mut robot));
    assert!(!engine.record_joint_max(&mut robot));
    assert!(!engine.next_joint());
    assert!(!engine.auto_record_current_joint());
    let snap = engine.update_realtime_positions(&mut robot);
    assert_eq!(snap.positions, [0.0; 6]);
    assert_eq!(snap.min_positions, [None; 6]);
}

#[test]
fn disconnect_mid_wizard_resets_to_step_zero() {
    let dir = tempfile::tempdir().unwrap();
    let (_arm, mut robot, mut engine, sink) = rig(dir.path());
    to_range_discovery(&mut robot, &mut engine);
    robot.disconnect();

    let report = engine.calibrate_step(&mut robot);
    assert_eq!(report.status, StepStatus::Error);
    assert_eq!(engine.step(), WizardStep::Init);
    assert!(sink.count(EventLevel::Error) >= 1);
}

#[test]
fn save_failure_keeps_commit_step_and_limits() {
    let dir = tempfile::tempdir().unwrap();
    let blocked = dir.path().join("profiles");
    std::fs::write(&blocked, b"not a directory").unwrap();
    let (_arm, mut robot, mut engine, _sink) = rig(&blocked);
    let before = [JointLimit::new(-100.0, 100.0); 6];
    robot.set_limits(before);

    to_range_discovery(&mut robot, &mut engine);
    for _ in 0..6 {
        engine.next_joint();
    }
    engine.calibrate_step(&mut robot);
    assert_eq!(engine.step(), WizardStep::Commit);

    let report = engine.calibrate_step(&mut robot);
    assert_eq!(report.status, StepStatus::Error);
    assert_eq!(engine.step(), WizardStep::Commit);
    assert_eq!(*robot.limits(), before);

    std::fs::remove_file(&blocked).unwrap();
    let report = engine.calibrate_step(&mut robot);
    assert_eq!(report.status, StepStatus::Success);
    assert!(blocked.join("so-100_bench.json").exists());
}

#[test]
fn reset_wizard_clears_session() {
    let dir = tempfile::tempdir().unwrap();
    let (_arm, mut robot, mut engine, _sink) = rig(dir.path());
    to_range_discovery(&mut robot, &mut engine);
    engine.record_joint_min(&mut robot);
    engine.reset_wizard();
    let status = engine.status();
    assert_eq!(status.step, WizardStep::Init);
    assert_eq!(status.recorded_min, [None; 6]);
}

#[test]
fn step_zero_picks_profile_for_detected_voltage() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::new(dir.path());
    let mut stored = CalibrationProfile::default_for("so-100", "bench", VoltageClass::V6);
    stored.pid_gains[0] = PidGains {
        p_gain: 10,
        i_gain: 0,
        d_gain: 16,
    };
    store.save(&stored).unwrap();

    let (arm, mut robot, mut engine, _sink) = rig(dir.path());
    engine.calibrate_step(&mut robot);
    assert_eq!(engine.profile().voltage_class, VoltageClass::V6);
    assert_eq!(arm.register(1, Register::PCoefficient), Some(10));

    // same robot on a 12 V supply ignores the 6 V profile
    engine.reset_wizard();
    arm.set_supply_volts(12.0);
    engine.calibrate_step(&mut robot);
    assert_eq!(engine.profile().voltage_class, VoltageClass::V12);
    assert_eq!(engine.profile().pid_gains[0], PidGains::default());
}

#[test]
fn home_moves_only_joints_away_from_pose() {
    let dir = tempfile::tempdir().unwrap();
    let (arm, mut robot, mut engine, _sink) = rig(dir.path());
    engine.set_home_settle(Duration::from_millis(500));
    engine.set_home_pose([10.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    arm.clear_writes();

    assert!(engine.home(&mut robot));
    let goal_writes: Vec<_> = arm
        .writes()
        .into_iter()
        .filter(|w| w.reg == Register::GoalPosition)
        .collect();
    assert_eq!(goal_writes.len(), 1);
    assert_eq!(goal_writes[0].id, 1);
    let pos = robot.get_joint_position(0).unwrap();
    assert!((pos - 10.0).abs() < 0.1, "got {pos}");
}

#[test]
fn zero_joints_negates_current_pose() {
    let dir = tempfile::tempdir().unwrap();
    let (arm, mut robot, mut engine, _sink) = rig(dir.path());
    arm.set_position(1, PLUS_45);
    assert!(engine.zero_joints(&mut robot));
    assert_eq!(engine.profile().joint_offsets[0], -45.0);
    robot.disconnect();
    assert!(!engine.zero_joints(&mut robot));
    assert!(!engine.home(&mut robot));
}

#[test]
fn load_profile_applies_stored_ranges() {
    let dir = tempfile::tempdir().unwrap();
    let (_arm, mut robot, mut engine, _sink) = rig(dir.path());
    let err = engine.load_profile(&mut robot).unwrap_err();
    assert!(matches!(err, CalibrationError::MissingProfile { .. }));

    let mut p = CalibrationProfile::default_for("so-100", "bench", VoltageClass::V6);
    p.joint_ranges = Some(soarm_config::JointRanges {
        min: [-30.0; 6],
        max: [60.0; 6],
        middle: [15.0; 6],
    });
    ProfileStore::new(dir.path()).save(&p).unwrap();
    engine.load_profile(&mut robot).unwrap();
    assert_eq!(robot.limits()[2], JointLimit::new(-30.0, 60.0));
    // range profiles stay in the bus frame
    assert_eq!(robot.calibration(2).unwrap().offset_deg(), 0.0);
}

#[test]
fn loaded_legacy_profile_reads_zero_at_its_zero_tick() {
    let dir = tempfile::tempdir().unwrap();
    let (arm, mut robot, mut engine, _sink) = rig(dir.path());
    robot.set_limits([JointLimit::new(-10.0, 10.0); 6]);

    let mut offsets = [2048.0; 6];
    offsets[0] = 1024.0;
    let mut signs = [1.0; 6];
    signs[0] = -1.0;
    engine.import_legacy(&LegacyTickProfile {
        servos_offsets: offsets,
        servos_calibration_position: [3072.0; 6],
        servos_offsets_signs: signs,
        servos_voltage: 6.0,
        pid_gains: None,
    });
    engine.save_profile().unwrap();
    engine.load_profile(&mut robot).unwrap();

    assert_eq!(robot.calibration(0).unwrap().sign(), -1.0);
    arm.set_position(1, 1024);
    let at_zero = robot.get_joint_position(0).unwrap();
    assert!(at_zero.abs() < 1e-9, "got {at_zero}");
    // sign -1: lower ticks read as positive angles
    arm.set_position(1, 0);
    assert!((robot.get_joint_position(0).unwrap() - 90.0).abs() < 1e-9);
    // untouched joints keep their centre at zero
    assert!(robot.get_joint_position(1).unwrap().abs() < 1e-9);
    // no stored ranges: the stale limits give way to the defaults
    assert_eq!(robot.limits()[0], JointLimit::FULL_TURN);
}

#[test]
fn realtime_extremes_are_tracked_for_joints_not_yet_measured() {
    let dir = tempfile::tempdir().unwrap();
    let (arm, mut robot, mut engine, _sink) = rig(dir.path());
    to_range_discovery(&mut robot, &mut engine);

    // elbow swept while the wizard still measures the shoulder pan
    arm.set_position(3, 1024);
    engine.update_realtime_positions(&mut robot);
    arm.set_position(3, 3072);
    engine.update_realtime_positions(&mut robot);
    arm.set_position(3, 2048);

    assert!(engine.next_joint());
    assert!(engine.next_joint());
    assert_eq!(engine.session().current_joint_index, 2);
    assert!(engine.auto_record_current_joint());
    assert_eq!(engine.session().recorded_min[2], Some(-90.0));
    assert_eq!(engine.session().recorded_max[2], Some(90.0));
    assert_eq!(engine.session().current_joint_index, 3);
}

#[test]
fn tcp_offset_and_home_pose_survive_save() {
    let dir = tempfile::tempdir().unwrap();
    let (_arm, _robot, mut engine, _sink) = rig(dir.path());
    let tcp = TcpOffset {
        z: 0.12,
        ry: 90.0,
        ..TcpOffset::default()
    };
    engine.set_tcp_offset(tcp);
    engine.set_home_pose([0.0, -20.0, 30.0, 0.0, 0.0, 5.0]);
    engine.save_profile().unwrap();

    let stored = ProfileStore::new(dir.path())
        .load("so-100", "bench")
        .unwrap()
        .expect("profile on disk");
    assert_eq!(stored.tcp_offset, tcp);
    assert_eq!(stored.home_pose.joints, [0.0, -20.0, 30.0, 0.0, 0.0, 5.0]);
}
