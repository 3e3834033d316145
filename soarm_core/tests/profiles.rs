//! Voltage detection, legacy profile import and the two-pose method.

use rstest::rstest;
use soarm_config::{CalibrationProfile, LegacyTickProfile, VoltageClass};
use soarm_core::units::to_engineering;
use soarm_core::{AdapterCfg, RobotAdapter, TwoPoseCalibration, import_legacy};
use soarm_hardware::SimulatedArm;
use soarm_traits::Register;

fn connected(arm: &SimulatedArm) -> RobotAdapter {
    let mut robot = RobotAdapter::new(Box::new(arm.opener()), AdapterCfg::default());
    robot.connect("sim").unwrap();
    robot
}

#[rstest]
#[case(6.0, VoltageClass::V6)]
#[case(8.9, VoltageClass::V6)]
#[case(9.0, VoltageClass::V12)]
#[case(12.4, VoltageClass::V12)]
fn supply_voltage_selects_class(#[case] volts: f64, #[case] expected: VoltageClass) {
    let arm = SimulatedArm::six_axis();
    arm.set_supply_volts(volts);
    let mut robot = connected(&arm);
    assert_eq!(robot.detect_voltage(), expected);
}

#[test]
fn unreadable_voltage_defaults_to_six_volts() {
    let arm = SimulatedArm::six_axis();
    arm.set_supply_volts(12.0);
    for id in 1..=6 {
        arm.fail_reads(id, Register::PresentVoltage);
    }
    let mut robot = connected(&arm);
    assert_eq!(robot.detect_voltage(), VoltageClass::V6);
}

#[test]
fn partial_voltage_readings_are_averaged() {
    let arm = SimulatedArm::six_axis();
    arm.set_supply_volts(12.0);
    arm.fail_reads(1, Register::PresentVoltage);
    let mut robot = connected(&arm);
    let v = robot.read_supply_voltage().unwrap();
    assert!((v - 12.0).abs() < 1e-9);
}

#[test]
fn legacy_tick_profile_imports_with_same_zero() {
    let legacy = LegacyTickProfile::from_json(
        r#"{
            "servos_offsets": [2048, 1024, 3072, 2048, 2048, 2000],
            "servos_calibration_position": [3072, 0, 2048, 1024, 3072, 3000],
            "servos_offsets_signs": [1, -1, 1, -1, 1, 1],
            "servos_voltage": 12.0
        }"#,
    )
    .unwrap();
    let p = import_legacy(&legacy, "so-100", "old", 4096);
    assert_eq!(p.voltage_class, VoltageClass::V12);
    assert_eq!(p.joint_signs, [1.0, -1.0, 1.0, -1.0, 1.0, 1.0]);
    assert_eq!(p.joint_offsets[0], 0.0);
    for i in 0..6 {
        #[allow(clippy::cast_possible_truncation)]
        let zero_tick = legacy.servos_offsets[i] as i32;
        let deg = to_engineering(zero_tick, p.joint_offsets[i], p.joint_signs[i], 4096);
        assert!(deg.abs() < 1e-9, "joint {i}: {deg}");
    }
    p.validate().unwrap();
}

#[test]
fn radian_profile_reads_as_degrees() {
    let json = r#"{
        "model": "so-100",
        "serial_id": "old",
        "joint_offsets": [1.5707963267948966, 0, 0, 0, 0, -3.141592653589793],
        "servos_voltage": 6.0
    }"#;
    let p = CalibrationProfile::from_json(json).unwrap();
    assert!((p.joint_offsets[0] - 90.0).abs() < 1e-9);
    assert!((p.joint_offsets[5] + 180.0).abs() < 1e-9);
    assert_eq!(p.voltage_class, VoltageClass::V6);
}

#[test]
fn two_pose_against_simulated_arm() {
    let arm = SimulatedArm::six_axis();
    let mut robot = connected(&arm);
    robot.disable_torque();
    let mut cal = TwoPoseCalibration::new();
    cal.capture_home_from(&mut robot).unwrap();

    // joints 2 and 4 are mounted reversed
    let flipped = [3072, 1024, 1024, 3072, 3072, 3072];
    for (i, t) in flipped.iter().enumerate() {
        arm.set_position(u8::try_from(i + 1).unwrap(), *t);
    }
    let legacy = cal.finish_from(&mut robot).unwrap();
    assert_eq!(legacy.servos_offsets, [2048.0; 6]);
    assert_eq!(legacy.servos_offsets_signs, [1.0, -1.0, 1.0, -1.0, 1.0, 1.0]);
    assert_eq!(legacy.servos_calibration_position, flipped.map(f64::from));

    let json = legacy.to_json_pretty().unwrap();
    assert_eq!(LegacyTickProfile::from_json(&json).unwrap(), legacy);
}
