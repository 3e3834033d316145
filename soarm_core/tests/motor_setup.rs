//! Servo provisioning against the simulated chain.

use rstest::rstest;
use soarm_core::SetupError;
use soarm_core::setup::{MotorCheck, MotorSetupManager, RobotRole, SetupStatus};
use soarm_hardware::SimulatedArm;
use soarm_traits::Register;

fn manager(arm: &SimulatedArm) -> MotorSetupManager {
    MotorSetupManager::new(Box::new(arm.opener()))
}

fn single(id: u8, baud: u32) -> SimulatedArm {
    let arm = SimulatedArm::new();
    arm.add_servo(id, baud);
    arm
}

#[rstest]
#[case(1, 1_000_000)]
#[case(1, 57_600)]
#[case(9, 115_200)]
fn fresh_servo_gets_id_and_bus_baud(#[case] factory_id: u8, #[case] factory_baud: u32) {
    let arm = single(factory_id, factory_baud);
    let mut m = manager(&arm);
    let done = m.configure_motor("sim", 4, 1_000_000).unwrap();
    assert_eq!(done.previous_id, factory_id);
    assert_eq!(done.previous_baudrate, factory_baud);
    assert_eq!(arm.servo_ids(), vec![4]);
    assert_eq!(arm.servo_baudrate(4), Some(1_000_000));
    assert_eq!(arm.register(4, Register::MaxAcceleration), Some(254));
    assert_eq!(arm.register(4, Register::Lock), Some(0));
}

#[test]
fn ignored_id_write_fails_verification() {
    let arm = single(1, 1_000_000);
    arm.ignore_writes(1, Register::Id);
    let mut m = manager(&arm);
    m.begin(RobotRole::Follower);
    let err = m.configure_motor("sim", 6, 1_000_000).unwrap_err();
    assert!(matches!(
        err,
        SetupError::Verification {
            what: "motor id",
            expected: 6,
            actual: None
        }
    ));
    assert_eq!(m.session().status, SetupStatus::Error);
    assert!(m.session().error.is_some());
    assert!(!m.session().motors[0].configured);
}

#[test]
fn ignored_baud_write_fails_verification() {
    let arm = single(1, 57_600);
    arm.ignore_writes(1, Register::BaudRate);
    let err = manager(&arm).configure_motor("sim", 1, 1_000_000).unwrap_err();
    assert!(matches!(err, SetupError::Verification { what: "baud rate", .. }));
}

#[test]
fn two_servos_on_the_bus_are_refused() {
    let arm = SimulatedArm::new();
    arm.add_servo(1, 1_000_000);
    arm.add_servo(2, 1_000_000);
    let err = manager(&arm).configure_motor("sim", 3, 1_000_000).unwrap_err();
    assert_eq!(
        err,
        SetupError::MultipleMotors {
            ids: vec![1, 2],
            baudrate: 1_000_000
        }
    );
    assert_eq!(arm.servo_ids(), vec![1, 2], "nothing written");
}

#[test]
fn empty_bus_reports_no_motor() {
    let arm = SimulatedArm::new();
    let err = manager(&arm).configure_motor("sim", 3, 1_000_000).unwrap_err();
    assert!(matches!(err, SetupError::NoMotor { .. }));
}

#[test]
fn unsupported_baud_is_rejected_before_scanning() {
    let arm = single(1, 1_000_000);
    let err = manager(&arm).configure_motor("sim", 1, 9_600).unwrap_err();
    assert_eq!(err, SetupError::UnsupportedBaud(9_600));
}

#[test]
fn session_walks_motor_list_in_order() {
    let arm = SimulatedArm::new();
    let mut m = manager(&arm);
    m.begin(RobotRole::Leader);
    m.set_port("sim");
    assert_eq!(m.session().status, SetupStatus::PortFound);
    assert_eq!(m.session().current_motor().map(|s| s.name), Some("gripper"));

    for (name, id) in soarm_core::setup::SETUP_ORDER {
        assert_eq!(m.session().current_motor().map(|s| s.name), Some(name));
        arm.add_servo(1, 1_000_000);
        m.configure_motor("sim", id, 1_000_000).unwrap();
        // finished servos are parked out of the scan range
        arm.remove_servo(id);
    }
    assert_eq!(m.session().status, SetupStatus::Completed);
    assert!(m.session().motors.iter().all(|s| s.configured));

    m.reset();
    assert_eq!(m.session().status, SetupStatus::Idle);
    assert!(m.session().motors.is_empty());
}

#[test]
fn reset_motor_id_finds_servo_elsewhere() {
    let arm = single(7, 1_000_000);
    let mut m = manager(&arm);
    let done = m.reset_motor_id("sim", 2, 3, 1_000_000).unwrap();
    assert_eq!(done.previous_id, 7);
    assert_eq!(done.id, 3);
    assert_eq!(arm.servo_ids(), vec![3]);
}

#[test]
fn check_reports_single_and_multiple() {
    let arm = single(5, 500_000);
    let mut m = manager(&arm);
    assert_eq!(
        m.check_motor_id("sim").unwrap(),
        MotorCheck::Single {
            id: 5,
            baudrate: 500_000
        }
    );
    arm.add_servo(10, 19_200);
    assert_eq!(
        m.check_motor_id("sim").unwrap(),
        MotorCheck::Multiple(vec![(5, 500_000), (10, 19_200)])
    );
}

#[test]
fn open_failure_surfaces_as_setup_error() {
    let arm = single(1, 1_000_000);
    arm.set_open_error(Some("unplugged"));
    let err = manager(&arm).check_motor_id("/dev/ttyUSB0").unwrap_err();
    assert!(matches!(err, SetupError::Open { .. }));
}
