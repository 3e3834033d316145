use rstest::rstest;
use soarm_hardware::{SimPorts, SimulatedArm};
use soarm_traits::{BusOpener, DEFAULT_BAUDRATE, PortEnumerator, PortInfo, Register, baud_code};

#[rstest]
#[case(1_000_000, true)]
#[case(500_000, false)]
#[case(19_200, false)]
fn servo_answers_only_at_its_own_baud(#[case] bus_baud: u32, #[case] answers: bool) {
    let arm = SimulatedArm::new();
    arm.add_servo(1, DEFAULT_BAUDRATE);
    let mut bus = arm.opener().open("sim", bus_baud).unwrap();
    assert_eq!(bus.ping(1), answers);
    assert_eq!(bus.read(1, Register::PresentPosition).is_ok(), answers);
}

#[test]
fn baud_change_takes_effect_after_unlock() {
    let arm = SimulatedArm::new();
    arm.add_servo(1, DEFAULT_BAUDRATE);
    let mut bus = arm.opener().open("sim", DEFAULT_BAUDRATE).unwrap();
    bus.write(1, Register::Lock, 0).unwrap();
    bus.write(1, Register::BaudRate, baud_code(115_200).unwrap())
        .unwrap();
    assert!(!bus.ping(1));
    bus.set_baudrate(115_200).unwrap();
    assert!(bus.ping(1));
    assert_eq!(arm.servo_baudrate(1), Some(115_200));
}

#[test]
fn batched_reads_report_missing_servos() {
    let arm = SimulatedArm::six_axis();
    arm.set_batched(true);
    arm.fail_reads(3, Register::PresentPosition);
    let mut bus = arm.opener().open("sim", DEFAULT_BAUDRATE).unwrap();
    let sr = bus.as_sync_read().expect("batched capability");
    let got = sr
        .sync_read(&[1, 2, 3], Register::PresentPosition)
        .unwrap();
    assert_eq!(got, vec![Some(2048), Some(2048), None]);
}

#[test]
fn unbatched_bus_has_no_sync_read() {
    let arm = SimulatedArm::six_axis();
    let mut bus = arm.opener().open("sim", DEFAULT_BAUDRATE).unwrap();
    assert!(bus.as_sync_read().is_none());
}

#[test]
fn open_error_is_reported() {
    let arm = SimulatedArm::six_axis();
    arm.set_open_error(Some("device busy"));
    let err = arm.opener().open("/dev/ttyUSB0", DEFAULT_BAUDRATE).err().unwrap();
    assert!(err.to_string().contains("device busy"));
    assert_eq!(arm.open_count(), 0);
}

#[test]
fn supply_voltage_is_in_decivolts() {
    let arm = SimulatedArm::six_axis();
    arm.set_supply_volts(12.1);
    assert_eq!(arm.register(4, Register::PresentVoltage), Some(121));
}

#[test]
fn sim_ports_plug_and_unplug() {
    let ports = SimPorts::new(vec![PortInfo::new("/dev/ttyS0")]);
    ports.plug(PortInfo::new("/dev/ttyACM0").with_usb(0x1a86, 21971));
    assert_eq!(ports.ports().unwrap().len(), 2);
    ports.unplug("/dev/ttyACM0");
    let names: Vec<_> = ports.ports().unwrap().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["/dev/ttyS0".to_string()]);
}
