use proptest::prelude::*;
use soarm_core::limits::{self, JointLimit, RejectReason};
use soarm_core::units::{self, Convention, DEFAULT_RESOLUTION};
use soarm_core::{AdapterCfg, RobotAdapter};
use soarm_hardware::SimulatedArm;
use soarm_traits::Register;

fn sign() -> impl Strategy<Value = f64> {
    prop_oneof![Just(1.0), Just(-1.0)]
}

proptest! {
    // Ticks survive a trip through degrees for any offset and sign.
    #[test]
    fn ticks_round_trip_through_degrees(
        raw in 0i32..4096,
        offset in -180.0f64..180.0,
        s in sign(),
    ) {
        let deg = units::to_engineering(raw, offset, s, DEFAULT_RESOLUTION);
        let back = units::to_raw(deg, offset, s, DEFAULT_RESOLUTION);
        prop_assert!((back - raw).abs() <= 1, "raw {raw} -> {deg} -> {back}");
    }

    #[test]
    fn legacy_radians_round_trip(
        raw in 0i32..4096,
        offset in 0.0f64..4096.0,
        s in sign(),
    ) {
        let c = Convention::SignedOffsetRadians;
        let rad = c.to_engineering(raw, offset, s, DEFAULT_RESOLUTION);
        let back = c.to_raw(rad, offset, s, DEFAULT_RESOLUTION);
        prop_assert!((back - raw).abs() <= 1);
    }

    // The imported offset puts zero degrees on the legacy zero tick.
    #[test]
    fn legacy_offset_keeps_zero_point(offset in 0.0f64..4096.0, s in sign()) {
        let deg_off = units::legacy_ticks_offset_to_degrees(offset, s, DEFAULT_RESOLUTION);
        #[allow(clippy::cast_possible_truncation)]
        let zero_tick = offset.round() as i32;
        let deg = units::to_engineering(zero_tick, deg_off, s, DEFAULT_RESOLUTION);
        prop_assert!(deg.abs() <= 360.0 / f64::from(DEFAULT_RESOLUTION));
    }

    #[test]
    fn guard_accepts_exactly_the_closed_interval(
        lo in -180.0f64..0.0,
        width in 0.0f64..180.0,
        target in -400.0f64..400.0,
    ) {
        let lim = [JointLimit::new(lo, lo + width)];
        let res = limits::check(0, target, &lim);
        if target < lo {
            prop_assert_eq!(res.unwrap_err().reason, RejectReason::BelowMinimum);
        } else if target > lo + width {
            prop_assert_eq!(res.unwrap_err().reason, RejectReason::AboveMaximum);
        } else {
            prop_assert!(res.is_ok());
        }
    }

    // A rejected move never produces a goal write and leaves the cache alone.
    #[test]
    fn rejected_move_never_writes(joint in 0usize..6, over in 0.001f64..500.0) {
        let arm = SimulatedArm::six_axis();
        let mut robot = RobotAdapter::new(Box::new(arm.opener()), AdapterCfg::default());
        robot.connect("sim").unwrap();
        robot.set_limits([JointLimit::new(-30.0, 30.0); 6]);
        let before = robot.cached_positions();
        arm.clear_writes();
        prop_assert!(!robot.move_joint_absolute(joint, 30.0 + over));
        prop_assert!(!robot.move_joint_absolute(joint, -30.0 - over));
        prop_assert!(arm.writes().iter().all(|w| w.reg != Register::GoalPosition));
        prop_assert_eq!(robot.cached_positions(), before);
    }
}

#[test]
fn out_of_range_joint_is_rejected() {
    let lim = [JointLimit::FULL_TURN; 6];
    assert_eq!(
        limits::check(6, 0.0, &lim).unwrap_err().reason,
        RejectReason::InvalidJointIndex
    );
    assert_eq!(
        limits::check(0, f64::NAN, &lim).unwrap_err().reason,
        RejectReason::NonFinite
    );
}
