//! Two-pose tick calibration, kept for arms calibrated the old way.
//!
//! The operator holds the arm at the home pose, then at a reference pose
//! whose joint angles are known. Tick offsets come from the first capture,
//! signs from the direction each joint moved.

use std::f64::consts::FRAC_PI_2;

use soarm_config::{LegacyTickProfile, VoltageClass};

use crate::adapter::RobotAdapter;
use crate::error::CalibrationError;
use crate::joints::JOINT_COUNT;

/// Joint angles of the reference pose, radians.
pub const REFERENCE_POSE: [f64; JOINT_COUNT] =
    [FRAC_PI_2, FRAC_PI_2, -FRAC_PI_2, -FRAC_PI_2, FRAC_PI_2, FRAC_PI_2];

#[derive(Debug, Clone, Default)]
pub struct TwoPoseCalibration {
    home: Option<[i32; JOINT_COUNT]>,
}

impl TwoPoseCalibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn home_captured(&self) -> bool {
        self.home.is_some()
    }

    pub fn capture_home(&mut self, ticks: [i32; JOINT_COUNT]) {
        tracing::info!(?ticks, "home pose captured");
        self.home = Some(ticks);
    }

    /// Build the profile from the reference-pose ticks.
    ///
    /// Every joint must have moved between the two captures.
    pub fn finish(
        &mut self,
        calib_ticks: [i32; JOINT_COUNT],
        voltage: VoltageClass,
    ) -> Result<LegacyTickProfile, CalibrationError> {
        let home = self.home.ok_or(CalibrationError::HomeNotCaptured)?;
        let mut signs = [1.0; JOINT_COUNT];
        for i in 0..JOINT_COUNT {
            let diff = f64::from(calib_ticks[i] - home[i]);
            if diff == 0.0 {
                return Err(CalibrationError::PoseUnchanged { joint: i });
            }
            signs[i] = (diff / REFERENCE_POSE[i]).signum();
        }
        self.home = None;
        tracing::info!(?signs, "two-pose signs computed");
        Ok(LegacyTickProfile {
            servos_offsets: home.map(f64::from),
            servos_calibration_position: calib_ticks.map(f64::from),
            servos_offsets_signs: signs,
            servos_voltage: voltage.nominal_volts(),
            pid_gains: None,
        })
    }

    /// Read the raw pose from the arm and capture it as home.
    pub fn capture_home_from(&mut self, robot: &mut RobotAdapter) -> Result<(), CalibrationError> {
        let ticks = robot.read_raw_positions().ok_or(CalibrationError::ReadFailed)?;
        self.capture_home(ticks);
        Ok(())
    }

    /// Read the raw reference pose from the arm and finish.
    pub fn finish_from(
        &mut self,
        robot: &mut RobotAdapter,
    ) -> Result<LegacyTickProfile, CalibrationError> {
        let ticks = robot.read_raw_positions().ok_or(CalibrationError::ReadFailed)?;
        let voltage = robot.detect_voltage();
        self.finish(ticks, voltage)
    }
}
