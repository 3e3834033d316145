//! Connection lifecycle, position cache and joint commands for one arm.
//!
//! The adapter owns the bus handle. Every bus fault is absorbed here: reads
//! fall back to the last good value, writes report `false`, and the fault is
//! counted and logged. Only opening the bus is fatal.

use std::sync::Arc;
use std::time::SystemTime;

use soarm_config::{JOINTS, PidGains, VoltageClass};
use soarm_traits::{BusOpener, MotorBus, Register};

use crate::config::AdapterCfg;
use crate::control::ArmControl;
use crate::error::ConnectError;
use crate::hw_error::map_bus_error;
use crate::joints::{GRIPPER, JOINT_COUNT, SERVO_IDS, joint_name, servo_id};
use crate::limits::{self, JointLimit};
use crate::logger::{EventLevel, EventSink, TracingSink};
use crate::units::JointCalibration;

/// Present while connected.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub port: String,
    pub baudrate: u32,
    pub connected_at: SystemTime,
    pub consecutive_errors: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RobotState {
    pub positions: [f64; JOINT_COUNT],
    pub limits: [JointLimit; JOINT_COUNT],
    pub connected: bool,
}

struct Link {
    bus: Box<dyn MotorBus>,
    state: ConnectionState,
}

pub struct RobotAdapter {
    opener: Box<dyn BusOpener>,
    cfg: AdapterCfg,
    link: Option<Link>,
    calibration: [JointCalibration; JOINT_COUNT],
    limits: [JointLimit; JOINT_COUNT],
    cache: [f64; JOINT_COUNT],
    errors: u64,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for RobotAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotAdapter")
            .field("connection", &self.connection())
            .field("limits", &self.limits)
            .field("cache", &self.cache)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

fn clamp_gain(v: i32) -> i32 {
    v.clamp(0, 255)
}

impl RobotAdapter {
    pub fn new(opener: Box<dyn BusOpener>, cfg: AdapterCfg) -> Self {
        Self {
            opener,
            calibration: [JointCalibration::identity(cfg.resolution); JOINT_COUNT],
            limits: cfg.default_limits,
            cfg,
            link: None,
            cache: [0.0; JOINT_COUNT],
            errors: 0,
            sink: Arc::new(TracingSink),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn set_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sink = sink;
    }

    /// Open the bus on `port`. Reconnecting first drops the current link.
    pub fn connect(&mut self, port: &str) -> Result<(), ConnectError> {
        if self.link.is_some() {
            tracing::info!(port, "reconnecting; closing current link first");
            self.disconnect();
        }
        let bus = self.opener.open(port, self.cfg.baudrate).map_err(|source| {
            tracing::error!(port, error = %source, "bus open failed");
            ConnectError::Open {
                port: port.to_owned(),
                source,
            }
        })?;
        self.reset_calibration();
        self.link = Some(Link {
            bus,
            state: ConnectionState {
                port: port.to_owned(),
                baudrate: self.cfg.baudrate,
                connected_at: SystemTime::now(),
                consecutive_errors: 0,
            },
        });
        if !self.enable_torque() {
            tracing::warn!(port, "torque enable failed after connect");
            self.sink
                .log("Connected, but torque could not be enabled", EventLevel::Warning);
        }
        tracing::info!(port, baudrate = self.cfg.baudrate, "robot connected");
        self.sink
            .log(&format!("Connected to robot on {port}"), EventLevel::Info);
        Ok(())
    }

    /// Best-effort torque off, then close. Never fails.
    pub fn disconnect(&mut self) {
        let Some(mut link) = self.link.take() else {
            return;
        };
        for id in SERVO_IDS {
            if let Err(e) = link.bus.write(id, Register::TorqueEnable, 0) {
                tracing::debug!(id, error = %e, "torque off failed during disconnect");
            }
        }
        if let Err(e) = link.bus.close() {
            tracing::warn!(error = %e, "bus close failed");
        }
        tracing::info!(port = %link.state.port, "robot disconnected");
        self.sink.log("Disconnected from robot", EventLevel::Info);
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn connection(&self) -> Option<&ConnectionState> {
        self.link.as_ref().map(|l| &l.state)
    }

    /// Bus faults absorbed since construction.
    pub fn error_count(&self) -> u64 {
        self.errors
    }

    fn note_fault(&mut self, joint: usize, op: &'static str, e: &(dyn std::error::Error + 'static)) {
        self.errors += 1;
        let consecutive = self.link.as_mut().map_or(0, |l| {
            l.state.consecutive_errors += 1;
            l.state.consecutive_errors
        });
        let fault = map_bus_error(e);
        tracing::warn!(
            joint = joint_name(joint),
            op,
            %fault,
            consecutive,
            "bus fault absorbed"
        );
    }

    fn read_register(&mut self, joint: usize, reg: Register) -> Option<i32> {
        let id = servo_id(joint)?;
        let link = self.link.as_mut()?;
        match link.bus.read(id, reg) {
            Ok(v) => {
                link.state.consecutive_errors = 0;
                Some(v)
            }
            Err(e) => {
                self.note_fault(joint, "read", e.as_ref());
                None
            }
        }
    }

    fn write_register(&mut self, joint: usize, reg: Register, value: i32) -> bool {
        let Some(id) = servo_id(joint) else {
            return false;
        };
        let Some(link) = self.link.as_mut() else {
            return false;
        };
        match link.bus.write(id, reg, value) {
            Ok(()) => {
                link.state.consecutive_errors = 0;
                true
            }
            Err(e) => {
                self.note_fault(joint, "write", e.as_ref());
                false
            }
        }
    }

    /// Live position in degrees; `None` when disconnected or the read failed.
    pub fn get_joint_position(&mut self, joint: usize) -> Option<f64> {
        let raw = self.read_register(joint, Register::PresentPosition)?;
        let deg = self.calibration[joint].to_degrees(raw);
        self.cache[joint] = deg;
        Some(deg)
    }

    /// Raw ticks of all six joints, or `None` if any read failed.
    pub fn read_raw_positions(&mut self) -> Option<[i32; JOINT_COUNT]> {
        let mut out = [0; JOINT_COUNT];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.read_register(i, Register::PresentPosition)?;
        }
        Some(out)
    }

    fn read_all_raw(&mut self) -> [Option<i32>; JOINT_COUNT] {
        let batched = self.link.as_mut().and_then(|l| {
            l.bus
                .as_sync_read()
                .map(|sr| sr.sync_read(&SERVO_IDS, Register::PresentPosition))
        });
        match batched {
            Some(Ok(values)) if values.len() == JOINT_COUNT => {
                let mut out = [None; JOINT_COUNT];
                let mut missed = false;
                for (i, v) in values.into_iter().enumerate() {
                    if v.is_none() {
                        missed = true;
                        self.errors += 1;
                        let consecutive = self.link.as_mut().map_or(0, |l| {
                            l.state.consecutive_errors += 1;
                            l.state.consecutive_errors
                        });
                        tracing::warn!(joint = joint_name(i), consecutive, "no reply in batched read");
                    }
                    out[i] = v;
                }
                if let Some(l) = self.link.as_mut().filter(|_| !missed) {
                    l.state.consecutive_errors = 0;
                }
                return out;
            }
            Some(Ok(values)) => {
                tracing::warn!(got = values.len(), "batched read returned wrong length");
            }
            Some(Err(e)) => self.note_fault(0, "sync_read", e.as_ref()),
            None => {}
        }
        std::array::from_fn(|i| self.read_register(i, Register::PresentPosition))
    }

    /// Best-effort snapshot; misses are filled from the cache.
    pub fn get_state(&mut self) -> RobotState {
        if self.link.is_some() {
            let raw = self.read_all_raw();
            for (i, r) in raw.iter().enumerate() {
                if let Some(r) = r {
                    self.cache[i] = self.calibration[i].to_degrees(*r);
                }
            }
        }
        RobotState {
            positions: self.cache,
            limits: self.limits,
            connected: self.is_connected(),
        }
    }

    /// Last known positions without touching the bus.
    pub fn cached_positions(&self) -> [f64; JOINT_COUNT] {
        self.cache
    }

    fn ensure_torque(&mut self, joint: usize) {
        if self.read_register(joint, Register::TorqueEnable) != Some(1) {
            tracing::debug!(joint = joint_name(joint), "auto-enabling torque");
            self.write_register(joint, Register::TorqueEnable, 1);
        }
    }

    /// Command an absolute angle. Rejected targets never reach the bus.
    pub fn move_joint_absolute(&mut self, joint: usize, degrees: f64) -> bool {
        if let Err(v) = limits::check(joint, degrees, &self.limits) {
            tracing::warn!(%v, "move rejected by joint limits");
            self.sink
                .log(&format!("Movement rejected: {v}"), EventLevel::Warning);
            return false;
        }
        if !self.is_connected() {
            tracing::warn!(joint = joint_name(joint), "move requested while disconnected");
            return false;
        }
        self.ensure_torque(joint);
        let max_tick = i32::try_from(self.cfg.resolution).map_or(i32::MAX, |r| r - 1);
        let wanted = self.calibration[joint].to_ticks(degrees);
        let ticks = wanted.clamp(0, max_tick);
        if ticks != wanted {
            tracing::debug!(joint = joint_name(joint), degrees, wanted, ticks, "goal clamped to encoder range");
        }
        if self.write_register(joint, Register::GoalPosition, ticks) {
            // the cache holds what the servo was told, not the request
            self.cache[joint] = if ticks == wanted {
                degrees
            } else {
                self.calibration[joint].to_degrees(ticks)
            };
            tracing::trace!(joint = joint_name(joint), degrees, ticks, "goal written");
            true
        } else {
            false
        }
    }

    /// Current position (live, else cached) plus `delta`.
    pub fn move_joint_delta(&mut self, joint: usize, delta: f64) -> bool {
        if joint >= JOINT_COUNT {
            return self.move_joint_absolute(joint, delta);
        }
        let current = self
            .get_joint_position(joint)
            .unwrap_or(self.cache[joint]);
        self.move_joint_absolute(joint, current + delta)
    }

    fn set_torque_all(&mut self, on: bool) -> bool {
        if !self.is_connected() {
            return false;
        }
        let mut ok = true;
        for i in 0..JOINT_COUNT {
            ok &= self.write_register(i, Register::TorqueEnable, i32::from(on));
        }
        ok
    }

    pub fn enable_torque(&mut self) -> bool {
        self.set_torque_all(true)
    }

    pub fn disable_torque(&mut self) -> bool {
        self.set_torque_all(false)
    }

    /// Mean supply voltage over the joints that answered.
    pub fn read_supply_voltage(&mut self) -> Option<f64> {
        let readings: Vec<f64> = (0..JOINT_COUNT)
            .filter_map(|i| self.read_register(i, Register::PresentVoltage))
            .map(|dv| f64::from(dv) / 10.0)
            .collect();
        if readings.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let avg = readings.iter().sum::<f64>() / readings.len() as f64;
        Some(avg)
    }

    /// 12V when the mean supply is at least 9 V; 6V otherwise or when unreadable.
    pub fn detect_voltage(&mut self) -> VoltageClass {
        match self.read_supply_voltage() {
            Some(v) => {
                let class = VoltageClass::from_volts(v);
                tracing::info!(volts = v, %class, "supply voltage detected");
                class
            }
            None => {
                tracing::warn!("no voltage readings; assuming 6V");
                VoltageClass::V6
            }
        }
    }

    pub fn set_pid_gains(&mut self, joint: usize, gains: PidGains) -> bool {
        let p = self.write_register(joint, Register::PCoefficient, clamp_gain(gains.p_gain));
        let i = self.write_register(joint, Register::ICoefficient, clamp_gain(gains.i_gain));
        let d = self.write_register(joint, Register::DCoefficient, clamp_gain(gains.d_gain));
        p && i && d
    }

    pub fn apply_pid_gains(&mut self, gains: &[PidGains; JOINTS]) -> bool {
        if !self.is_connected() {
            return false;
        }
        let mut ok = true;
        for (i, g) in gains.iter().enumerate() {
            ok &= self.set_pid_gains(i, *g);
        }
        ok
    }

    /// Map `fraction` in [0, 1] onto the gripper's limit range.
    pub fn set_gripper(&mut self, fraction: f64) -> bool {
        if fraction.is_nan() {
            return false;
        }
        let f = fraction.clamp(0.0, 1.0);
        let lim = self.limits[GRIPPER];
        self.move_joint_absolute(GRIPPER, lim.min + f * (lim.max - lim.min))
    }

    pub fn limits(&self) -> &[JointLimit; JOINT_COUNT] {
        &self.limits
    }

    pub fn set_limits(&mut self, limits: [JointLimit; JOINT_COUNT]) {
        tracing::debug!(?limits, "joint limits replaced");
        self.limits = limits;
    }

    pub fn reset_limits(&mut self) {
        self.limits = self.cfg.default_limits;
    }

    pub fn calibration(&self, joint: usize) -> Option<&JointCalibration> {
        self.calibration.get(joint)
    }

    pub fn set_calibration(&mut self, joint: usize, cal: JointCalibration) -> bool {
        match self.calibration.get_mut(joint) {
            Some(slot) => {
                *slot = cal;
                true
            }
            None => false,
        }
    }

    /// Bus frame for every joint: zero offset, positive sign.
    pub fn reset_calibration(&mut self) {
        self.calibration = [JointCalibration::identity(self.cfg.resolution); JOINT_COUNT];
    }
}

impl Drop for RobotAdapter {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl ArmControl for RobotAdapter {
    fn is_connected(&self) -> bool {
        Self::is_connected(self)
    }

    fn read_joint(&mut self, joint: usize) -> Option<f64> {
        self.get_joint_position(joint)
    }

    fn move_joint_absolute(&mut self, joint: usize, degrees: f64) -> bool {
        Self::move_joint_absolute(self, joint, degrees)
    }

    fn set_gripper(&mut self, fraction: f64) -> bool {
        Self::set_gripper(self, fraction)
    }

    fn enable_torque(&mut self) -> bool {
        Self::enable_torque(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soarm_hardware::SimulatedArm;

    fn connected() -> (SimulatedArm, RobotAdapter) {
        let arm = SimulatedArm::six_axis();
        let mut robot = RobotAdapter::new(Box::new(arm.opener()), AdapterCfg::default());
        robot.connect("sim").unwrap();
        (arm, robot)
    }

    #[test]
    fn connect_enables_torque() {
        let (arm, robot) = connected();
        assert!(robot.is_connected());
        for id in 1..=6 {
            assert_eq!(arm.register(id, Register::TorqueEnable), Some(1));
        }
    }

    #[test]
    fn failed_read_keeps_cache_and_counts() {
        let (arm, mut robot) = connected();
        arm.set_position(2, 3072);
        assert_eq!(robot.get_joint_position(1), Some(90.0));
        arm.fail_reads(2, Register::PresentPosition);
        assert_eq!(robot.get_joint_position(1), None);
        assert_eq!(robot.error_count(), 1);
        assert_eq!(robot.cached_positions()[1], 90.0);
        assert_eq!(robot.connection().map(|c| c.consecutive_errors), Some(1));
    }

    #[test]
    fn batched_misses_count_as_consecutive_errors() {
        let (arm, mut robot) = connected();
        arm.set_batched(true);
        arm.fail_reads(4, Register::PresentPosition);
        robot.get_state();
        robot.get_state();
        assert_eq!(robot.error_count(), 2);
        assert_eq!(robot.connection().map(|c| c.consecutive_errors), Some(2));

        arm.clear_faults();
        robot.get_state();
        assert_eq!(robot.connection().map(|c| c.consecutive_errors), Some(0));
    }

    #[test]
    fn half_turn_goal_caches_the_clamped_tick() {
        let (arm, mut robot) = connected();
        assert!(robot.move_joint_absolute(0, 180.0));
        assert_eq!(arm.register(1, Register::GoalPosition), Some(4095));
        let cached = robot.cached_positions()[0];
        assert!((cached - 4095.0f64.mul_add(360.0 / 4096.0, -180.0)).abs() < 1e-9, "got {cached}");
        assert!(cached < 180.0);
    }

    #[test]
    fn gripper_fraction_maps_onto_limits() {
        let (arm, mut robot) = connected();
        let mut limits = *robot.limits();
        limits[GRIPPER] = JointLimit::new(0.0, 90.0);
        robot.set_limits(limits);
        assert!(robot.set_gripper(1.0));
        assert_eq!(arm.position(6), Some(3072));
        assert!(robot.set_gripper(-3.0));
        assert_eq!(arm.position(6), Some(2048));
        assert!(!robot.set_gripper(f64::NAN));
    }

    #[test]
    fn pid_gains_are_clamped() {
        let (arm, mut robot) = connected();
        let g = PidGains {
            p_gain: 400,
            i_gain: -3,
            d_gain: 32,
        };
        assert!(robot.apply_pid_gains(&[g; JOINTS]));
        assert_eq!(arm.register(3, Register::PCoefficient), Some(255));
        assert_eq!(arm.register(3, Register::ICoefficient), Some(0));
        assert_eq!(arm.register(3, Register::DCoefficient), Some(32));
    }
}
