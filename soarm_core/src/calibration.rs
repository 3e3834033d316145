//! Range-discovery calibration wizard.
//!
//! Step 0 frees the arm, step 1 shows the limit midpoints, step 2 records
//! each joint's range while the operator moves it by hand, and step 3 turns
//! the ranges into offsets and limits and saves the profile. The session is
//! only mutated through `&mut self`, so one wizard runs at a time.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use soarm_config::{
    CalibrationProfile, JointRanges, LegacyTickProfile, ProfileStore, TcpOffset, VoltageClass,
};
use soarm_traits::{Clock, MonotonicClock};

use crate::adapter::RobotAdapter;
use crate::config::RobotIdentity;
use crate::error::CalibrationError;
use crate::joints::{JOINT_COUNT, joint_name};
use crate::limits::JointLimit;
use crate::logger::{EventLevel, EventSink, TracingSink};
use crate::status::StepReport;
use crate::units::{DEFAULT_RESOLUTION, JointCalibration, legacy_ticks_offset_to_degrees};

pub const MAX_STEPS: u8 = 3;
/// Home moves smaller than this are skipped.
const HOME_TOLERANCE_DEG: f64 = 0.1;
const DEFAULT_HOME_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WizardStep {
    #[default]
    Init,
    ConfirmMiddle,
    RangeDiscovery,
    Commit,
}

impl WizardStep {
    pub const fn index(self) -> u8 {
        match self {
            Self::Init => 0,
            Self::ConfirmMiddle => 1,
            Self::RangeDiscovery => 2,
            Self::Commit => 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationSession {
    pub step: WizardStep,
    /// Joint being measured in step 2; 6 once every joint is done.
    pub current_joint_index: usize,
    pub recorded_min: [Option<f64>; JOINT_COUNT],
    pub recorded_max: [Option<f64>; JOINT_COUNT],
    pub realtime_min: [Option<f64>; JOINT_COUNT],
    pub realtime_max: [Option<f64>; JOINT_COUNT],
    pub realtime_current: [f64; JOINT_COUNT],
}

/// Result of `update_realtime_positions`.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeSnapshot {
    pub current_joint_index: usize,
    pub positions: [f64; JOINT_COUNT],
    pub min_positions: [Option<f64>; JOINT_COUNT],
    pub max_positions: [Option<f64>; JOINT_COUNT],
    pub recorded_min: [Option<f64>; JOINT_COUNT],
    pub recorded_max: [Option<f64>; JOINT_COUNT],
}

/// Canonical profile from a two-pose tick profile.
pub fn import_legacy(
    legacy: &LegacyTickProfile,
    model: &str,
    serial_id: &str,
    resolution: u32,
) -> CalibrationProfile {
    let voltage = VoltageClass::from_volts(legacy.servos_voltage);
    let mut p = CalibrationProfile::default_for(model, serial_id, voltage);
    for i in 0..JOINT_COUNT {
        let sign = legacy.servos_offsets_signs[i];
        p.joint_signs[i] = sign;
        p.joint_offsets[i] =
            legacy_ticks_offset_to_degrees(legacy.servos_offsets[i], sign, resolution);
    }
    if let Some(g) = legacy.pid_gains {
        p.pid_gains = g;
    }
    if legacy.servos_voltage > 0.0 {
        p.servos_voltage = legacy.servos_voltage;
    }
    p
}

pub struct CalibrationEngine {
    identity: RobotIdentity,
    store: ProfileStore,
    profile: CalibrationProfile,
    session: CalibrationSession,
    clock: Arc<dyn Clock>,
    home_settle: Duration,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for CalibrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalibrationEngine")
            .field("identity", &self.identity)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_owned(), |d| format!("{d:.1}"))
}

impl CalibrationEngine {
    pub fn new(identity: RobotIdentity) -> Self {
        Self {
            store: ProfileStore::new(identity.profile_dir.clone()),
            profile: CalibrationProfile::default_for(
                &identity.model,
                &identity.serial_id,
                VoltageClass::V6,
            ),
            identity,
            session: CalibrationSession::default(),
            clock: Arc::new(MonotonicClock::new()),
            home_settle: DEFAULT_HOME_SETTLE,
            sink: Arc::new(TracingSink),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn set_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sink = sink;
    }

    /// Pause after each home move.
    pub fn set_home_settle(&mut self, d: Duration) {
        self.home_settle = d;
    }

    pub fn profile(&self) -> &CalibrationProfile {
        &self.profile
    }

    pub fn set_profile(&mut self, profile: CalibrationProfile) {
        self.profile = profile;
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn session(&self) -> &CalibrationSession {
        &self.session
    }

    pub fn step(&self) -> WizardStep {
        self.session.step
    }

    /// Owned copy of the wizard state, for callers on another thread.
    pub fn status(&self) -> CalibrationSession {
        self.session.clone()
    }

    fn log(&self, message: &str, level: EventLevel) {
        self.sink.log(message, level);
    }

    pub fn reset_wizard(&mut self) {
        self.session = CalibrationSession::default();
        self.log("Calibration wizard reset", EventLevel::Info);
    }

    /// Advance the wizard by one step.
    pub fn calibrate_step(&mut self, robot: &mut RobotAdapter) -> StepReport {
        if !robot.is_connected() {
            self.session = CalibrationSession::default();
            self.log("Robot not connected. Cannot calibrate.", EventLevel::Error);
            return StepReport::error("Robot not connected. Cannot calibrate.");
        }
        match self.session.step {
            WizardStep::Init => self.begin(robot),
            WizardStep::ConfirmMiddle => self.confirm_middle(robot),
            WizardStep::RangeDiscovery => self.range_discovery(),
            WizardStep::Commit => self.commit(robot),
        }
    }

    fn load_matching_profile(&self, voltage: VoltageClass) -> CalibrationProfile {
        let (model, serial) = (&self.identity.model, &self.identity.serial_id);
        match self.store.load(model, serial) {
            Ok(Some(p)) if p.voltage_class == voltage => {
                tracing::info!(model, serial, "using stored profile");
                p
            }
            Ok(Some(p)) => {
                self.log(
                    &format!(
                        "Stored profile is for {}, detected {voltage}; starting from defaults",
                        p.voltage_class
                    ),
                    EventLevel::Warning,
                );
                CalibrationProfile::default_for(model, serial, voltage)
            }
            Ok(None) => CalibrationProfile::default_for(model, serial, voltage),
            Err(e) => {
                self.log(
                    &format!("Stored profile unreadable ({e}); starting from defaults"),
                    EventLevel::Warning,
                );
                CalibrationProfile::default_for(model, serial, voltage)
            }
        }
    }

    fn begin(&mut self, robot: &mut RobotAdapter) -> StepReport {
        let voltage = robot.detect_voltage();
        self.log(&format!("Detected voltage: {voltage}"), EventLevel::Info);
        self.profile = self.load_matching_profile(voltage);
        if !robot.apply_pid_gains(&self.profile.pid_gains) {
            self.log("Could not apply PID gains to every joint", EventLevel::Warning);
        }
        robot.reset_calibration();
        if robot.disable_torque() {
            self.log(
                "Torque disabled. You can now move the robot manually.",
                EventLevel::Info,
            );
        } else {
            self.log("Torque disable failed on some joints", EventLevel::Warning);
        }
        self.session = CalibrationSession {
            step: WizardStep::ConfirmMiddle,
            ..CalibrationSession::default()
        };
        StepReport::in_progress(format!(
            "Step 1/{MAX_STEPS}: move every joint to the middle of its range by hand, \
             then continue."
        ))
    }

    fn confirm_middle(&mut self, robot: &mut RobotAdapter) -> StepReport {
        let state = robot.get_state();
        let middles: Vec<String> = state
            .limits
            .iter()
            .map(|l| format!("{:.1}", l.midpoint()))
            .collect();
        let current: Vec<String> = state.positions.iter().map(|p| format!("{p:.1}")).collect();
        self.log(&format!("Middle positions: [{}]", middles.join(", ")), EventLevel::Info);
        self.log(&format!("Current positions: [{}]", current.join(", ")), EventLevel::Info);
        self.session.current_joint_index = 0;
        self.session.step = WizardStep::RangeDiscovery;
        StepReport::in_progress(self.measuring_message())
    }

    fn measuring_message(&self) -> String {
        let i = self.session.current_joint_index;
        format!(
            "Step 2/{MAX_STEPS}: measuring {} (joint {}/{JOINT_COUNT}). \
             Move it to its minimum and record, then to its maximum and record.",
            joint_name(i),
            i + 1
        )
    }

    fn range_discovery(&mut self) -> StepReport {
        if self.session.current_joint_index < JOINT_COUNT {
            return StepReport::in_progress(self.measuring_message());
        }
        self.session.step = WizardStep::Commit;
        let ranges: Vec<String> = (0..JOINT_COUNT)
            .map(|i| {
                format!(
                    "  {}: {} .. {}",
                    joint_name(i),
                    fmt_opt(self.session.recorded_min[i]),
                    fmt_opt(self.session.recorded_max[i])
                )
            })
            .collect();
        StepReport::in_progress(format!(
            "Step 3/{MAX_STEPS}: all joints measured.\n{}\nContinue to save the calibration.",
            ranges.join("\n")
        ))
    }

    fn commit(&mut self, robot: &mut RobotAdapter) -> StepReport {
        let mut min = [0.0; JOINT_COUNT];
        let mut max = [0.0; JOINT_COUNT];
        for i in 0..JOINT_COUNT {
            let (lo, hi) = match (self.session.recorded_min[i], self.session.recorded_max[i]) {
                (Some(lo), Some(hi)) if lo > hi => {
                    self.log(
                        &format!("{}: recorded min above max; swapping", joint_name(i)),
                        EventLevel::Warning,
                    );
                    (hi, lo)
                }
                (Some(lo), Some(hi)) => (lo, hi),
                (lo, hi) => {
                    self.log(
                        &format!("{}: range incomplete; defaulting to full turn", joint_name(i)),
                        EventLevel::Warning,
                    );
                    (
                        lo.unwrap_or(JointLimit::FULL_TURN.min),
                        hi.unwrap_or(JointLimit::FULL_TURN.max),
                    )
                }
            };
            min[i] = lo;
            max[i] = hi;
        }
        let middle: [f64; JOINT_COUNT] = std::array::from_fn(|i| (min[i] + max[i]) / 2.0);

        let mut profile = self.profile.clone();
        profile.model.clone_from(&self.identity.model);
        profile.serial_id.clone_from(&self.identity.serial_id);
        profile.joint_offsets = middle.map(|m| -m);
        profile.joint_ranges = Some(JointRanges { min, max, middle });

        let path = match self.store.save(&profile) {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(error = %e, "calibration profile not saved");
                self.log(&format!("Failed to save calibration: {e}"), EventLevel::Error);
                return StepReport::error(format!(
                    "Failed to save calibration: {e}. Fix the problem and continue to retry."
                ));
            }
        };
        self.profile = profile;

        let limits: [JointLimit; JOINT_COUNT] = std::array::from_fn(|i| JointLimit::new(min[i], max[i]));
        robot.set_limits(limits);
        self.log("Joint limits updated from calibration", EventLevel::Success);
        if !robot.enable_torque() {
            self.log("Torque re-enable failed on some joints", EventLevel::Warning);
        }
        self.log(
            &format!("Calibration saved to {}", path.display()),
            EventLevel::Success,
        );
        self.session = CalibrationSession::default();

        let summary: Vec<String> = (0..JOINT_COUNT)
            .map(|i| {
                format!(
                    "  {}: {:.1} .. {:.1} (middle {:.1})",
                    joint_name(i),
                    min[i],
                    max[i],
                    middle[i]
                )
            })
            .collect();
        StepReport::success(format!(
            "Calibration completed.\n{}",
            summary.join("\n")
        ))
    }

    /// Widen realtime min/max for every joint from a fresh state read.
    pub fn update_realtime_positions(&mut self, robot: &mut RobotAdapter) -> RealtimeSnapshot {
        if self.session.step != WizardStep::RangeDiscovery {
            return RealtimeSnapshot {
                current_joint_index: self.session.current_joint_index,
                positions: [0.0; JOINT_COUNT],
                min_positions: [None; JOINT_COUNT],
                max_positions: [None; JOINT_COUNT],
                recorded_min: self.session.recorded_min,
                recorded_max: self.session.recorded_max,
            };
        }
        let positions = robot.get_state().positions;
        let s = &mut self.session;
        s.realtime_current = positions;
        for (i, &pos) in positions.iter().enumerate() {
            if s.realtime_min[i].is_none_or(|m| pos < m) {
                s.realtime_min[i] = Some(pos);
            }
            if s.realtime_max[i].is_none_or(|m| pos > m) {
                s.realtime_max[i] = Some(pos);
            }
        }
        RealtimeSnapshot {
            current_joint_index: s.current_joint_index,
            positions,
            min_positions: s.realtime_min,
            max_positions: s.realtime_max,
            recorded_min: s.recorded_min,
            recorded_max: s.recorded_max,
        }
    }

    fn measuring_joint(&self) -> Option<usize> {
        let i = self.session.current_joint_index;
        (self.session.step == WizardStep::RangeDiscovery && i < JOINT_COUNT).then_some(i)
    }

    fn clear_realtime_and_advance(&mut self, i: usize) {
        self.session.realtime_min[i] = None;
        self.session.realtime_max[i] = None;
        self.session.current_joint_index += 1;
    }

    fn live_position(robot: &mut RobotAdapter, i: usize) -> f64 {
        robot.get_state().positions[i]
    }

    /// Record the current joint's minimum: the tracked minimum, else the
    /// live position.
    pub fn record_joint_min(&mut self, robot: &mut RobotAdapter) -> bool {
        let Some(i) = self.measuring_joint() else {
            return false;
        };
        let value = self.session.realtime_min[i].unwrap_or_else(|| Self::live_position(robot, i));
        self.session.recorded_min[i] = Some(value);
        self.log(
            &format!("{} minimum position recorded: {value:.2}", joint_name(i)),
            EventLevel::Info,
        );
        true
    }

    /// Record the current joint's maximum. Advances to the next joint only
    /// when its minimum is already recorded.
    pub fn record_joint_max(&mut self, robot: &mut RobotAdapter) -> bool {
        let Some(i) = self.measuring_joint() else {
            return false;
        };
        let value = self.session.realtime_max[i].unwrap_or_else(|| Self::live_position(robot, i));
        self.session.recorded_max[i] = Some(value);
        self.log(
            &format!("{} maximum position recorded: {value:.2}", joint_name(i)),
            EventLevel::Info,
        );
        if self.session.recorded_min[i].is_some() {
            self.clear_realtime_and_advance(i);
        }
        true
    }

    /// Commit the tracked range of the current joint; true when both ends
    /// are recorded and the wizard moved on.
    pub fn auto_record_current_joint(&mut self) -> bool {
        let Some(i) = self.measuring_joint() else {
            return false;
        };
        if let Some(v) = self.session.realtime_min[i] {
            self.session.recorded_min[i] = Some(v);
        }
        if let Some(v) = self.session.realtime_max[i] {
            self.session.recorded_max[i] = Some(v);
        }
        match (self.session.recorded_min[i], self.session.recorded_max[i]) {
            (Some(lo), Some(hi)) => {
                self.log(
                    &format!("{} auto-recorded: {lo:.2} .. {hi:.2}", joint_name(i)),
                    EventLevel::Info,
                );
                self.clear_realtime_and_advance(i);
                true
            }
            _ => false,
        }
    }

    /// Skip the current joint.
    pub fn next_joint(&mut self) -> bool {
        let Some(i) = self.measuring_joint() else {
            return false;
        };
        self.clear_realtime_and_advance(i);
        true
    }

    /// Drive every joint to the profile's home pose.
    pub fn home(&mut self, robot: &mut RobotAdapter) -> bool {
        if !robot.is_connected() {
            self.log("Cannot move to home: robot not connected", EventLevel::Error);
            return false;
        }
        self.log("Starting home movement", EventLevel::Info);
        let targets = self.profile.home_pose.joints;
        let mut ok = true;
        for (i, target) in targets.iter().enumerate() {
            let current = robot.get_state().positions[i];
            let delta = target - current;
            if delta.abs() <= HOME_TOLERANCE_DEG {
                tracing::debug!(joint = joint_name(i), "already at home");
                continue;
            }
            if robot.move_joint_delta(i, delta) {
                self.clock.sleep(self.home_settle);
            } else {
                self.log(
                    &format!("Failed to move {} to home position", joint_name(i)),
                    EventLevel::Error,
                );
                ok = false;
            }
        }
        if ok {
            self.log("Home movement completed", EventLevel::Success);
        } else {
            self.log("Home movement completed with errors", EventLevel::Warning);
        }
        ok
    }

    /// Take the current pose as zero: offsets become the negated positions.
    pub fn zero_joints(&mut self, robot: &mut RobotAdapter) -> bool {
        if !robot.is_connected() {
            self.log("Cannot zero joints: robot not connected", EventLevel::Error);
            return false;
        }
        let positions = robot.get_state().positions;
        self.profile.joint_offsets = positions.map(|p| -p);
        self.log("Joints zeroed", EventLevel::Success);
        true
    }

    pub fn set_tcp_offset(&mut self, offset: TcpOffset) {
        self.profile.tcp_offset = offset;
    }

    pub fn set_home_pose(&mut self, joints: [f64; JOINT_COUNT]) {
        self.profile.home_pose.joints = joints;
    }

    pub fn save_profile(&self) -> Result<PathBuf, CalibrationError> {
        let mut p = self.profile.clone();
        p.model.clone_from(&self.identity.model);
        p.serial_id.clone_from(&self.identity.serial_id);
        Ok(self.store.save(&p)?)
    }

    /// Load the stored profile into the adapter.
    ///
    /// Range profiles from the wizard keep the bus frame and install their
    /// ranges as joint limits. Profiles without ranges (legacy imports, two-pose
    /// results, zeroed poses) install their offsets and signs instead, with
    /// the configured default limits.
    pub fn load_profile(&mut self, robot: &mut RobotAdapter) -> Result<(), CalibrationError> {
        let (model, serial) = (&self.identity.model, &self.identity.serial_id);
        let profile =
            self.store
                .load(model, serial)?
                .ok_or_else(|| CalibrationError::MissingProfile {
                    model: model.clone(),
                    serial_id: serial.clone(),
                })?;
        if let Some(r) = &profile.joint_ranges {
            robot.reset_calibration();
            robot.set_limits(std::array::from_fn(|i| JointLimit::new(r.min[i], r.max[i])));
        } else {
            robot.reset_limits();
            self.install_offsets(robot, &profile);
        }
        if robot.is_connected() && !robot.apply_pid_gains(&profile.pid_gains) {
            self.log("Could not apply PID gains to every joint", EventLevel::Warning);
        }
        self.profile = profile;
        self.log("Calibration profile loaded", EventLevel::Success);
        Ok(())
    }

    fn install_offsets(&self, robot: &mut RobotAdapter, profile: &CalibrationProfile) {
        for i in 0..JOINT_COUNT {
            let resolution = robot
                .calibration(i)
                .map_or(DEFAULT_RESOLUTION, JointCalibration::resolution);
            match JointCalibration::new(profile.joint_offsets[i], profile.joint_signs[i], resolution) {
                Ok(cal) => {
                    robot.set_calibration(i, cal);
                }
                Err(e) => self.log(
                    &format!("{} keeps the bus frame: {e}", joint_name(i)),
                    EventLevel::Warning,
                ),
            }
        }
    }

    /// Replace the profile with one imported from a two-pose tick file.
    pub fn import_legacy(&mut self, legacy: &LegacyTickProfile) {
        self.profile = import_legacy(
            legacy,
            &self.identity.model,
            &self.identity.serial_id,
            DEFAULT_RESOLUTION,
        );
        self.log("Legacy profile imported", EventLevel::Info);
    }
}
