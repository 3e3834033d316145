//! Keyboard teleoperation.
//!
//! Keys map to actions through a fixed table. Motion keys act only while the
//! session is running, the emergency stop is released, and the mode matches;
//! `m` (mode) and space (e-stop) work at any time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use soarm_traits::{Clock, MonotonicClock};

use crate::config::ControlCfg;
use crate::error::ControlError;
use crate::joints::{GRIPPER, JOINT_COUNT, joint_name};

pub const SPEED_MIN: f64 = 0.1;
pub const SPEED_MAX: f64 = 2.0;
const SPEED_UP: f64 = 1.1;
const SPEED_DOWN: f64 = 0.9;
/// Rotation axes move this fraction of a translation step.
const ROTATION_SCALE: f64 = 0.1;

/// Joint-level command surface used by teleoperation.
pub trait ArmControl {
    fn is_connected(&self) -> bool;
    fn read_joint(&mut self, joint: usize) -> Option<f64>;
    fn move_joint_absolute(&mut self, joint: usize, degrees: f64) -> bool;
    fn set_gripper(&mut self, fraction: f64) -> bool;
    fn enable_torque(&mut self) -> bool;

    /// Cartesian motion, for arms that support it.
    fn cartesian(&mut self) -> Option<&mut dyn CartesianControl> {
        None
    }
}

/// Tool-frame motion: `[x, y, z]` in mm and `[roll, pitch, yaw]` in degrees.
pub trait CartesianControl {
    fn move_cartesian_delta(&mut self, delta: [f64; 6]) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlMode {
    #[default]
    Joint,
    Cartesian,
    Gripper,
}

impl ControlMode {
    pub const fn next(self) -> Self {
        match self {
            Self::Joint => Self::Cartesian,
            Self::Cartesian => Self::Gripper,
            Self::Gripper => Self::Joint,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Joint => "joint",
            Self::Cartesian => "cartesian",
            Self::Gripper => "gripper",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyAction {
    ToggleMode,
    ToggleEstop,
    Speed(f64),
    Joint { joint: usize, direction: f64 },
    Cartesian { axis: usize, direction: f64 },
    ToggleGripper,
}

impl KeyAction {
    /// Accepted even while the session is stopped.
    const fn always_allowed(self) -> bool {
        matches!(self, Self::ToggleMode | Self::ToggleEstop)
    }
}

/// Action bound to `key` (already lowercased).
pub fn key_action(key: &str) -> Option<KeyAction> {
    use KeyAction::{Cartesian, Joint, Speed, ToggleEstop, ToggleGripper, ToggleMode};
    let joint = |joint, direction| Some(Joint { joint, direction });
    let cart = |axis, direction| Some(Cartesian { axis, direction });
    match key {
        "m" => Some(ToggleMode),
        " " | "space" => Some(ToggleEstop),
        "+" | "=" => Some(Speed(SPEED_UP)),
        "-" | "_" => Some(Speed(SPEED_DOWN)),
        "i" => joint(0, 1.0),
        "k" => joint(0, -1.0),
        "j" => joint(1, 1.0),
        "l" => joint(1, -1.0),
        "u" => joint(2, 1.0),
        "o" => joint(2, -1.0),
        "7" => joint(3, 1.0),
        "9" => joint(3, -1.0),
        "8" => joint(4, 1.0),
        "0" => joint(4, -1.0),
        "y" => joint(5, 1.0),
        "h" => joint(5, -1.0),
        "w" => cart(0, 1.0),
        "s" => cart(0, -1.0),
        "a" => cart(1, -1.0),
        "d" => cart(1, 1.0),
        "q" => cart(2, 1.0),
        "e" => cart(2, -1.0),
        "r" => cart(3, 1.0),
        "f" => cart(3, -1.0),
        "t" => cart(4, 1.0),
        "g" => cart(4, -1.0),
        "z" => cart(5, 1.0),
        "x" => cart(5, -1.0),
        "c" => Some(ToggleGripper),
        _ => None,
    }
}

/// What a key press did.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    ModeChanged(ControlMode),
    Estop { active: bool },
    SpeedChanged(f64),
    JointMove { joint: usize, delta: f64, success: bool },
    CartesianMove { axis: usize, delta: [f64; 6], success: bool },
    Gripper { open: bool, success: bool },
    Ignored { reason: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlStatus {
    pub mode: ControlMode,
    pub estop_active: bool,
    pub speed_multiplier: f64,
    pub step_size: f64,
    pub running: bool,
}

pub struct ControlSession {
    cfg: ControlCfg,
    clock: Arc<dyn Clock>,
    mode: ControlMode,
    running: bool,
    estop_active: bool,
    speed_multiplier: f64,
    last_key: HashMap<String, Instant>,
    active_keys: HashSet<String>,
    working: [f64; JOINT_COUNT],
    gripper_open: bool,
}

impl std::fmt::Debug for ControlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlSession")
            .field("status", &self.status())
            .field("active_keys", &self.active_keys)
            .finish_non_exhaustive()
    }
}

impl Default for ControlSession {
    fn default() -> Self {
        Self::new(ControlCfg::default(), Arc::new(MonotonicClock::new()))
    }
}

impl ControlSession {
    pub fn new(cfg: ControlCfg, clock: Arc<dyn Clock>) -> Self {
        Self {
            cfg,
            clock,
            mode: ControlMode::Joint,
            running: false,
            estop_active: false,
            speed_multiplier: 1.0,
            last_key: HashMap::new(),
            active_keys: HashSet::new(),
            working: [0.0; JOINT_COUNT],
            gripper_open: false,
        }
    }

    pub fn status(&self) -> ControlStatus {
        ControlStatus {
            mode: self.mode,
            estop_active: self.estop_active,
            speed_multiplier: self.speed_multiplier,
            step_size: self.cfg.step_size,
            running: self.running,
        }
    }

    pub fn working_position(&self) -> [f64; JOINT_COUNT] {
        self.working
    }

    pub fn is_key_active(&self, key: &str) -> bool {
        self.active_keys.contains(&key.to_lowercase())
    }

    /// Begin accepting motion keys. Requires a connected arm.
    pub fn start(&mut self, arm: &mut dyn ArmControl) -> Result<ControlStatus, ControlError> {
        if !arm.is_connected() {
            return Err(ControlError::NotConnected);
        }
        self.running = true;
        self.estop_active = false;
        self.last_key.clear();
        self.active_keys.clear();
        if !arm.enable_torque() {
            tracing::warn!("torque enable failed when starting control");
        }
        for (i, w) in self.working.iter_mut().enumerate() {
            *w = arm.read_joint(i).unwrap_or(0.0);
        }
        tracing::info!(working = ?self.working, "keyboard control started");
        Ok(self.status())
    }

    pub fn stop(&mut self) -> ControlStatus {
        self.running = false;
        self.last_key.clear();
        self.active_keys.clear();
        tracing::info!("keyboard control stopped");
        self.status()
    }

    /// Handle one key event. `None` means the event was consumed without
    /// effect (key release, unbound key, or a debounced repeat).
    pub fn handle_key(
        &mut self,
        arm: &mut dyn ArmControl,
        key: &str,
        kind: KeyEventKind,
    ) -> Option<ControlEvent> {
        let key = key.to_lowercase();
        if kind == KeyEventKind::Up {
            self.active_keys.remove(&key);
            return None;
        }
        let action = key_action(&key)?;
        if !self.running && !action.always_allowed() {
            return Some(ControlEvent::Ignored {
                reason: "control not started",
            });
        }
        let now = self.clock.now();
        if let Some(last) = self.last_key.get(&key)
            && now.saturating_duration_since(*last) < self.cfg.debounce
        {
            tracing::trace!(key, "debounced");
            return None;
        }
        self.last_key.insert(key.clone(), now);
        self.active_keys.insert(key);
        Some(self.dispatch(arm, action))
    }

    fn motion_blocked(&self, mode: ControlMode) -> Option<ControlEvent> {
        let reason = if !self.running {
            "control not started"
        } else if self.estop_active {
            "emergency stop active"
        } else if self.mode != mode {
            "wrong mode"
        } else {
            return None;
        };
        Some(ControlEvent::Ignored { reason })
    }

    fn step(&self) -> f64 {
        self.cfg.step_size * self.speed_multiplier
    }

    fn dispatch(&mut self, arm: &mut dyn ArmControl, action: KeyAction) -> ControlEvent {
        match action {
            KeyAction::ToggleMode => {
                self.mode = self.mode.next();
                tracing::info!(mode = self.mode.as_str(), "control mode changed");
                ControlEvent::ModeChanged(self.mode)
            }
            KeyAction::ToggleEstop => {
                self.estop_active = !self.estop_active;
                if self.estop_active {
                    tracing::warn!("emergency stop engaged");
                } else {
                    tracing::info!("emergency stop released");
                }
                ControlEvent::Estop {
                    active: self.estop_active,
                }
            }
            KeyAction::Speed(factor) => {
                self.speed_multiplier = (self.speed_multiplier * factor).clamp(SPEED_MIN, SPEED_MAX);
                ControlEvent::SpeedChanged(self.speed_multiplier)
            }
            KeyAction::Joint { joint, direction } => {
                if let Some(blocked) = self.motion_blocked(ControlMode::Joint) {
                    return blocked;
                }
                let delta = direction * self.step();
                let current = arm.read_joint(joint).unwrap_or(self.working[joint]);
                let target = current + delta;
                let success = arm.move_joint_absolute(joint, target);
                if success {
                    self.working[joint] = target;
                }
                tracing::debug!(joint = joint_name(joint), delta, success, "joint key");
                ControlEvent::JointMove {
                    joint,
                    delta,
                    success,
                }
            }
            KeyAction::Cartesian { axis, direction } => {
                if let Some(blocked) = self.motion_blocked(ControlMode::Cartesian) {
                    return blocked;
                }
                let mut delta = [0.0; 6];
                delta[axis] = if axis < 3 {
                    direction * self.step()
                } else {
                    direction * self.step() * ROTATION_SCALE
                };
                match arm.cartesian() {
                    Some(c) => ControlEvent::CartesianMove {
                        axis,
                        delta,
                        success: c.move_cartesian_delta(delta),
                    },
                    None => ControlEvent::Ignored {
                        reason: "cartesian motion unsupported",
                    },
                }
            }
            KeyAction::ToggleGripper => {
                if let Some(blocked) = self.motion_blocked(ControlMode::Gripper) {
                    return blocked;
                }
                let open = !self.gripper_open;
                let success = arm.set_gripper(if open { 1.0 } else { 0.0 });
                if success {
                    self.gripper_open = open;
                    if let Some(pos) = arm.read_joint(GRIPPER) {
                        self.working[GRIPPER] = pos;
                    }
                }
                ControlEvent::Gripper { open, success }
            }
        }
    }
}
