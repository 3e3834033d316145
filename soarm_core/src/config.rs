//! Runtime configuration used by the core components.
//!
//! These are separate from the TOML-deserialized config in `soarm_config`;
//! see `conversions` for the mapping.

use std::path::PathBuf;
use std::time::Duration;

use soarm_traits::DEFAULT_BAUDRATE;

use crate::joints::JOINT_COUNT;
use crate::limits::JointLimit;
use crate::units::DEFAULT_RESOLUTION;

/// Bus and joint settings for `RobotAdapter`.
#[derive(Debug, Clone)]
pub struct AdapterCfg {
    pub baudrate: u32,
    /// Ticks per revolution.
    pub resolution: u32,
    /// Limits installed at construction and by `reset_limits`.
    pub default_limits: [JointLimit; JOINT_COUNT],
}

impl Default for AdapterCfg {
    fn default() -> Self {
        Self {
            baudrate: DEFAULT_BAUDRATE,
            resolution: DEFAULT_RESOLUTION,
            default_limits: [JointLimit::FULL_TURN; JOINT_COUNT],
        }
    }
}

/// Teleoperation settings for `ControlSession`.
#[derive(Debug, Clone)]
pub struct ControlCfg {
    /// Degrees per key press at speed multiplier 1.0.
    pub step_size: f64,
    /// Repeats of the same key inside this window are dropped.
    pub debounce: Duration,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            step_size: 5.0,
            debounce: Duration::from_millis(30),
        }
    }
}

/// Background polling cadence for `ControllerWorker`.
#[derive(Debug, Clone)]
pub struct PollingCfg {
    pub state_hz: u32,
    /// Interval between port rediscovery attempts while disconnected.
    pub rediscover: Duration,
}

impl Default for PollingCfg {
    fn default() -> Self {
        Self {
            state_hz: 20,
            rediscover: Duration::from_secs(5),
        }
    }
}

/// Which robot the calibration profile belongs to, and where profiles live.
#[derive(Debug, Clone)]
pub struct RobotIdentity {
    pub model: String,
    pub serial_id: String,
    pub profile_dir: PathBuf,
}

impl Default for RobotIdentity {
    fn default() -> Self {
        Self {
            model: "so-100".into(),
            serial_id: "default".into(),
            profile_dir: PathBuf::from("data/calibration"),
        }
    }
}
