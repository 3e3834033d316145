//! `From` implementations bridging `soarm_config` types to `soarm_core` types.

use std::time::Duration;

use crate::config::{AdapterCfg, ControlCfg, PollingCfg, RobotIdentity};
use crate::limits::JointLimit;
use crate::units::DEFAULT_RESOLUTION;

impl From<&soarm_config::Config> for AdapterCfg {
    fn from(c: &soarm_config::Config) -> Self {
        Self {
            baudrate: c.robot.baudrate,
            resolution: DEFAULT_RESOLUTION,
            default_limits: c.limits.joint_limits.map(JointLimit::from),
        }
    }
}

impl From<&soarm_config::ControlCfg> for ControlCfg {
    fn from(c: &soarm_config::ControlCfg) -> Self {
        Self {
            step_size: c.step_size,
            debounce: Duration::from_millis(c.debounce_ms),
        }
    }
}

impl From<&soarm_config::PollingCfg> for PollingCfg {
    fn from(c: &soarm_config::PollingCfg) -> Self {
        Self {
            state_hz: c.state_hz,
            rediscover: Duration::from_secs(c.rediscover_secs),
        }
    }
}

impl From<&soarm_config::Config> for RobotIdentity {
    fn from(c: &soarm_config::Config) -> Self {
        Self {
            model: c.robot.model.clone(),
            serial_id: c.robot.serial_id.clone(),
            profile_dir: c.calibration.dir.clone(),
        }
    }
}
