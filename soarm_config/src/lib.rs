#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Configuration schema and calibration profile persistence for the arm.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - `profile` holds the JSON calibration profile and its on-disk store.
//! - `legacy` parses tick-based profiles from the two-pose calibrator.
use std::path::{Path, PathBuf};

use serde::Deserialize;

pub mod atomic;
pub mod legacy;
pub mod profile;

pub use legacy::LegacyTickProfile;
pub use profile::{
    CalibrationProfile, HomePose, JOINTS, JointRanges, PidGains, ProfileError, ProfileStore,
    TcpOffset, VoltageClass,
};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RobotCfg {
    pub model: String,
    pub serial_id: String,
    /// Serial device; discovered by USB PID when absent.
    pub port: Option<String>,
    pub baudrate: u32,
}

impl Default for RobotCfg {
    fn default() -> Self {
        Self {
            model: "so-100".into(),
            serial_id: "default".into(),
            port: None,
            baudrate: 1_000_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LimitsCfg {
    /// `[min, max]` degrees per joint.
    pub joint_limits: [[f64; 2]; JOINTS],
}

impl Default for LimitsCfg {
    fn default() -> Self {
        Self {
            joint_limits: [[-180.0, 180.0]; JOINTS],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ControlCfg {
    /// Degrees per joint key press before the speed multiplier.
    pub step_size: f64,
    pub debounce_ms: u64,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            step_size: 5.0,
            debounce_ms: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingCfg {
    pub state_hz: u32,
    pub rediscover_secs: u64,
}

impl Default for PollingCfg {
    fn default() -> Self {
        Self {
            state_hz: 20,
            rediscover_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalibrationCfg {
    pub dir: PathBuf,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/calibration"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub robot: RobotCfg,
    pub limits: LimitsCfg,
    pub control: ControlCfg,
    pub polling: PollingCfg,
    pub calibration: CalibrationCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {}", path.display(), e))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Robot
        if self.robot.model.trim().is_empty() {
            eyre::bail!("robot.model must not be empty");
        }
        if self.robot.serial_id.trim().is_empty() {
            eyre::bail!("robot.serial_id must not be empty");
        }
        if self.robot.baudrate == 0 {
            eyre::bail!("robot.baudrate must be > 0");
        }
        if let Some(port) = &self.robot.port
            && port.trim().is_empty()
        {
            eyre::bail!("robot.port must not be empty when set");
        }

        // Limits
        for (i, [min, max]) in self.limits.joint_limits.iter().enumerate() {
            if !(min.is_finite() && max.is_finite()) {
                eyre::bail!("limits.joint_limits[{i}] must be finite");
            }
            if min > max {
                eyre::bail!("limits.joint_limits[{i}] min {min} exceeds max {max}");
            }
        }

        // Control
        if !(self.control.step_size.is_finite() && self.control.step_size > 0.0) {
            eyre::bail!("control.step_size must be > 0");
        }
        if self.control.debounce_ms > 1000 {
            eyre::bail!("control.debounce_ms is unreasonably large (>1s)");
        }

        // Polling
        if self.polling.state_hz == 0 {
            eyre::bail!("polling.state_hz must be > 0");
        }
        if self.polling.state_hz > 1000 {
            eyre::bail!("polling.state_hz must be <= 1000");
        }
        if self.polling.rediscover_secs == 0 {
            eyre::bail!("polling.rediscover_secs must be >= 1");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        Ok(())
    }
}
