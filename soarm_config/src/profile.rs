//! Persisted per-robot calibration profile.
//!
//! Profiles are JSON files keyed by robot model and serial id. Version 2
//! stores offsets in degrees; files without `profile_version` stored them
//! in radians and are converted when read.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::atomic::write_atomic;

pub const JOINTS: usize = 6;
pub const PROFILE_VERSION: u32 = 2;

/// Supply voltage at or above this is treated as the 12 V variant.
pub const HIGH_VOLTAGE_THRESHOLD: f64 = 9.0;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile io at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("profile json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported profile_version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid profile: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoltageClass {
    #[default]
    #[serde(rename = "6V")]
    V6,
    #[serde(rename = "12V")]
    V12,
}

impl VoltageClass {
    pub fn from_volts(volts: f64) -> Self {
        if volts >= HIGH_VOLTAGE_THRESHOLD {
            Self::V12
        } else {
            Self::V6
        }
    }

    pub const fn nominal_volts(self) -> f64 {
        match self {
            Self::V6 => 6.0,
            Self::V12 => 12.0,
        }
    }
}

impl std::fmt::Display for VoltageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V6 => f.write_str("6V"),
            Self::V12 => f.write_str("12V"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidGains {
    pub p_gain: i32,
    pub i_gain: i32,
    pub d_gain: i32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            p_gain: 20,
            i_gain: 0,
            d_gain: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TcpOffset {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HomePose {
    pub joints: [f64; JOINTS],
}

/// Discovered range per joint, degrees in the bus frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointRanges {
    pub min: [f64; JOINTS],
    pub max: [f64; JOINTS],
    pub middle: [f64; JOINTS],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationProfile {
    pub profile_version: u32,
    pub model: String,
    pub serial_id: String,
    pub joint_offsets: [f64; JOINTS],
    pub joint_signs: [f64; JOINTS],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joint_ranges: Option<JointRanges>,
    pub pid_gains: [PidGains; JOINTS],
    pub voltage_class: VoltageClass,
    pub tcp_offset: TcpOffset,
    pub home_pose: HomePose,
    pub servos_voltage: f64,
}

/// On-disk shape; every field optional so older files load.
#[derive(Deserialize)]
#[serde(default)]
struct StoredProfile {
    profile_version: Option<u32>,
    model: String,
    serial_id: String,
    joint_offsets: [f64; JOINTS],
    joint_signs: [f64; JOINTS],
    joint_ranges: Option<JointRanges>,
    pid_gains: [PidGains; JOINTS],
    voltage_class: Option<VoltageClass>,
    tcp_offset: TcpOffset,
    home_pose: HomePose,
    servos_voltage: Option<f64>,
}

impl Default for StoredProfile {
    fn default() -> Self {
        Self {
            profile_version: None,
            model: String::new(),
            serial_id: String::new(),
            joint_offsets: [0.0; JOINTS],
            joint_signs: [1.0; JOINTS],
            joint_ranges: None,
            pid_gains: [PidGains::default(); JOINTS],
            voltage_class: None,
            tcp_offset: TcpOffset::default(),
            home_pose: HomePose::default(),
            servos_voltage: None,
        }
    }
}

impl CalibrationProfile {
    /// Uncalibrated profile for a supply class.
    pub fn default_for(model: &str, serial_id: &str, voltage_class: VoltageClass) -> Self {
        Self {
            profile_version: PROFILE_VERSION,
            model: model.to_owned(),
            serial_id: serial_id.to_owned(),
            joint_offsets: [0.0; JOINTS],
            joint_signs: [1.0; JOINTS],
            joint_ranges: None,
            pid_gains: [PidGains::default(); JOINTS],
            voltage_class,
            tcp_offset: TcpOffset::default(),
            home_pose: HomePose::default(),
            servos_voltage: voltage_class.nominal_volts(),
        }
    }

    pub fn from_json(s: &str) -> Result<Self, ProfileError> {
        let stored: StoredProfile = serde_json::from_str(s)?;
        let version = stored.profile_version.unwrap_or(1);
        let joint_offsets = match version {
            1 => {
                tracing::debug!("converting version 1 profile offsets from radians");
                stored.joint_offsets.map(f64::to_degrees)
            }
            PROFILE_VERSION => stored.joint_offsets,
            other => return Err(ProfileError::UnsupportedVersion(other)),
        };
        let servos_voltage = stored
            .servos_voltage
            .or_else(|| stored.voltage_class.map(VoltageClass::nominal_volts))
            .unwrap_or(6.0);
        let profile = Self {
            profile_version: PROFILE_VERSION,
            model: stored.model,
            serial_id: stored.serial_id,
            joint_offsets,
            joint_signs: stored.joint_signs,
            joint_ranges: stored.joint_ranges,
            pid_gains: stored.pid_gains,
            voltage_class: stored
                .voltage_class
                .unwrap_or_else(|| VoltageClass::from_volts(servos_voltage)),
            tcp_offset: stored.tcp_offset,
            home_pose: stored.home_pose,
            servos_voltage,
        };
        profile.validate()?;
        Ok(profile)
    }

    pub fn to_json_pretty(&self) -> Result<String, ProfileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        for i in 0..JOINTS {
            let s = self.joint_signs[i];
            if s != 1.0 && s != -1.0 {
                return Err(ProfileError::Invalid(format!(
                    "joint_signs[{i}] must be +1 or -1, got {s}"
                )));
            }
            if !self.joint_offsets[i].is_finite() {
                return Err(ProfileError::Invalid(format!(
                    "joint_offsets[{i}] must be finite"
                )));
            }
        }
        if let Some(r) = &self.joint_ranges {
            for i in 0..JOINTS {
                if !(r.min[i].is_finite() && r.max[i].is_finite() && r.middle[i].is_finite()) {
                    return Err(ProfileError::Invalid(format!(
                        "joint_ranges[{i}] must be finite"
                    )));
                }
                if r.min[i] > r.max[i] {
                    return Err(ProfileError::Invalid(format!(
                        "joint_ranges[{i}]: min {} exceeds max {}",
                        r.min[i], r.max[i]
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Directory of profiles, one file per (model, serial id).
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

fn file_stem_part(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, model: &str, serial_id: &str) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.json",
            file_stem_part(model),
            file_stem_part(serial_id)
        ))
    }

    /// `Ok(None)` when no profile exists for the key.
    pub fn load(
        &self,
        model: &str,
        serial_id: &str,
    ) -> Result<Option<CalibrationProfile>, ProfileError> {
        let path = self.path_for(model, serial_id);
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ProfileError::Io { path, source }),
        };
        let mut profile = CalibrationProfile::from_json(&text)?;
        if profile.model.is_empty() {
            profile.model = model.to_owned();
        }
        if profile.serial_id.is_empty() {
            profile.serial_id = serial_id.to_owned();
        }
        tracing::debug!(path = %path.display(), "loaded calibration profile");
        Ok(Some(profile))
    }

    /// Atomically writes the profile under its own key.
    pub fn save(&self, profile: &CalibrationProfile) -> Result<PathBuf, ProfileError> {
        profile.validate()?;
        let path = self.path_for(&profile.model, &profile.serial_id);
        std::fs::create_dir_all(&self.dir).map_err(|source| ProfileError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let json = profile.to_json_pretty()?;
        write_atomic(&path, json.as_bytes()).map_err(|source| ProfileError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), "calibration profile saved");
        Ok(path)
    }
}
