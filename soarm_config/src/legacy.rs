//! Tick-based profiles written by the two-pose calibrator.
//!
//! Offsets are raw servo positions at the zero pose and signs are floats of
//! magnitude one. Conversion into the canonical degree profile lives in
//! `soarm_core::calibration::import_legacy`.

use serde::{Deserialize, Serialize};

use crate::profile::{JOINTS, PidGains, ProfileError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyTickProfile {
    pub servos_offsets: [f64; JOINTS],
    pub servos_calibration_position: [f64; JOINTS],
    pub servos_offsets_signs: [f64; JOINTS],
    #[serde(default)]
    pub servos_voltage: f64,
    #[serde(default)]
    pub pid_gains: Option<[PidGains; JOINTS]>,
}

impl LegacyTickProfile {
    pub fn from_json(s: &str) -> Result<Self, ProfileError> {
        let p: Self = serde_json::from_str(s)?;
        for (i, s) in p.servos_offsets_signs.iter().enumerate() {
            if (s.abs() - 1.0).abs() > f64::EPSILON {
                return Err(ProfileError::Invalid(format!(
                    "servos_offsets_signs[{i}] must be +1 or -1, got {s}"
                )));
            }
        }
        Ok(p)
    }

    pub fn to_json_pretty(&self) -> Result<String, ProfileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
