//! Tick <-> angle conversion.
//!
//! Pure functions, no state. The canonical convention is centred degrees:
//! `deg = sign * (raw - res/2) * 360/res + offset_deg`. The legacy radian
//! convention measures from a tick offset:
//! `rad = (raw - offset_ticks) * sign * 2pi/(res-1)`.

use std::f64::consts::TAU;

use thiserror::Error;

pub const DEFAULT_RESOLUTION: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    CenteredDegrees,
    SignedOffsetRadians,
}

impl Convention {
    pub fn to_engineering(self, raw: i32, offset: f64, sign: f64, resolution: u32) -> f64 {
        let res = f64::from(resolution);
        let raw = f64::from(raw);
        match self {
            Self::CenteredDegrees => sign * (raw - res / 2.0) * 360.0 / res + offset,
            Self::SignedOffsetRadians => (raw - offset) * sign * TAU / (res - 1.0),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn to_raw(self, value: f64, offset: f64, sign: f64, resolution: u32) -> i32 {
        let res = f64::from(resolution);
        // sign is +-1, so dividing by it is multiplying by it
        let ticks = match self {
            Self::CenteredDegrees => (value - offset) * sign * res / 360.0 + res / 2.0,
            Self::SignedOffsetRadians => value * sign * (res - 1.0) / TAU + offset,
        };
        ticks.round() as i32
    }
}

/// Canonical ticks to degrees.
pub fn to_engineering(raw: i32, offset: f64, sign: f64, resolution: u32) -> f64 {
    Convention::CenteredDegrees.to_engineering(raw, offset, sign, resolution)
}

/// Canonical degrees to ticks, rounded to the nearest tick.
pub fn to_raw(value: f64, offset: f64, sign: f64, resolution: u32) -> i32 {
    Convention::CenteredDegrees.to_raw(value, offset, sign, resolution)
}

/// Degree offset that puts the canonical zero where a legacy tick offset had it.
pub fn legacy_ticks_offset_to_degrees(offset_ticks: f64, sign: f64, resolution: u32) -> f64 {
    let res = f64::from(resolution);
    -sign * (offset_ticks - res / 2.0) * 360.0 / res
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationParamError {
    #[error("resolution must be >= 2, got {0}")]
    Resolution(u32),
    #[error("sign must be +1 or -1, got {0}")]
    Sign(f64),
    #[error("offset must be finite")]
    Offset,
}

/// Per-joint conversion constants in the canonical convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointCalibration {
    offset_deg: f64,
    sign: f64,
    resolution: u32,
}

impl JointCalibration {
    pub fn new(offset_deg: f64, sign: f64, resolution: u32) -> Result<Self, CalibrationParamError> {
        if resolution < 2 {
            return Err(CalibrationParamError::Resolution(resolution));
        }
        if sign != 1.0 && sign != -1.0 {
            return Err(CalibrationParamError::Sign(sign));
        }
        if !offset_deg.is_finite() {
            return Err(CalibrationParamError::Offset);
        }
        Ok(Self {
            offset_deg,
            sign,
            resolution,
        })
    }

    /// Zero offset, positive sign: the bus frame.
    pub const fn identity(resolution: u32) -> Self {
        Self {
            offset_deg: 0.0,
            sign: 1.0,
            resolution,
        }
    }

    pub const fn offset_deg(&self) -> f64 {
        self.offset_deg
    }

    pub const fn sign(&self) -> f64 {
        self.sign
    }

    pub const fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn to_degrees(&self, raw: i32) -> f64 {
        to_engineering(raw, self.offset_deg, self.sign, self.resolution)
    }

    pub fn to_ticks(&self, degrees: f64) -> i32 {
        to_raw(degrees, self.offset_deg, self.sign, self.resolution)
    }
}

impl Default for JointCalibration {
    fn default() -> Self {
        Self::identity(DEFAULT_RESOLUTION)
    }
}
