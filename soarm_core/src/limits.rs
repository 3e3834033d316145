//! Software joint limits.

use thiserror::Error;

/// Inclusive `[min, max]` in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimit {
    pub min: f64,
    pub max: f64,
}

impl JointLimit {
    pub const FULL_TURN: Self = Self {
        min: -180.0,
        max: 180.0,
    };

    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl Default for JointLimit {
    fn default() -> Self {
        Self::FULL_TURN
    }
}

impl From<[f64; 2]> for JointLimit {
    fn from([min, max]: [f64; 2]) -> Self {
        Self { min, max }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    BelowMinimum,
    AboveMaximum,
    InvalidJointIndex,
    NonFinite,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::BelowMinimum => "below minimum",
            Self::AboveMaximum => "above maximum",
            Self::InvalidJointIndex => "invalid joint index",
            Self::NonFinite => "not a finite angle",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitSide {
    Lower,
    Upper,
}

#[derive(Debug, Error, Clone, Copy, PartialEq)]
#[error("joint {joint_index}: target {target:.2} rejected, {reason}")]
pub struct LimitViolation {
    pub joint_index: usize,
    pub target: f64,
    pub reason: RejectReason,
    /// Violated side and its bound, for range rejections.
    pub bound: Option<(LimitSide, f64)>,
}

/// Validate `target` for joint `joint_index` against `limits`.
pub fn check(joint_index: usize, target: f64, limits: &[JointLimit]) -> Result<(), LimitViolation> {
    let violation = |reason, bound| LimitViolation {
        joint_index,
        target,
        reason,
        bound,
    };
    let Some(limit) = limits.get(joint_index) else {
        return Err(violation(RejectReason::InvalidJointIndex, None));
    };
    if !target.is_finite() {
        return Err(violation(RejectReason::NonFinite, None));
    }
    if target < limit.min {
        return Err(violation(
            RejectReason::BelowMinimum,
            Some((LimitSide::Lower, limit.min)),
        ));
    }
    if target > limit.max {
        return Err(violation(
            RejectReason::AboveMaximum,
            Some((LimitSide::Upper, limit.max)),
        ));
    }
    Ok(())
}
