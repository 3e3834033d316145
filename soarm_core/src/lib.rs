#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Arm control logic (hardware-agnostic).
//!
//! All bus traffic goes through `soarm_traits::MotorBus`; port listing goes
//! through `soarm_traits::PortEnumerator`.
//!
//! ## Architecture
//!
//! - **Units**: tick <-> degree conversion (`units`)
//! - **Limits**: per-joint guard checked before every write (`limits`)
//! - **Adapter**: connection, reads with caching, guarded moves (`adapter`)
//! - **Calibration**: range-discovery wizard and profile handling
//!   (`calibration`), plus the two-pose method for old profiles (`two_pose`)
//! - **Control**: keyboard teleoperation state machine (`control`)
//! - **Setup**: servo id/baud provisioning (`setup`) and port discovery
//!   (`discovery`)
//! - **Controller**: one owner for all of the above (`controller`), driven
//!   from a dedicated thread (`worker`)
//!
//! ## Angles
//!
//! Joint positions are degrees in the canonical centred convention:
//! `deg = sign * (raw - res/2) * 360/res + offset`. Raw ticks only appear at
//! the bus boundary and in the two-pose profile.

pub mod adapter;
pub mod builder;
pub mod calibration;
pub mod config;
pub mod control;
pub mod controller;
pub mod conversions;
pub mod discovery;
pub mod error;
pub mod hw_error;
pub mod joints;
pub mod limits;
pub mod logger;
pub mod mocks;
pub mod setup;
pub mod status;
pub mod two_pose;
pub mod units;
pub mod util;
pub mod worker;

pub use adapter::{ConnectionState, RobotAdapter, RobotState};
pub use calibration::{
    CalibrationEngine, CalibrationSession, RealtimeSnapshot, WizardStep, import_legacy,
};
pub use config::{AdapterCfg, ControlCfg, PollingCfg, RobotIdentity};
pub use control::{ArmControl, CartesianControl, ControlEvent, ControlMode, ControlSession, KeyEventKind};
pub use controller::RobotController;
pub use discovery::PortDiscovery;
pub use error::{
    BuildError, CalibrationError, ConnectError, ControlError, DiscoveryError, Result, SetupError,
    WorkerError,
};
pub use joints::{JOINT_COUNT, JOINT_NAMES};
pub use limits::{JointLimit, LimitViolation, RejectReason};
pub use logger::{EventLevel, EventSink, TracingSink};
pub use setup::{MotorSetupManager, RobotRole};
pub use status::{StepReport, StepStatus};
pub use two_pose::TwoPoseCalibration;
pub use units::JointCalibration;
pub use worker::{ControllerWorker, PollEvent};
