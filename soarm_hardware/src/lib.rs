#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod error;
pub mod ports;
pub mod sim;
pub mod util;

pub use error::HwError;
pub use ports::SystemPorts;
pub use sim::{SimBusOpener, SimPorts, SimulatedArm, SimulatedBus, WriteRecord};
