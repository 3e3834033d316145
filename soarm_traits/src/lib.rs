#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![allow(clippy::module_name_repetitions)]

pub mod bus;
pub mod clock;
pub mod ports;

pub use bus::{BAUD_RATES, BusOpener, baud_code, baud_from_code, BusResult, DEFAULT_BAUDRATE, MotorBus, Register, SyncRead};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use ports::{PortEnumerator, PortInfo, UsbIds};
