//! Register-level access to a chain of serial bus servos.
//!
//! Framing, checksums and the chip's address map live behind these traits.
//! Callers address registers symbolically and exchange plain integers.

pub type BusResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Baud rate every servo ships with and the adapter opens at.
pub const DEFAULT_BAUDRATE: u32 = 1_000_000;

/// Baud rates a servo may be set to. The index is the value stored in
/// [`Register::BaudRate`].
pub const BAUD_RATES: [u32; 8] = [
    1_000_000, 500_000, 250_000, 128_000, 115_200, 57_600, 38_400, 19_200,
];

/// Encoded register value for `baudrate`, if the servo supports it.
pub fn baud_code(baudrate: u32) -> Option<i32> {
    BAUD_RATES
        .iter()
        .position(|&b| b == baudrate)
        .and_then(|i| i32::try_from(i).ok())
}

/// Baud rate for an encoded register value.
pub fn baud_from_code(code: i32) -> Option<u32> {
    usize::try_from(code).ok().and_then(|i| BAUD_RATES.get(i).copied())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Register {
    PresentPosition,
    GoalPosition,
    TorqueEnable,
    /// Supply voltage in units of 0.1 V.
    PresentVoltage,
    PCoefficient,
    ICoefficient,
    DCoefficient,
    /// EEPROM write lock; 0 unlocks.
    Lock,
    Id,
    BaudRate,
    MaxAcceleration,
}

impl Register {
    /// EEPROM-backed registers survive power cycles and require `Lock == 0`.
    pub const fn is_eeprom(self) -> bool {
        matches!(self, Self::Id | Self::BaudRate | Self::MaxAcceleration)
    }
}

pub trait MotorBus: Send {
    fn read(&mut self, id: u8, reg: Register) -> BusResult<i32>;
    fn write(&mut self, id: u8, reg: Register, value: i32) -> BusResult<()>;
    /// True when a servo with `id` answers at the current baud rate.
    fn ping(&mut self, id: u8) -> bool;
    fn set_baudrate(&mut self, baudrate: u32) -> BusResult<()>;
    fn baudrate(&self) -> u32;
    fn close(&mut self) -> BusResult<()>;

    /// Batched read capability, when the bus implements one.
    fn as_sync_read(&mut self) -> Option<&mut dyn SyncRead> {
        None
    }
}

/// Reads one register from several servos in a single transaction.
pub trait SyncRead {
    /// One entry per requested id, `None` where that servo did not answer.
    fn sync_read(&mut self, ids: &[u8], reg: Register) -> BusResult<Vec<Option<i32>>>;
}

/// Opens a bus on a named port.
///
/// Shared between the adapter and the setup manager, which take turns on
/// the same port.
pub trait BusOpener: Send + Sync {
    fn open(&self, port: &str, baudrate: u32) -> BusResult<Box<dyn MotorBus>>;
}

impl<T: BusOpener + ?Sized> BusOpener for std::sync::Arc<T> {
    fn open(&self, port: &str, baudrate: u32) -> BusResult<Box<dyn MotorBus>> {
        (**self).open(port, baudrate)
    }
}
