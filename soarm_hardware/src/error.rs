use thiserror::Error;

use soarm_traits::Register;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("servo {id} did not respond")]
    NoResponse { id: u8 },
    #[error("bus timeout")]
    Timeout,
    #[error("bus is closed")]
    Closed,
    #[error("value {value} is not valid for {reg:?}")]
    InvalidValue { reg: Register, value: i32 },
    #[error("unsupported baud rate {0}")]
    UnsupportedBaud(u32),
    #[error("port enumeration failed: {0}")]
    Enumeration(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
