use thiserror::Error;

use soarm_config::ProfileError;

/// Opening the bus failed; the adapter stays disconnected.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to open bus on {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("no port configured and discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
}

/// Classified trait-boundary bus error. The adapter absorbs these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusFault {
    #[error("bus timeout")]
    Timeout,
    #[error("servo {0} did not respond")]
    NoResponse(u8),
    #[error("bus closed")]
    Closed,
    #[error("bus fault: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("robot is not connected")]
    NotConnected,
    #[error("calibration wizard is at step {actual}, expected step {expected}")]
    WrongStep { expected: u8, actual: u8 },
    #[error("no calibration profile stored for {model}/{serial_id}")]
    MissingProfile { model: String, serial_id: String },
    #[error("could not read servo positions")]
    ReadFailed,
    #[error("home pose has not been captured")]
    HomeNotCaptured,
    #[error("joint {joint} did not move between poses")]
    PoseUnchanged { joint: usize },
    #[error("profile: {0}")]
    Profile(#[from] ProfileError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("no port disappeared (before: {before:?}, after: {after:?})")]
    NoDifference {
        before: Vec<String>,
        after: Vec<String>,
    },
    #[error("more than one port disappeared: {removed:?}")]
    Ambiguous { removed: Vec<String> },
    #[error("no port with a known arm controller PID")]
    NotFound,
    #[error("port enumeration failed: {0}")]
    Enumeration(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SetupError {
    #[error("no motor found on {port}; connect exactly one motor")]
    NoMotor { port: String },
    #[error("multiple motors found at {baudrate} baud: ids {ids:?}; connect exactly one motor")]
    MultipleMotors { ids: Vec<u8>, baudrate: u32 },
    #[error("{what} verification failed: wrote {expected}, read back {actual:?}")]
    Verification {
        what: &'static str,
        expected: i32,
        actual: Option<i32>,
    },
    #[error("unsupported baud rate {0}")]
    UnsupportedBaud(u32),
    #[error("failed to open {port}: {reason}")]
    Open { port: String, reason: String },
    #[error("bus error during {during}: {reason}")]
    Bus { during: &'static str, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing bus opener")]
    MissingOpener,
    #[error("missing port enumerator")]
    MissingEnumerator,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("robot not connected")]
    NotConnected,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("controller worker has stopped")]
    Stopped,
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
