//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

/// Flushes the log file writer when taken and dropped.
pub static FILE_GUARD: Mutex<Option<tracing_appender::non_blocking::WorkerGuard>> =
    Mutex::new(None);
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "soarm", version, about = "SO-ARM controller CLI")]
pub struct Cli {
    /// Path to config TOML (defaults are used when the file does not exist)
    #[arg(long, value_name = "FILE", default_value = "etc/soarm_config.toml")]
    pub config: PathBuf,

    /// Log and print results as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging].level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Servo chain behind the simulated bus
    #[arg(long, value_enum, value_name = "CHAIN", default_value_t = SimChain::Arm)]
    pub sim: SimChain,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// What the simulated bus has plugged in.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SimChain {
    /// Six configured servos, ids 1..=6
    Arm,
    /// One factory-fresh servo (id 1, 1 Mbaud)
    Single,
    /// Nothing answers
    Empty,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Role {
    Follower,
    Leader,
}

impl From<Role> for soarm_core::RobotRole {
    fn from(r: Role) -> Self {
        match r {
            Role::Follower => Self::Follower,
            Role::Leader => Self::Leader,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List serial ports that look like USB serial adapters
    Ports {
        /// Include every port the OS reports
        #[arg(long)]
        all: bool,
    },
    /// Find the arm's serial port
    FindPort {
        /// Ask the operator to unplug the arm and diff the port lists
        #[arg(long, action = ArgAction::SetTrue)]
        unplug: bool,
    },
    /// Print joint positions and limits
    State {
        /// Serial port (config or discovery when omitted)
        #[arg(long)]
        port: Option<String>,
    },
    /// Move one joint to an absolute angle in degrees
    Move {
        #[arg(long)]
        port: Option<String>,
        /// Joint index 0..=5
        #[arg(long)]
        joint: usize,
        #[arg(long, allow_hyphen_values = true)]
        degrees: f64,
    },
    /// Report the supply voltage and its class
    Voltage {
        #[arg(long)]
        port: Option<String>,
    },
    /// Run the range calibration wizard
    Calibrate {
        #[arg(long)]
        port: Option<String>,
        /// Sweep each simulated joint automatically instead of reading stdin
        #[arg(long, action = ArgAction::SetTrue)]
        demo: bool,
    },
    /// Drive every joint to the stored home pose
    Home {
        #[arg(long)]
        port: Option<String>,
    },
    /// Take the current pose as zero and save the profile
    Zero {
        #[arg(long)]
        port: Option<String>,
    },
    /// Capture the two reference poses and write a tick profile
    TwoPose {
        #[arg(long)]
        port: Option<String>,
        /// Where to write the tick profile
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
    /// Convert a tick profile from the two-pose calibrator and store it
    ImportLegacy {
        /// Legacy JSON file
        file: PathBuf,
    },
    /// Keyboard teleoperation; reads one key per stdin line
    Teleop {
        #[arg(long)]
        port: Option<String>,
    },
    /// Give a single connected servo its joint id and the bus baud rate
    SetupMotor {
        #[arg(long)]
        port: Option<String>,
        #[arg(long)]
        id: u8,
        #[arg(long, default_value_t = soarm_traits::DEFAULT_BAUDRATE)]
        baudrate: u32,
    },
    /// Walk the six servos in setup order, one at a time
    SetupArm {
        #[arg(long)]
        port: Option<String>,
        #[arg(long, value_enum, default_value_t = Role::Follower)]
        role: Role,
    },
    /// Report the id and baud rate of the servo(s) on the bus
    CheckMotor {
        #[arg(long)]
        port: Option<String>,
    },
    /// Change a servo's id
    ResetMotor {
        #[arg(long)]
        port: Option<String>,
        #[arg(long)]
        current: u8,
        #[arg(long)]
        new: u8,
        #[arg(long, default_value_t = soarm_traits::DEFAULT_BAUDRATE)]
        baudrate: u32,
    },
}
