//! One-time bring-up of factory-fresh servos.
//!
//! Each servo is connected alone, found by scanning every baud rate, then
//! given its joint id and the bus baud rate. Every EEPROM write is read back;
//! a mismatch aborts the operation.

use std::ops::RangeInclusive;
use std::sync::Arc;

use soarm_traits::{BAUD_RATES, BusOpener, DEFAULT_BAUDRATE, MotorBus, Register, baud_code};

use crate::error::SetupError;
use crate::logger::{EventLevel, EventSink, TracingSink};

/// Ids probed when looking for a single unconfigured servo.
const SCAN_IDS: RangeInclusive<u8> = 1..=9;
/// Ids probed by `check_motor_id`.
const CHECK_IDS: RangeInclusive<u8> = 1..=10;
pub const MAX_ACCELERATION: i32 = 254;

/// Configuration order: wrist end first, so each finished servo can be
/// daisy-chained before the next.
pub const SETUP_ORDER: [(&str, u8); 6] = [
    ("gripper", 6),
    ("wrist_roll", 5),
    ("wrist_flex", 4),
    ("elbow_flex", 3),
    ("shoulder_lift", 2),
    ("shoulder_pan", 1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotRole {
    Follower,
    Leader,
}

impl RobotRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Follower => "follower",
            Self::Leader => "leader",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetupStatus {
    #[default]
    Idle,
    FindingPort,
    PortFound,
    ConfiguringMotor,
    MotorConfigured,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorSlot {
    pub name: &'static str,
    pub id: u8,
    pub configured: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupSession {
    pub port: Option<String>,
    pub role: Option<RobotRole>,
    pub status: SetupStatus,
    pub current_motor_index: usize,
    pub motors: Vec<MotorSlot>,
    pub error: Option<String>,
}

impl SetupSession {
    pub fn current_motor(&self) -> Option<&MotorSlot> {
        self.motors.get(self.current_motor_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorConfigured {
    pub previous_id: u8,
    pub previous_baudrate: u32,
    pub id: u8,
    pub baudrate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorReset {
    pub previous_id: u8,
    pub id: u8,
    pub baudrate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MotorCheck {
    Single { id: u8, baudrate: u32 },
    /// More than one servo answered; the operator should disconnect extras.
    Multiple(Vec<(u8, u32)>),
}

fn bus_err(during: &'static str) -> impl FnOnce(Box<dyn std::error::Error + Send + Sync>) -> SetupError {
    move |e| SetupError::Bus {
        during,
        reason: e.to_string(),
    }
}

fn verify(
    bus: &mut dyn MotorBus,
    id: u8,
    reg: Register,
    expected: i32,
    what: &'static str,
) -> Result<(), SetupError> {
    let actual = bus.read(id, reg).ok();
    if actual == Some(expected) {
        Ok(())
    } else {
        tracing::error!(id, ?reg, expected, ?actual, "read-back mismatch");
        Err(SetupError::Verification {
            what,
            expected,
            actual,
        })
    }
}

/// Exactly one responder in `ids` at some baud rate.
fn scan_single(
    bus: &mut dyn MotorBus,
    port: &str,
    ids: RangeInclusive<u8>,
) -> Result<(u8, u32), SetupError> {
    for baud in BAUD_RATES {
        bus.set_baudrate(baud).map_err(bus_err("baud scan"))?;
        let found: Vec<u8> = ids.clone().filter(|&id| bus.ping(id)).collect();
        match found.as_slice() {
            [] => {}
            [id] => {
                tracing::info!(id, baud, "motor found");
                return Ok((*id, baud));
            }
            _ => {
                return Err(SetupError::MultipleMotors {
                    ids: found,
                    baudrate: baud,
                });
            }
        }
    }
    Err(SetupError::NoMotor {
        port: port.to_owned(),
    })
}

fn write_id(bus: &mut dyn MotorBus, current: u8, new_id: u8) -> Result<(), SetupError> {
    bus.write(current, Register::Lock, 0)
        .map_err(bus_err("unlock"))?;
    bus.write(current, Register::Id, i32::from(new_id))
        .map_err(bus_err("id write"))?;
    verify(bus, new_id, Register::Id, i32::from(new_id), "motor id")
}

fn configure(
    bus: &mut dyn MotorBus,
    port: &str,
    motor_id: u8,
    baudrate: u32,
) -> Result<MotorConfigured, SetupError> {
    let code = baud_code(baudrate).ok_or(SetupError::UnsupportedBaud(baudrate))?;
    let (found_id, found_baud) = scan_single(bus, port, SCAN_IDS)?;

    bus.write(found_id, Register::Lock, 0)
        .map_err(bus_err("unlock"))?;
    if baudrate != found_baud {
        bus.write(found_id, Register::BaudRate, code)
            .map_err(bus_err("baud write"))?;
        bus.set_baudrate(baudrate).map_err(bus_err("baud switch"))?;
        verify(bus, found_id, Register::BaudRate, code, "baud rate")?;
    }
    if found_id != motor_id {
        write_id(bus, found_id, motor_id)?;
    }
    bus.write(motor_id, Register::Lock, 0)
        .map_err(bus_err("unlock"))?;
    bus.write(motor_id, Register::MaxAcceleration, MAX_ACCELERATION)
        .map_err(bus_err("acceleration write"))?;
    Ok(MotorConfigured {
        previous_id: found_id,
        previous_baudrate: found_baud,
        id: motor_id,
        baudrate,
    })
}

fn reset_id(
    bus: &mut dyn MotorBus,
    port: &str,
    current_id: u8,
    new_id: u8,
) -> Result<MotorReset, SetupError> {
    let (id, baud) = if bus.ping(current_id) {
        (current_id, bus.baudrate())
    } else {
        tracing::info!(current_id, "motor not at expected id; scanning");
        let (id, baud) = scan_single(bus, port, SCAN_IDS)?;
        bus.set_baudrate(baud).map_err(bus_err("baud switch"))?;
        (id, baud)
    };
    write_id(bus, id, new_id)?;
    Ok(MotorReset {
        previous_id: id,
        id: new_id,
        baudrate: baud,
    })
}

fn check(bus: &mut dyn MotorBus, port: &str) -> Result<MotorCheck, SetupError> {
    let mut found: Vec<(u8, u32)> = Vec::new();
    for baud in BAUD_RATES {
        bus.set_baudrate(baud).map_err(bus_err("baud scan"))?;
        for id in CHECK_IDS {
            if !bus.ping(id) {
                continue;
            }
            let stored = bus
                .read(id, Register::Id)
                .ok()
                .and_then(|v| u8::try_from(v).ok())
                .unwrap_or(id);
            if !found.contains(&(stored, baud)) {
                found.push((stored, baud));
            }
        }
    }
    match found.as_slice() {
        [] => Err(SetupError::NoMotor {
            port: port.to_owned(),
        }),
        [(id, baudrate)] => Ok(MotorCheck::Single {
            id: *id,
            baudrate: *baudrate,
        }),
        _ => Ok(MotorCheck::Multiple(found)),
    }
}

pub struct MotorSetupManager {
    opener: Box<dyn BusOpener>,
    session: SetupSession,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for MotorSetupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotorSetupManager")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl MotorSetupManager {
    pub fn new(opener: Box<dyn BusOpener>) -> Self {
        Self {
            opener,
            session: SetupSession::default(),
            sink: Arc::new(TracingSink),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn set_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sink = sink;
    }

    pub fn session(&self) -> &SetupSession {
        &self.session
    }

    pub fn reset(&mut self) {
        self.session = SetupSession::default();
    }

    /// Start a session for `role` with the fixed motor order.
    pub fn begin(&mut self, role: RobotRole) {
        self.session = SetupSession {
            role: Some(role),
            status: SetupStatus::FindingPort,
            motors: SETUP_ORDER
                .iter()
                .map(|&(name, id)| MotorSlot {
                    name,
                    id,
                    configured: false,
                })
                .collect(),
            ..SetupSession::default()
        };
        tracing::info!(role = role.as_str(), "motor setup started");
    }

    pub fn set_port(&mut self, port: &str) {
        self.session.port = Some(port.to_owned());
        self.session.status = SetupStatus::PortFound;
        self.sink
            .log(&format!("Setup port set to {port}"), EventLevel::Info);
    }

    fn open(&self, port: &str, baudrate: u32) -> Result<Box<dyn MotorBus>, SetupError> {
        self.opener
            .open(port, baudrate)
            .map_err(|e| SetupError::Open {
                port: port.to_owned(),
                reason: e.to_string(),
            })
    }

    fn fail(&mut self, err: &SetupError) {
        self.session.status = SetupStatus::Error;
        self.session.error = Some(err.to_string());
        self.sink.log(&err.to_string(), EventLevel::Error);
    }

    /// Give the single connected servo `motor_id` and `baudrate`.
    pub fn configure_motor(
        &mut self,
        port: &str,
        motor_id: u8,
        baudrate: u32,
    ) -> Result<MotorConfigured, SetupError> {
        self.session.status = SetupStatus::ConfiguringMotor;
        self.session.error = None;
        let result = self.open(port, DEFAULT_BAUDRATE).and_then(|mut bus| {
            let r = configure(bus.as_mut(), port, motor_id, baudrate);
            if let Err(e) = bus.close() {
                tracing::warn!(error = %e, "setup bus close failed");
            }
            r
        });
        match &result {
            Ok(done) => {
                if let Some(slot) = self.session.motors.iter_mut().find(|m| m.id == done.id) {
                    slot.configured = true;
                }
                let next = self.session.motors.iter().position(|m| !m.configured);
                self.session.current_motor_index = next.unwrap_or(self.session.motors.len());
                self.session.status = if !self.session.motors.is_empty() && next.is_none() {
                    SetupStatus::Completed
                } else {
                    SetupStatus::MotorConfigured
                };
                self.sink.log(
                    &format!(
                        "Motor configured: id {} -> {}, {} baud",
                        done.previous_id, done.id, done.baudrate
                    ),
                    EventLevel::Success,
                );
            }
            Err(e) => self.fail(e),
        }
        result
    }

    /// Change a servo's id, scanning for it if it is not at `current_id`.
    pub fn reset_motor_id(
        &mut self,
        port: &str,
        current_id: u8,
        new_id: u8,
        baudrate: u32,
    ) -> Result<MotorReset, SetupError> {
        let result = self.open(port, baudrate).and_then(|mut bus| {
            let r = reset_id(bus.as_mut(), port, current_id, new_id);
            if let Err(e) = bus.close() {
                tracing::warn!(error = %e, "setup bus close failed");
            }
            r
        });
        match &result {
            Ok(done) => self.sink.log(
                &format!("Motor id changed: {} -> {}", done.previous_id, done.id),
                EventLevel::Success,
            ),
            Err(e) => self.fail(e),
        }
        result
    }

    /// Report which servo ids answer on `port`, at any baud rate.
    pub fn check_motor_id(&mut self, port: &str) -> Result<MotorCheck, SetupError> {
        let mut bus = self.open(port, DEFAULT_BAUDRATE)?;
        let result = check(bus.as_mut(), port);
        if let Err(e) = bus.close() {
            tracing::warn!(error = %e, "setup bus close failed");
        }
        if let Ok(MotorCheck::Multiple(found)) = &result {
            self.sink.log(
                &format!("Multiple motors answered: {found:?}"),
                EventLevel::Warning,
            );
        }
        result
    }
}
