//! In-memory servo chain.
//!
//! `SimulatedArm` is a cloneable handle on shared state; buses opened through
//! its [`SimBusOpener`] see the same servos, so a test (or the CLI demo) can
//! move joints "by hand" while an adapter owns the bus.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use soarm_traits::{
    BusOpener, BusResult, DEFAULT_BAUDRATE, MotorBus, PortEnumerator, PortInfo, Register,
    SyncRead, baud_from_code,
};

use crate::error::HwError;

const CENTER_TICKS: i32 = 2048;
const DEFAULT_DECIVOLTS: i32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRecord {
    pub id: u8,
    pub reg: Register,
    pub value: i32,
}

#[derive(Debug, Clone)]
struct SimServo {
    baudrate: u32,
    regs: HashMap<Register, i32>,
}

impl SimServo {
    fn new(baudrate: u32, decivolts: i32) -> Self {
        let mut regs = HashMap::new();
        regs.insert(Register::PresentPosition, CENTER_TICKS);
        regs.insert(Register::GoalPosition, CENTER_TICKS);
        regs.insert(Register::PresentVoltage, decivolts);
        regs.insert(Register::Lock, 1);
        Self { baudrate, regs }
    }

    fn get(&self, reg: Register) -> i32 {
        self.regs.get(&reg).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct SimState {
    servos: BTreeMap<u8, SimServo>,
    failing_reads: HashSet<(u8, Register)>,
    ignored_writes: HashSet<(u8, Register)>,
    offline: bool,
    open_error: Option<String>,
    batched: bool,
    writes: Vec<WriteRecord>,
    opened: usize,
}

impl SimState {
    fn responder(&mut self, id: u8, baudrate: u32) -> Option<&mut SimServo> {
        if self.offline {
            return None;
        }
        self.servos.get_mut(&id).filter(|s| s.baudrate == baudrate)
    }

    fn read(&mut self, id: u8, reg: Register, baudrate: u32) -> Result<i32, HwError> {
        if self.failing_reads.contains(&(id, reg)) {
            return Err(HwError::NoResponse { id });
        }
        self.responder(id, baudrate)
            .map(|s| s.get(reg))
            .ok_or(HwError::NoResponse { id })
    }

    fn write(&mut self, id: u8, reg: Register, value: i32, baudrate: u32) -> Result<(), HwError> {
        if self.responder(id, baudrate).is_none() {
            return Err(HwError::NoResponse { id });
        }
        self.writes.push(WriteRecord { id, reg, value });
        if self.ignored_writes.contains(&(id, reg)) {
            return Ok(());
        }
        let Some(servo) = self.servos.get_mut(&id) else {
            return Err(HwError::NoResponse { id });
        };
        let unlocked = servo.get(Register::Lock) == 0;
        match reg {
            Register::PresentPosition | Register::PresentVoltage => {
                return Err(HwError::InvalidValue { reg, value });
            }
            Register::GoalPosition => {
                servo.regs.insert(reg, value);
                if servo.get(Register::TorqueEnable) == 1 {
                    servo.regs.insert(Register::PresentPosition, value);
                }
            }
            Register::BaudRate if unlocked => {
                let baud = baud_from_code(value).ok_or(HwError::InvalidValue { reg, value })?;
                servo.regs.insert(reg, value);
                servo.baudrate = baud;
            }
            Register::Id if unlocked => {
                let new_id = u8::try_from(value).map_err(|_| HwError::InvalidValue { reg, value })?;
                if let Some(mut moved) = self.servos.remove(&id) {
                    moved.regs.insert(Register::Id, value);
                    self.servos.insert(new_id, moved);
                }
            }
            r if r.is_eeprom() && !unlocked => {
                tracing::trace!(id, ?reg, "eeprom write while locked ignored");
            }
            _ => {
                servo.regs.insert(reg, value);
            }
        }
        Ok(())
    }
}

/// Handle on a simulated servo chain.
#[derive(Debug, Clone, Default)]
pub struct SimulatedArm {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedArm {
    /// Empty chain; add servos with [`SimulatedArm::add_servo`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Six servos with ids 1..=6 at the factory baud rate, centred, on a 6 V supply.
    pub fn six_axis() -> Self {
        let arm = Self::new();
        for id in 1..=6 {
            arm.add_servo(id, DEFAULT_BAUDRATE);
        }
        arm
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_servo(&self, id: u8, baudrate: u32) {
        let mut s = self.lock();
        let mut servo = SimServo::new(baudrate, DEFAULT_DECIVOLTS);
        servo.regs.insert(Register::Id, i32::from(id));
        s.servos.insert(id, servo);
    }

    pub fn remove_servo(&self, id: u8) {
        self.lock().servos.remove(&id);
    }

    pub fn servo_ids(&self) -> Vec<u8> {
        self.lock().servos.keys().copied().collect()
    }

    pub fn servo_baudrate(&self, id: u8) -> Option<u32> {
        self.lock().servos.get(&id).map(|s| s.baudrate)
    }

    pub fn register(&self, id: u8, reg: Register) -> Option<i32> {
        self.lock().servos.get(&id).map(|s| s.get(reg))
    }

    /// Moves a joint as an operator would with torque off.
    pub fn set_position(&self, id: u8, ticks: i32) {
        if let Some(servo) = self.lock().servos.get_mut(&id) {
            servo.regs.insert(Register::PresentPosition, ticks);
        }
    }

    pub fn position(&self, id: u8) -> Option<i32> {
        self.register(id, Register::PresentPosition)
    }

    /// Sets every servo's supply reading, in volts.
    pub fn set_supply_volts(&self, volts: f64) {
        let decivolts = (volts * 10.0).round() as i32;
        for servo in self.lock().servos.values_mut() {
            servo.regs.insert(Register::PresentVoltage, decivolts);
        }
    }

    pub fn fail_reads(&self, id: u8, reg: Register) {
        self.lock().failing_reads.insert((id, reg));
    }

    /// Acknowledge writes to `reg` on `id` without applying them.
    pub fn ignore_writes(&self, id: u8, reg: Register) {
        self.lock().ignored_writes.insert((id, reg));
    }

    pub fn clear_faults(&self) {
        let mut s = self.lock();
        s.failing_reads.clear();
        s.ignored_writes.clear();
        s.offline = false;
    }

    /// No servo answers while offline.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Make subsequent `open` calls fail with `msg`.
    pub fn set_open_error(&self, msg: Option<&str>) {
        self.lock().open_error = msg.map(str::to_owned);
    }

    /// Expose the batched read capability on opened buses.
    pub fn set_batched(&self, batched: bool) {
        self.lock().batched = batched;
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    pub fn open_count(&self) -> usize {
        self.lock().opened
    }

    pub fn opener(&self) -> SimBusOpener {
        SimBusOpener { arm: self.clone() }
    }
}

#[derive(Debug, Clone)]
pub struct SimBusOpener {
    arm: SimulatedArm,
}

impl BusOpener for SimBusOpener {
    fn open(&self, port: &str, baudrate: u32) -> BusResult<Box<dyn MotorBus>> {
        let mut s = self.arm.lock();
        if let Some(msg) = &s.open_error {
            return Err(Box::new(HwError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{port}: {msg}"),
            ))));
        }
        s.opened += 1;
        tracing::debug!(port, baudrate, "simulated bus opened");
        Ok(Box::new(SimulatedBus {
            arm: self.arm.clone(),
            baudrate,
            closed: false,
        }))
    }
}

#[derive(Debug)]
pub struct SimulatedBus {
    arm: SimulatedArm,
    baudrate: u32,
    closed: bool,
}

impl SimulatedBus {
    fn ensure_open(&self) -> Result<(), HwError> {
        if self.closed {
            Err(HwError::Closed)
        } else {
            Ok(())
        }
    }
}

impl MotorBus for SimulatedBus {
    fn read(&mut self, id: u8, reg: Register) -> BusResult<i32> {
        self.ensure_open()?;
        Ok(self.arm.lock().read(id, reg, self.baudrate)?)
    }

    fn write(&mut self, id: u8, reg: Register, value: i32) -> BusResult<()> {
        self.ensure_open()?;
        tracing::trace!(id, ?reg, value, "sim write");
        Ok(self.arm.lock().write(id, reg, value, self.baudrate)?)
    }

    fn ping(&mut self, id: u8) -> bool {
        !self.closed && self.arm.lock().responder(id, self.baudrate).is_some()
    }

    fn set_baudrate(&mut self, baudrate: u32) -> BusResult<()> {
        self.ensure_open()?;
        if !soarm_traits::BAUD_RATES.contains(&baudrate) {
            return Err(Box::new(HwError::UnsupportedBaud(baudrate)));
        }
        self.baudrate = baudrate;
        Ok(())
    }

    fn baudrate(&self) -> u32 {
        self.baudrate
    }

    fn close(&mut self) -> BusResult<()> {
        self.closed = true;
        Ok(())
    }

    fn as_sync_read(&mut self) -> Option<&mut dyn SyncRead> {
        if self.arm.lock().batched {
            Some(self)
        } else {
            None
        }
    }
}

impl SyncRead for SimulatedBus {
    fn sync_read(&mut self, ids: &[u8], reg: Register) -> BusResult<Vec<Option<i32>>> {
        self.ensure_open()?;
        let mut s = self.arm.lock();
        Ok(ids
            .iter()
            .map(|&id| s.read(id, reg, self.baudrate).ok())
            .collect())
    }
}

/// Port list that tests and the CLI demo can plug and unplug.
#[derive(Debug, Clone, Default)]
pub struct SimPorts {
    ports: Arc<Mutex<Vec<PortInfo>>>,
}

impl SimPorts {
    pub fn new(ports: Vec<PortInfo>) -> Self {
        Self {
            ports: Arc::new(Mutex::new(ports)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PortInfo>> {
        self.ports.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn plug(&self, info: PortInfo) {
        self.lock().push(info);
    }

    pub fn unplug(&self, name: &str) {
        self.lock().retain(|p| p.name != name);
    }
}

impl PortEnumerator for SimPorts {
    fn ports(&self) -> Result<Vec<PortInfo>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.lock().clone())
    }
}
