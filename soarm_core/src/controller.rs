//! The single owner of the arm.
//!
//! `RobotController` holds the adapter together with everything that drives
//! it: the calibration wizard, the teleoperation session, the motor setup
//! manager and port discovery. The bus is half-duplex, so anything that
//! opens the port for setup disconnects the adapter first.

use std::sync::Arc;

use crate::adapter::{RobotAdapter, RobotState};
use crate::builder::{Missing, RobotControllerBuilder};
use crate::calibration::{CalibrationEngine, RealtimeSnapshot};
use crate::control::{ControlEvent, ControlSession, ControlStatus, KeyEventKind};
use crate::discovery::PortDiscovery;
use crate::error::{CalibrationError, ConnectError, ControlError, SetupError};
use crate::logger::{EventLevel, EventSink};
use crate::setup::{MotorCheck, MotorConfigured, MotorReset, MotorSetupManager, RobotRole};
use crate::status::StepReport;

pub struct RobotController {
    adapter: RobotAdapter,
    calibration: CalibrationEngine,
    control: ControlSession,
    setup: MotorSetupManager,
    discovery: PortDiscovery,
    configured_port: Option<String>,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for RobotController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotController")
            .field("adapter", &self.adapter)
            .field("calibration", &self.calibration)
            .field("control", &self.control)
            .field("configured_port", &self.configured_port)
            .finish_non_exhaustive()
    }
}

impl RobotController {
    pub fn builder() -> RobotControllerBuilder<Missing, Missing> {
        RobotControllerBuilder::default()
    }

    pub(crate) fn from_parts(
        adapter: RobotAdapter,
        calibration: CalibrationEngine,
        control: ControlSession,
        setup: MotorSetupManager,
        discovery: PortDiscovery,
        configured_port: Option<String>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            adapter,
            calibration,
            control,
            setup,
            discovery,
            configured_port,
            sink,
        }
    }

    pub fn adapter(&self) -> &RobotAdapter {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut RobotAdapter {
        &mut self.adapter
    }

    pub fn calibration(&self) -> &CalibrationEngine {
        &self.calibration
    }

    pub fn calibration_mut(&mut self) -> &mut CalibrationEngine {
        &mut self.calibration
    }

    pub fn control(&self) -> &ControlSession {
        &self.control
    }

    pub fn setup(&self) -> &MotorSetupManager {
        &self.setup
    }

    pub fn discovery(&self) -> &PortDiscovery {
        &self.discovery
    }

    /// Replace the event sink on every component.
    pub fn set_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.adapter.set_sink(sink.clone());
        self.calibration.set_sink(sink.clone());
        self.setup.set_sink(sink.clone());
        self.sink = sink;
    }

    pub fn is_connected(&self) -> bool {
        self.adapter.is_connected()
    }

    /// Connect to `port`, else the configured port, else whatever discovery
    /// finds. A stored calibration profile is applied when present.
    pub fn connect(&mut self, port: Option<&str>) -> Result<String, ConnectError> {
        let port = match port.map(str::to_owned).or_else(|| self.configured_port.clone()) {
            Some(p) => p,
            None => self.discovery.discover()?,
        };
        self.adapter.connect(&port)?;
        match self.calibration.load_profile(&mut self.adapter) {
            Ok(()) => {}
            Err(CalibrationError::MissingProfile { model, serial_id }) => {
                tracing::info!(model, serial_id, "no stored calibration; running uncalibrated");
            }
            Err(e) => self.sink.log(
                &format!("Stored calibration not applied: {e}"),
                EventLevel::Warning,
            ),
        }
        Ok(port)
    }

    pub fn disconnect(&mut self) {
        if self.control.status().running {
            self.control.stop();
        }
        self.adapter.disconnect();
    }

    pub fn state(&mut self) -> RobotState {
        self.adapter.get_state()
    }

    pub fn calibrate_step(&mut self) -> StepReport {
        self.calibration.calibrate_step(&mut self.adapter)
    }

    pub fn update_realtime_positions(&mut self) -> RealtimeSnapshot {
        self.calibration.update_realtime_positions(&mut self.adapter)
    }

    pub fn record_joint_min(&mut self) -> bool {
        self.calibration.record_joint_min(&mut self.adapter)
    }

    pub fn record_joint_max(&mut self) -> bool {
        self.calibration.record_joint_max(&mut self.adapter)
    }

    pub fn home(&mut self) -> bool {
        self.calibration.home(&mut self.adapter)
    }

    pub fn zero_joints(&mut self) -> bool {
        self.calibration.zero_joints(&mut self.adapter)
    }

    pub fn start_control(&mut self) -> Result<ControlStatus, ControlError> {
        self.control.start(&mut self.adapter)
    }

    pub fn stop_control(&mut self) -> ControlStatus {
        self.control.stop()
    }

    pub fn handle_key(&mut self, key: &str, kind: KeyEventKind) -> Option<ControlEvent> {
        self.control.handle_key(&mut self.adapter, key, kind)
    }

    fn release_bus(&mut self) {
        if self.adapter.is_connected() {
            self.sink.log(
                "Disconnecting robot to free the bus for motor setup",
                EventLevel::Warning,
            );
            self.disconnect();
        }
    }

    /// Start a motor setup session. The adapter is disconnected and the
    /// port is pre-filled when a known controller is plugged in.
    pub fn begin_setup(&mut self, role: RobotRole) {
        self.release_bus();
        self.setup.begin(role);
        match self.discovery.find_by_pid() {
            Ok(Some(port)) => self.setup.set_port(&port),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "port lookup for setup failed"),
        }
    }

    pub fn set_setup_port(&mut self, port: &str) {
        self.setup.set_port(port);
    }

    pub fn configure_motor(
        &mut self,
        port: &str,
        motor_id: u8,
        baudrate: u32,
    ) -> Result<MotorConfigured, SetupError> {
        self.release_bus();
        self.setup.configure_motor(port, motor_id, baudrate)
    }

    pub fn reset_motor_id(
        &mut self,
        port: &str,
        current_id: u8,
        new_id: u8,
        baudrate: u32,
    ) -> Result<MotorReset, SetupError> {
        self.release_bus();
        self.setup.reset_motor_id(port, current_id, new_id, baudrate)
    }

    pub fn check_motor_id(&mut self, port: &str) -> Result<MotorCheck, SetupError> {
        self.release_bus();
        self.setup.check_motor_id(port)
    }
}
