//! Type-state builder for `RobotController`.
//!
//! `build()` only exists once a bus opener and a port enumerator are set.
//! `try_build()` is available in every state and reports what is missing.

use std::marker::PhantomData;
use std::sync::Arc;

use soarm_traits::{BusOpener, Clock, MonotonicClock, PortEnumerator};

use crate::adapter::RobotAdapter;
use crate::calibration::CalibrationEngine;
use crate::config::{AdapterCfg, ControlCfg, RobotIdentity};
use crate::control::ControlSession;
use crate::controller::RobotController;
use crate::discovery::PortDiscovery;
use crate::error::{BuildError, Result};
use crate::logger::{EventSink, TracingSink};
use crate::setup::MotorSetupManager;

pub struct Missing;
pub struct Set;

pub struct RobotControllerBuilder<O, P> {
    opener: Option<Arc<dyn BusOpener>>,
    ports: Option<Box<dyn PortEnumerator>>,
    adapter: AdapterCfg,
    control: ControlCfg,
    identity: RobotIdentity,
    port: Option<String>,
    clock: Option<Arc<dyn Clock>>,
    sink: Option<Arc<dyn EventSink>>,
    _o: PhantomData<O>,
    _p: PhantomData<P>,
}

impl Default for RobotControllerBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            opener: None,
            ports: None,
            adapter: AdapterCfg::default(),
            control: ControlCfg::default(),
            identity: RobotIdentity::default(),
            port: None,
            clock: None,
            sink: None,
            _o: PhantomData,
            _p: PhantomData,
        }
    }
}

fn validate(adapter: &AdapterCfg, control: &ControlCfg) -> std::result::Result<(), BuildError> {
    if adapter.resolution < 2 {
        return Err(BuildError::InvalidConfig("resolution must be >= 2"));
    }
    if !(control.step_size.is_finite() && control.step_size > 0.0) {
        return Err(BuildError::InvalidConfig("control.step_size must be > 0"));
    }
    if adapter
        .default_limits
        .iter()
        .any(|l| !(l.min.is_finite() && l.max.is_finite()) || l.min > l.max)
    {
        return Err(BuildError::InvalidConfig("joint limits must satisfy min <= max"));
    }
    Ok(())
}

impl<O, P> RobotControllerBuilder<O, P> {
    pub fn try_build(self) -> Result<RobotController> {
        let opener = self
            .opener
            .ok_or_else(|| eyre::Report::new(BuildError::MissingOpener))?;
        let ports = self
            .ports
            .ok_or_else(|| eyre::Report::new(BuildError::MissingEnumerator))?;
        validate(&self.adapter, &self.control).map_err(eyre::Report::new)?;

        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        let adapter =
            RobotAdapter::new(Box::new(Arc::clone(&opener)), self.adapter).with_sink(sink.clone());
        let calibration = CalibrationEngine::new(self.identity)
            .with_clock(clock.clone())
            .with_sink(sink.clone());
        let control = ControlSession::new(self.control, clock);
        let setup = MotorSetupManager::new(Box::new(opener)).with_sink(sink.clone());
        let discovery = PortDiscovery::new(ports);

        Ok(RobotController::from_parts(
            adapter,
            calibration,
            control,
            setup,
            discovery,
            self.port,
            sink,
        ))
    }

    pub fn with_adapter_cfg(mut self, cfg: AdapterCfg) -> Self {
        self.adapter = cfg;
        self
    }

    pub fn with_control_cfg(mut self, cfg: ControlCfg) -> Self {
        self.control = cfg;
        self
    }

    pub fn with_identity(mut self, identity: RobotIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Port used by `connect(None)` before falling back to discovery.
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Take adapter, control, identity and port from a loaded config file.
    pub fn with_config(mut self, cfg: &soarm_config::Config) -> Self {
        self.adapter = AdapterCfg::from(cfg);
        self.control = ControlCfg::from(&cfg.control);
        self.identity = RobotIdentity::from(cfg);
        self.port.clone_from(&cfg.robot.port);
        self
    }
}

impl<P> RobotControllerBuilder<Missing, P> {
    pub fn with_opener(self, opener: impl BusOpener + 'static) -> RobotControllerBuilder<Set, P> {
        RobotControllerBuilder {
            opener: Some(Arc::new(opener)),
            ports: self.ports,
            adapter: self.adapter,
            control: self.control,
            identity: self.identity,
            port: self.port,
            clock: self.clock,
            sink: self.sink,
            _o: PhantomData,
            _p: PhantomData,
        }
    }
}

impl<O> RobotControllerBuilder<O, Missing> {
    pub fn with_ports(
        self,
        ports: impl PortEnumerator + 'static,
    ) -> RobotControllerBuilder<O, Set> {
        RobotControllerBuilder {
            opener: self.opener,
            ports: Some(Box::new(ports)),
            adapter: self.adapter,
            control: self.control,
            identity: self.identity,
            port: self.port,
            clock: self.clock,
            sink: self.sink,
            _o: PhantomData,
            _p: PhantomData,
        }
    }
}

impl RobotControllerBuilder<Set, Set> {
    /// Validate and build. Only available once opener and enumerator are set.
    pub fn build(self) -> Result<RobotController> {
        self.try_build()
    }
}
