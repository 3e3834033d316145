//! Test and helper doubles for soarm_core

use std::sync::{Arc, Mutex};

use soarm_traits::{BusOpener, BusResult, MotorBus, PortEnumerator, PortInfo};

use crate::logger::{EventLevel, EventSink};

/// Collects every event for later assertions. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<(String, EventLevel)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, EventLevel)> {
        self.events.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn count(&self, level: EventLevel) -> usize {
        self.events().iter().filter(|(_, l)| *l == level).count()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.events().iter().any(|(m, _)| m.contains(needle))
    }
}

impl EventSink for RecordingSink {
    fn log(&self, message: &str, level: EventLevel) {
        if let Ok(mut v) = self.events.lock() {
            v.push((message.to_owned(), level));
        }
    }
}

/// An opener that never finds a bus.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeadOpener;

impl BusOpener for DeadOpener {
    fn open(&self, port: &str, _baudrate: u32) -> BusResult<Box<dyn MotorBus>> {
        Err(Box::new(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no device at {port}"),
        )))
    }
}

/// A fixed port list.
#[derive(Debug, Default, Clone)]
pub struct StaticPorts(pub Vec<PortInfo>);

impl PortEnumerator for StaticPorts {
    fn ports(&self) -> Result<Vec<PortInfo>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.0.clone())
    }
}
