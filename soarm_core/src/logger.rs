//! Operator-facing event messages.
//!
//! Components report transitions through an `EventSink` as
//! `(message, level)` pairs. Closures implement the trait, and the default
//! sink forwards to `tracing`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Success => "success",
        })
    }
}

pub trait EventSink: Send + Sync {
    fn log(&self, message: &str, level: EventLevel);
}

impl<F> EventSink for F
where
    F: Fn(&str, EventLevel) + Send + Sync,
{
    fn log(&self, message: &str, level: EventLevel) {
        self(message, level);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn log(&self, message: &str, level: EventLevel) {
        match level {
            EventLevel::Info | EventLevel::Success => {
                tracing::info!(target: "soarm::events", %level, "{message}");
            }
            EventLevel::Warning => tracing::warn!(target: "soarm::events", "{message}"),
            EventLevel::Error => tracing::error!(target: "soarm::events", "{message}"),
        }
    }
}
