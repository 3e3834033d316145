//! Outcome of a calibration wizard step.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// The wizard finished and the profile was saved.
    Success,
    /// The wizard advanced (or reported progress) and expects another step.
    InProgress,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub status: StepStatus,
    pub message: String,
}

impl StepReport {
    pub(crate) fn in_progress(message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::InProgress,
            message: message.into(),
        }
    }

    pub(crate) fn success(message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Success,
            message: message.into(),
        }
    }

    pub(crate) fn error(message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Error,
            message: message.into(),
        }
    }
}
