//! Maps `Box<dyn Error>` from the bus trait boundary to a typed `BusFault`.
//!
//! The traits in `soarm_traits` use `Box<dyn Error + Send + Sync>`; this
//! module classifies those, with a feature-gated path for
//! `soarm_hardware::HwError` downcasting.

use crate::error::BusFault;

/// Classify a bus error.
///
/// Known hardware error types are downcast first, then the message is
/// inspected.
pub fn map_bus_error(e: &(dyn std::error::Error + 'static)) -> BusFault {
    #[cfg(feature = "hardware-errors")]
    {
        use soarm_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => BusFault::Timeout,
                HwError::NoResponse { id } => BusFault::NoResponse(*id),
                HwError::Closed => BusFault::Closed,
                other => BusFault::Other(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        BusFault::Timeout
    } else {
        BusFault::Other(s)
    }
}
