//! Maps `Box<dyn Error>` from the `Transport` boundary to typed `WeighError`.
//!
//! The traits in `weigh_traits` use `Box<dyn Error + Send + Sync>`; this module
//! recovers typed errors, with an optional feature-gated path for
//! `weigh_hardware::HwError` downcasting.

use crate::error::WeighError;

/// Map a trait-boundary error to a typed `WeighError`.
///
/// Known hardware errors are downcast first, then string heuristics apply.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> WeighError {
    #[cfg(feature = "hardware-errors")]
    {
        use weigh_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
                    WeighError::Timeout
                }
                other => WeighError::Transport(other.to_string()),
            };
        }
    }

    if let Some(io) = e.downcast_ref::<std::io::Error>()
        && io.kind() == std::io::ErrorKind::TimedOut
    {
        return WeighError::Timeout;
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        WeighError::Timeout
    } else {
        WeighError::Transport(s)
    }
}
