use std::time::{Duration, Instant};

/// Outcome of polling an HX711 data line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// The line stayed high for the whole wait; the caller should retry later.
    NotReady,
}

/// Poll `is_high` until the line goes low or `timeout` expires, sleeping
/// `poll_interval` between checks instead of spinning.
pub fn wait_until_low(
    mut is_high: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Readiness {
    let deadline = Instant::now() + timeout;
    while is_high() {
        if Instant::now() >= deadline {
            return Readiness::NotReady;
        }
        std::thread::sleep(poll_interval);
    }
    Readiness::Ready
}
