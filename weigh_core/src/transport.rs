//! Transport supervision: open/close with diagnostic events, bounded reads,
//! reconnect backoff and quiet-line detection.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use weigh_traits::{Frame, Transport};

use crate::error::WeighError;
use crate::hw_error::map_hw_error;
use crate::state::SharedState;

/// Exponential reconnect delay: `initial`, doubling, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait now; the following call returns twice as much, up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let d = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        d
    }

    pub fn peek(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Emits one "no data" notice per quiet period; re-armed by the next data.
#[derive(Debug, Clone)]
pub struct IdleTracker {
    quiet: Duration,
    last_data: Option<Instant>,
    armed: bool,
}

impl IdleTracker {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            last_data: None,
            armed: true,
        }
    }

    pub fn on_data(&mut self, now: Instant) {
        self.last_data = Some(now);
        self.armed = true;
    }

    /// Call after an empty read. Returns how long the line has been quiet when
    /// a notice is due.
    pub fn on_quiet(&mut self, now: Instant) -> Option<Duration> {
        let Some(since) = self.last_data else {
            self.last_data = Some(now);
            return None;
        };
        let quiet_for = now.saturating_duration_since(since);
        if !self.armed || quiet_for < self.quiet {
            return None;
        }
        self.armed = false;
        Some(quiet_for)
    }
}

/// Owns the physical link behind the transport lock. Every lifecycle change is
/// recorded in the diagnostic log and through `tracing`.
pub struct TransportManager<T: Transport> {
    link: Mutex<T>,
    state: Arc<SharedState>,
}

impl<T: Transport> TransportManager<T> {
    pub fn new(transport: T, state: Arc<SharedState>) -> Self {
        Self {
            link: Mutex::new(transport),
            state,
        }
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.link
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn describe(&self) -> String {
        self.lock().describe()
    }

    pub fn is_self_paced(&self) -> bool {
        self.lock().is_self_paced()
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_open()
    }

    /// Open the link if needed. Idempotent; `false` means the caller should back off.
    pub fn ensure_open(&self) -> bool {
        let mut link = self.lock();
        if link.is_open() {
            return true;
        }
        match link.open() {
            Ok(()) => {
                let name = link.describe();
                tracing::info!(link = %name, "transport opened");
                self.state.record_event(format!("Opened {name}"));
                true
            }
            Err(e) => {
                tracing::warn!(link = %link.describe(), error = %e, "transport open failed");
                self.state.record_event(format!("Serial open failed: {e}"));
                false
            }
        }
    }

    /// Bounded read. `Ok(None)` for a quiet line or a closed link. On a fault the
    /// handle is closed before the error is returned.
    pub fn read_frame(&self, timeout: Duration) -> Result<Option<Frame>, WeighError> {
        let mut link = self.lock();
        if !link.is_open() {
            return Ok(None);
        }
        match link.read_frame(timeout) {
            Ok(frame) => {
                if let Some(f) = &frame {
                    tracing::trace!(frame = %f.text(), "frame received");
                }
                Ok(frame)
            }
            Err(e) => {
                let mapped = map_hw_error(e.as_ref());
                tracing::warn!(error = %e, "transport read failed");
                self.state.record_event(format!("Serial exception: {e}"));
                link.close();
                self.state.record_event("Serial connection closed");
                Err(mapped)
            }
        }
    }

    /// Close the link if it is open.
    pub fn close(&self) {
        let mut link = self.lock();
        if link.is_open() {
            link.close();
            tracing::info!(link = %link.describe(), "transport closed");
            self.state.record_event("Serial connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Calibration;
    use crate::mocks::{FailingOpenTransport, ScriptedTransport, Step};

    #[test]
    fn backoff_doubles_to_the_cap() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(10));
        let seq: Vec<u64> = (0..7).map(|_| b.next_delay().as_secs()).collect();
        assert_eq!(seq, vec![1, 2, 4, 8, 10, 10, 10]);
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn backoff_never_exceeds_cap_and_never_shrinks() {
        let mut b = Backoff::new(Duration::from_millis(300), Duration::from_millis(5000));
        let mut prev = Duration::ZERO;
        for _ in 0..64 {
            let d = b.next_delay();
            assert!(d <= Duration::from_millis(5000));
            assert!(d >= prev);
            prev = d;
        }
    }

    #[test]
    fn idle_notice_fires_once_per_quiet_period() {
        let t0 = Instant::now();
        let mut idle = IdleTracker::new(Duration::from_millis(500));
        assert_eq!(idle.on_quiet(t0), None);
        assert_eq!(idle.on_quiet(t0 + Duration::from_millis(200)), None);
        assert_eq!(
            idle.on_quiet(t0 + Duration::from_millis(700)),
            Some(Duration::from_millis(700))
        );
        assert_eq!(idle.on_quiet(t0 + Duration::from_secs(5)), None);
        idle.on_data(t0 + Duration::from_secs(6));
        assert!(idle.on_quiet(t0 + Duration::from_secs(7)).is_some());
    }

    fn state() -> Arc<SharedState> {
        Arc::new(SharedState::new(Calibration::default(), 100))
    }

    fn events(state: &SharedState) -> Vec<String> {
        state
            .diagnostic_log(100)
            .into_iter()
            .filter_map(|e| e.event)
            .collect()
    }

    #[test]
    fn open_failure_is_logged_and_reported() {
        let st = state();
        let mgr = TransportManager::new(FailingOpenTransport::new("no such port"), st.clone());
        assert!(!mgr.ensure_open());
        assert_eq!(events(&st), vec!["Serial open failed: no such port"]);
    }

    #[test]
    fn read_fault_closes_the_link() {
        let st = state();
        let t = ScriptedTransport::new(vec![Step::Frame("ST,GS,1.0g".into()), Step::Fault("unplugged".into())]);
        let mgr = TransportManager::new(t, st.clone());
        assert!(mgr.ensure_open());
        assert!(mgr.ensure_open());
        assert!(mgr.read_frame(Duration::from_millis(10)).unwrap().is_some());
        let err = mgr.read_frame(Duration::from_millis(10)).unwrap_err();
        assert_eq!(err, WeighError::Transport("unplugged".into()));
        assert!(!mgr.is_open());
        assert_eq!(
            events(&st),
            vec![
                "Opened scripted".to_string(),
                "Serial exception: unplugged".to_string(),
                "Serial connection closed".to_string(),
            ]
        );
    }

    #[test]
    fn close_is_idempotent() {
        let st = state();
        let mgr = TransportManager::new(ScriptedTransport::new(vec![]), st.clone());
        mgr.ensure_open();
        mgr.close();
        mgr.close();
        let closes = events(&st)
            .iter()
            .filter(|e| e.as_str() == "Serial connection closed")
            .count();
        assert_eq!(closes, 1);
    }
}
