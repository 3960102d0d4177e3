//! Simulated ASCII scale for development without hardware.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use weigh_traits::{BoxError, Frame, Transport};

/// Handle used to move the simulated load while the transport is owned elsewhere.
#[derive(Debug, Clone, Default)]
pub struct SimHandle {
    grams: Arc<Mutex<f64>>,
}

impl SimHandle {
    pub fn set_grams(&self, g: f64) {
        if let Ok(mut w) = self.grams.lock() {
            *w = g;
        }
    }

    pub fn grams(&self) -> f64 {
        self.grams.lock().map(|g| *g).unwrap_or(0.0)
    }
}

/// Emits `ST,GS,<weight>kg` frames (or `US,...` while the load is moving) with a
/// small deterministic jitter.
pub struct SimulatedTransport {
    handle: SimHandle,
    open: bool,
    last_grams: f64,
    tick: u32,
    jitter_g: f64,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::with_handle(SimHandle::default())
    }

    pub fn with_handle(handle: SimHandle) -> Self {
        Self {
            handle,
            open: false,
            last_grams: 0.0,
            tick: 0,
            jitter_g: 0.02,
        }
    }

    pub fn handle(&self) -> SimHandle {
        self.handle.clone()
    }

    fn next_line(&mut self) -> String {
        let g = self.handle.grams();
        let moving = (g - self.last_grams).abs() > 0.5;
        self.last_grams = g;
        self.tick = self.tick.wrapping_add(1);
        // Triangle wave in [-jitter, +jitter] over 8 ticks.
        let phase = f64::from(self.tick % 8) / 4.0 - 1.0;
        let noisy = g + self.jitter_g * (1.0 - 2.0 * phase.abs());
        let kg = noisy / 1000.0;
        let tag = if moving { "US" } else { "ST" };
        format!("{tag},GS,{kg:>+9.3}kg")
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimulatedTransport {
    fn describe(&self) -> String {
        "simulated scale".to_string()
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn open(&mut self) -> Result<(), BoxError> {
        self.open = true;
        Ok(())
    }

    fn read_frame(&mut self, _timeout: Duration) -> Result<Option<Frame>, BoxError> {
        if !self.open {
            return Err(Box::new(crate::error::HwError::Closed));
        }
        let line = self.next_line();
        tracing::trace!(%line, "simulated frame");
        Ok(Some(Frame::ascii(line.into_bytes())))
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_self_paced(&self) -> bool {
        false
    }
}
