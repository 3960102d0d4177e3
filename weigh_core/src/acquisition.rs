//! Background acquisition: one worker thread driving the link state machine
//! `Closed -> Opening -> Streaming -> (Error -> Opening)` until stopped.
//!
//! The worker owns the filter stack. It takes the transport lock only for the
//! bounded read and the state lock only to publish, so readers never wait on
//! I/O. Shutdown is cooperative: the stop flag is checked every iteration and
//! between backoff slices.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use weigh_traits::{Clock, Frame, Payload, Transport};

use crate::calibration::Calibration;
use crate::config::PipelineCfg;
use crate::decoder::FrameDecoder;
use crate::error::{Result, WeighError};
use crate::filter::FilterStack;
use crate::state::{DiagnosticLogEntry, LinkState, SharedState, Snapshot};
use crate::transport::{Backoff, IdleTracker, TransportManager};
use crate::util::period_us;

/// Samples averaged by `tare` and `calibrate_with_known`.
pub const CALIBRATION_SAMPLES: usize = 12;

/// Longest single sleep while backing off; bounds stop latency.
const BACKOFF_SLICE: Duration = Duration::from_millis(100);

pub type SharedClock = Arc<dyn Clock + Send + Sync>;

struct Shared<T: Transport> {
    link: TransportManager<T>,
    state: Arc<SharedState>,
    cfg: PipelineCfg,
    decoder: FrameDecoder,
    clock: SharedClock,
}

/// What one worker iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tick {
    Published,
    Rejected,
    Quiet,
    OpenFailed,
    Fault,
    Stopped,
}

pub(crate) struct Worker<T: Transport> {
    shared: Arc<Shared<T>>,
    stop: Arc<AtomicBool>,
    filter: FilterStack,
    backoff: Backoff,
    idle: IdleTracker,
    /// Loop pacing for links that return immediately.
    period: Option<Duration>,
}

impl<T: Transport> Worker<T> {
    fn new(shared: Arc<Shared<T>>, stop: Arc<AtomicBool>, rate_hz: u32) -> Self {
        let acq = &shared.cfg.acquisition;
        let period = (!shared.link.is_self_paced())
            .then(|| Duration::from_micros(period_us(rate_hz)));
        let quiet = acq.quiet_timeout.max(acq.read_timeout);
        Self {
            filter: FilterStack::new(&shared.cfg.filter),
            backoff: Backoff::new(acq.backoff_initial, acq.backoff_max),
            idle: IdleTracker::new(quiet),
            period,
            shared,
            stop,
        }
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn sleep_sliced(&self, total: Duration) {
        let mut left = total;
        while !left.is_zero() && !self.stopping() {
            let slice = left.min(BACKOFF_SLICE);
            self.shared.clock.sleep(slice);
            left = left.saturating_sub(slice);
        }
    }

    fn back_off(&mut self) {
        let d = self.backoff.next_delay();
        tracing::debug!(delay_ms = d.as_millis() as u64, "backing off");
        self.sleep_sliced(d);
    }

    pub(crate) fn step(&mut self) -> Tick {
        if self.stopping() {
            return Tick::Stopped;
        }
        let sh = &self.shared;

        if !sh.link.is_open() {
            sh.state.set_link_state(LinkState::Opening);
            if !sh.link.ensure_open() {
                sh.state.set_link_state(LinkState::Error);
                self.back_off();
                return Tick::OpenFailed;
            }
            self.backoff.reset();
            sh.state.set_link_state(LinkState::Streaming);
        }

        let tick = match sh.link.read_frame(sh.cfg.acquisition.read_timeout) {
            Ok(Some(frame)) if !is_blank(&frame) => {
                self.idle.on_data(sh.clock.now());
                self.handle_frame(&frame)
            }
            Ok(_) => {
                if let Some(quiet) = self.idle.on_quiet(sh.clock.now()) {
                    let secs = quiet.as_secs_f64();
                    tracing::warn!(quiet_s = secs, "no data from transport");
                    sh.state
                        .record_event(format!("No serial data for {secs:.1}s"));
                }
                Tick::Quiet
            }
            Err(e) => {
                tracing::warn!(error = %e, "transport fault, reconnecting");
                sh.state.set_link_state(LinkState::Error);
                self.back_off();
                return Tick::Fault;
            }
        };

        if let Some(p) = self.period {
            self.shared.clock.sleep(p);
        }
        tick
    }

    fn handle_frame(&mut self, frame: &Frame) -> Tick {
        let sh = &self.shared;
        let text = frame.text();
        let Some(sample) = sh.decoder.decode_frame(frame) else {
            tracing::debug!(frame = %text, "undecodable frame");
            sh.state.record(DiagnosticLogEntry::frame(text, None));
            return Tick::Rejected;
        };

        let cal = sh.state.calibration();
        let snapshot = self
            .filter
            .update(sample.raw_counts, &cal, sample.stability_hint);
        tracing::debug!(
            grams = snapshot.grams,
            stable = snapshot.stable,
            raw = snapshot.raw_counts,
            strategy = ?sample.strategy,
            "sample"
        );
        sh.state.publish(
            snapshot,
            DiagnosticLogEntry::frame(text, Some(&sample)),
            sh.clock.now(),
        );
        Tick::Published
    }

    fn run(mut self) {
        tracing::info!(link = %self.shared.link.describe(), "acquisition started");
        while self.step() != Tick::Stopped {}
        self.shared.link.close();
        self.shared.state.set_link_state(LinkState::Closed);
        tracing::info!("acquisition stopped");
    }
}

fn is_blank(frame: &Frame) -> bool {
    matches!(frame.payload, Payload::Ascii(_)) && frame.text().is_empty()
}

/// Handle to a running (or stopped) acquisition pipeline.
///
/// All methods take `&self`; share it behind an `Arc` to read from other
/// threads while the worker runs. Dropping the handle stops the worker.
pub struct Acquisition<T: Transport + Send + 'static> {
    shared: Arc<Shared<T>>,
    stop: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport + Send + 'static> Acquisition<T> {
    pub fn new(transport: T, cfg: PipelineCfg, calibration: Calibration, clock: SharedClock) -> Self {
        let state = Arc::new(SharedState::new(
            calibration,
            cfg.acquisition.log_capacity,
        ));
        let decoder = FrameDecoder::new(cfg.acquisition.native_counts_per_gram);
        Self {
            shared: Arc::new(Shared {
                link: TransportManager::new(transport, state.clone()),
                state,
                cfg,
                decoder,
                clock,
            }),
            stop: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker. A second call while running is a no-op.
    pub fn start(&self, rate_hz: u32) -> Result<()> {
        let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }
        if let Some(old) = slot.take() {
            let _ = old.join();
        }
        self.stop.store(false, Ordering::Relaxed);
        let worker = Worker::new(self.shared.clone(), self.stop.clone(), rate_hz);
        let handle = std::thread::Builder::new()
            .name("weigh-acquisition".into())
            .spawn(move || worker.run())
            .map_err(|e| WeighError::State(format!("spawn acquisition thread: {e}")))?;
        *slot = Some(handle);
        Ok(())
    }

    /// Signal the worker, wait for it, and close the link. Idempotent.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(h) = handle
            && h.join().is_err()
        {
            tracing::warn!("acquisition thread panicked");
        }
        self.shared.link.close();
        self.shared.state.set_link_state(LinkState::Closed);
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Latest snapshot; all zeros before the first sample.
    pub fn read_latest(&self) -> Snapshot {
        self.shared.state.latest()
    }

    /// Rounded mean of the last `n` raw counts, or `NotReady` when stale.
    pub fn read_raw_average(&self, n: usize) -> Result<i64> {
        self.shared.state.raw_average(
            n,
            self.shared.clock.now(),
            self.shared.cfg.acquisition.freshness,
        )
    }

    /// Poll until a fresh raw reading exists or `timeout` passes.
    pub fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        let clock = &self.shared.clock;
        let start = clock.now();
        loop {
            if self.read_raw_average(1).is_ok() {
                return Ok(());
            }
            if clock.since(start) >= timeout {
                return Err(WeighError::NotReady.into());
            }
            clock.sleep(Duration::from_millis(50));
        }
    }

    pub fn set_calibration(&self, zero_offset: i64, scale_factor: f64) -> Calibration {
        let cal = Calibration::new(zero_offset, scale_factor);
        tracing::info!(
            zero_offset = cal.zero_offset(),
            scale_factor = cal.scale_factor(),
            scale_sign = cal.scale_sign(),
            "calibration updated"
        );
        self.shared.state.set_calibration(cal);
        cal
    }

    pub fn get_calibration(&self) -> Calibration {
        self.shared.state.calibration()
    }

    /// Take the current raw average as the new zero, keeping the scale factor.
    pub fn tare(&self) -> Result<Calibration> {
        let raw = self.read_raw_average(CALIBRATION_SAMPLES)?;
        let cal = self.get_calibration().tared(raw);
        Ok(self.set_calibration(cal.zero_offset(), cal.signed_scale_factor()))
    }

    /// Derive the scale factor from `known_g` grams on the platform, keeping the zero.
    pub fn calibrate_with_known(&self, known_g: f64) -> Result<Calibration> {
        let raw = self.read_raw_average(CALIBRATION_SAMPLES)?;
        let cal = self.get_calibration().with_known_mass(raw, known_g)?;
        Ok(self.set_calibration(cal.zero_offset(), cal.signed_scale_factor()))
    }

    pub fn diagnostic_log(&self, limit: usize) -> Vec<DiagnosticLogEntry> {
        self.shared.state.diagnostic_log(limit)
    }

    pub fn link_state(&self) -> LinkState {
        self.shared.state.link_state()
    }

    pub fn describe(&self) -> String {
        self.shared.link.describe()
    }
}

impl<T: Transport + Send + 'static> Drop for Acquisition<T> {
    fn drop(&mut self) {
        self.stop();
    }
}
