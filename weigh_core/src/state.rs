//! Shared state cache: latest snapshot, calibration, raw history, link state
//! and the bounded diagnostic log, all behind one lock.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::calibration::Calibration;
use crate::decoder::{DecodedSample, StabilityHint};
use crate::error::{Result, WeighError};

/// Raw counts kept for `raw_average`.
pub const RAW_HISTORY: usize = 64;

/// Latest published reading. Replaced whole, never partially.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Snapshot {
    pub grams: f64,
    pub stable: bool,
    pub raw_counts: i64,
}

/// Acquisition link state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    #[default]
    Closed,
    Opening,
    Streaming,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticLogEntry {
    pub timestamp: DateTime<Utc>,
    pub raw_text: String,
    pub parsed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grams: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_counts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability_hint: Option<StabilityHint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl DiagnosticLogEntry {
    /// A received frame and, when it decoded, what it decoded to.
    pub fn frame(raw_text: impl Into<String>, sample: Option<&DecodedSample>) -> Self {
        Self {
            timestamp: Utc::now(),
            raw_text: raw_text.into(),
            parsed: sample.is_some(),
            grams: sample.map(|s| s.grams),
            raw_counts: sample.map(|s| s.raw_counts),
            stability_hint: sample.map(|s| s.stability_hint),
            event: None,
        }
    }

    /// A link lifecycle or fault event.
    pub fn event(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            raw_text: String::new(),
            parsed: false,
            grams: None,
            raw_counts: None,
            stability_hint: None,
            event: Some(message.into()),
        }
    }
}

/// Fixed-capacity ring; the oldest entries drop silently.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    entries: VecDeque<DiagnosticLogEntry>,
    capacity: usize,
}

impl DiagnosticLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, entry: DiagnosticLogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// The most recent `limit` entries, oldest first. `limit` is clamped to
    /// `1..=capacity`.
    pub fn tail(&self, limit: usize) -> Vec<DiagnosticLogEntry> {
        let limit = limit.clamp(1, self.capacity);
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }
}

#[derive(Debug)]
struct Inner {
    snapshot: Snapshot,
    calibration: Calibration,
    raw_history: VecDeque<i64>,
    last_update: Option<Instant>,
    log: DiagnosticLog,
    link: LinkState,
}

/// Everything collaborators read while the worker runs.
#[derive(Debug)]
pub struct SharedState {
    inner: Mutex<Inner>,
}

impl SharedState {
    pub fn new(calibration: Calibration, log_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                snapshot: Snapshot::default(),
                calibration,
                raw_history: VecDeque::with_capacity(RAW_HISTORY),
                last_update: None,
                log: DiagnosticLog::new(log_capacity),
                link: LinkState::Closed,
            }),
        }
    }

    // A panic while holding the lock leaves plain data behind; keep serving it.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Publish a filtered reading and its log entry in one critical section.
    pub fn publish(&self, snapshot: Snapshot, entry: DiagnosticLogEntry, at: Instant) {
        let mut g = self.lock();
        g.snapshot = snapshot;
        if g.raw_history.len() == RAW_HISTORY {
            g.raw_history.pop_front();
        }
        g.raw_history.push_back(snapshot.raw_counts);
        g.last_update = Some(at);
        g.log.push(entry);
    }

    pub fn record(&self, entry: DiagnosticLogEntry) {
        self.lock().log.push(entry);
    }

    pub fn record_event(&self, message: impl Into<String>) {
        self.record(DiagnosticLogEntry::event(message));
    }

    pub fn latest(&self) -> Snapshot {
        self.lock().snapshot
    }

    pub fn calibration(&self) -> Calibration {
        self.lock().calibration
    }

    pub fn set_calibration(&self, calibration: Calibration) {
        self.lock().calibration = calibration;
    }

    pub fn link_state(&self) -> LinkState {
        self.lock().link
    }

    pub fn set_link_state(&self, link: LinkState) {
        let mut g = self.lock();
        if g.link != link {
            tracing::debug!(from = ?g.link, to = ?link, "link state");
            g.link = link;
        }
    }

    /// Rounded mean of the last `n` raw counts (`n` clamped to the retained
    /// history). `NotReady` when nothing landed within `freshness` of `now`.
    pub fn raw_average(&self, n: usize, now: Instant, freshness: Duration) -> Result<i64> {
        let g = self.lock();
        let fresh = g
            .last_update
            .is_some_and(|t| now.saturating_duration_since(t) <= freshness);
        if !fresh || g.raw_history.is_empty() {
            return Err(WeighError::NotReady.into());
        }
        let n = n.clamp(1, g.raw_history.len());
        let sum: i128 = g.raw_history.iter().rev().take(n).map(|&v| i128::from(v)).sum();
        let n = n as i128;
        let q = if sum >= 0 {
            (sum + n / 2) / n
        } else {
            (sum - n / 2) / n
        };
        Ok(q as i64)
    }

    pub fn diagnostic_log(&self, limit: usize) -> Vec<DiagnosticLogEntry> {
        self.lock().log.tail(limit)
    }

    pub fn log_capacity(&self) -> usize {
        self.lock().log.capacity()
    }
}
