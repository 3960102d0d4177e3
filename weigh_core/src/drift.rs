//! Zero-tracking drift compensator for committed measurements.
//!
//! Consumers construct one explicitly and feed it already-filtered grams. While
//! the platform is near zero and quiet, a small offset walks the output toward
//! 0.0 to cancel slow thermal creep. A load outside the gate freezes the offset.

use std::collections::VecDeque;

use crate::config::DriftCfg;
use crate::filter::{Ema, MedianWindow, force_odd};

#[derive(Debug, Clone)]
struct Tracking {
    median: MedianWindow,
    ema: Ema,
    recent: VecDeque<f64>,
    recent_cap: usize,
    zero_gate_g: f64,
    zero_variance_g: f64,
    zero_rate_g: f64,
    offset: f64,
}

impl Tracking {
    fn update(&mut self, x: f64) -> f64 {
        let y = self.ema.update(self.median.push(x)) + self.offset;

        if self.recent.len() == self.recent_cap {
            self.recent.pop_front();
        }
        self.recent.push_back(y);
        if self.recent.len() < self.recent_cap {
            return y;
        }

        let (lo, hi) = self
            .recent
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let span = hi - lo;
        if y != 0.0 && y.abs() < self.zero_gate_g && span < self.zero_variance_g {
            // Clamped so the output never crosses zero.
            let step = -y.signum() * self.zero_rate_g.min(y.abs());
            self.offset += step;
            tracing::trace!(y, step, offset = self.offset, "zero tracking step");
            return y + step;
        }
        y
    }

    fn reset(&mut self) {
        self.median.clear();
        self.ema.reset();
        self.recent.clear();
        self.offset = 0.0;
    }
}

/// Median + EMA smoother with gated zero tracking, or an identity filter when
/// bypassed.
#[derive(Debug, Clone)]
pub struct DriftCompensator {
    // `None` is bypass, fixed at construction.
    tracking: Option<Tracking>,
}

impl DriftCompensator {
    pub fn new(cfg: &DriftCfg) -> Self {
        if cfg.bypass {
            tracing::info!("drift compensation bypassed");
            return Self::bypassed();
        }
        let recent_cap = 10.max((f64::from(cfg.sample_hz) * 1.5) as usize);
        Self {
            tracking: Some(Tracking {
                median: MedianWindow::new(force_odd(cfg.median_n)),
                ema: Ema::new(cfg.ema_alpha),
                recent: VecDeque::with_capacity(recent_cap),
                recent_cap,
                zero_gate_g: cfg.zero_gate_g,
                zero_variance_g: cfg.zero_variance_g,
                zero_rate_g: cfg.zero_rate_g.abs(),
                offset: 0.0,
            }),
        }
    }

    pub fn bypassed() -> Self {
        Self { tracking: None }
    }

    pub fn is_bypassed(&self) -> bool {
        self.tracking.is_none()
    }

    pub fn update(&mut self, grams: f64) -> f64 {
        match &mut self.tracking {
            Some(t) => t.update(grams),
            None => grams,
        }
    }

    /// Accumulated zero-tracking offset in grams.
    pub fn offset(&self) -> f64 {
        self.tracking.as_ref().map_or(0.0, |t| t.offset)
    }

    pub fn reset(&mut self) {
        if let Some(t) = &mut self.tracking {
            t.reset();
        }
    }
}
