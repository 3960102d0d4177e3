//! Median prefilter, EMA smoothing and a population-stdev stability test.

use std::collections::VecDeque;

use crate::calibration::Calibration;
use crate::config::FilterCfg;
use crate::decoder::StabilityHint;
use crate::state::Snapshot;

const FALLBACK_PRECISION_G: f64 = 0.1;

/// Round a size up to the next odd number (minimum 1).
#[inline]
pub fn force_odd(n: usize) -> usize {
    let n = n.max(1);
    if n.is_multiple_of(2) { n + 1 } else { n }
}

/// Fixed-capacity window over the most recent values with a running median.
#[derive(Debug, Clone)]
pub struct MedianWindow {
    buf: VecDeque<f64>,
    cap: usize,
    // Reused for sorting so `push` does not allocate per sample.
    scratch: Vec<f64>,
}

impl MedianWindow {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            buf: VecDeque::with_capacity(cap),
            cap,
            scratch: Vec::with_capacity(cap),
        }
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() == self.cap
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + Clone + '_ {
        self.buf.iter().copied()
    }

    /// Push `x`, evicting the oldest value when full, and return the median.
    pub fn push(&mut self, x: f64) -> f64 {
        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(x);
        self.median()
    }

    /// Median of the current contents; mean of the middle pair for even counts.
    /// 0.0 when empty.
    pub fn median(&mut self) -> f64 {
        self.scratch.clear();
        self.scratch.extend(self.buf.iter().copied());
        self.scratch.sort_unstable_by(f64::total_cmp);
        let n = self.scratch.len();
        if n == 0 {
            return 0.0;
        }
        let mid = n / 2;
        if n.is_multiple_of(2) {
            (self.scratch[mid - 1] + self.scratch[mid]) / 2.0
        } else {
            self.scratch[mid]
        }
    }
}

/// Exponential moving average seeded by its first input.
#[derive(Debug, Clone, Copy)]
pub struct Ema {
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha.is_finite() {
            alpha.clamp(f64::MIN_POSITIVE, 1.0)
        } else {
            1.0
        };
        Self { alpha, value: None }
    }

    pub fn update(&mut self, x: f64) -> f64 {
        let y = match self.value {
            None => x,
            Some(prev) => self.alpha * x + (1.0 - self.alpha) * prev,
        };
        self.value = Some(y);
        y
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

/// Population standard deviation; 0.0 for an empty input.
pub fn pstdev(values: impl IntoIterator<Item = f64> + Clone) -> f64 {
    let (n, sum) = values
        .clone()
        .into_iter()
        .fold((0usize, 0.0f64), |(n, s), v| (n + 1, s + v));
    if n == 0 {
        return 0.0;
    }
    let mean = sum / n as f64;
    let var = values
        .into_iter()
        .map(|v| (v - mean) * (v - mean))
        .sum::<f64>()
        / n as f64;
    var.sqrt()
}

/// `round3(round(x / precision) * precision)`, never returning -0.0.
pub fn quantize_display(x: f64, precision_g: f64) -> f64 {
    let p = if precision_g.is_finite() && precision_g > 0.0 {
        precision_g
    } else {
        FALLBACK_PRECISION_G
    };
    let q = ((x / p).round() * p * 1000.0).round() / 1000.0;
    if q == 0.0 { 0.0 } else { q }
}

/// Per-sample pipeline from raw counts to a published snapshot.
#[derive(Debug, Clone)]
pub struct FilterStack {
    window: MedianWindow,
    ema: Ema,
    stable_stdev_g: f64,
    precision_g: f64,
    min_stable_len: usize,
}

impl FilterStack {
    pub fn new(cfg: &FilterCfg) -> Self {
        let n = force_odd(cfg.window);
        Self {
            window: MedianWindow::new(n),
            ema: Ema::new(cfg.ema_alpha),
            stable_stdev_g: cfg.stable_stdev_g,
            precision_g: cfg.display_precision_g,
            min_stable_len: 5.max(n / 2),
        }
    }

    pub fn window_len(&self) -> usize {
        self.window.capacity()
    }

    /// Current EMA, or `None` before the first sample.
    pub fn ema(&self) -> Option<f64> {
        self.ema.value()
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.ema.reset();
    }

    fn window_is_stable(&self) -> bool {
        self.window.len() >= self.min_stable_len && pstdev(self.window.values()) < self.stable_stdev_g
    }

    pub fn update(&mut self, raw_counts: i64, cal: &Calibration, hint: StabilityHint) -> Snapshot {
        let grams = cal.to_grams(raw_counts);
        let med = self.window.push(grams);
        let ema = self.ema.update(med);
        let stable = hint.as_flag().unwrap_or_else(|| self.window_is_stable());
        Snapshot {
            grams: quantize_display(ema, self.precision_g),
            stable,
            raw_counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn unit_cal() -> Calibration {
        Calibration::new(0, 1.0)
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 1)]
    #[case(4, 5)]
    #[case(11, 11)]
    fn window_is_forced_odd(#[case] asked: usize, #[case] got: usize) {
        assert_eq!(force_odd(asked), got);
    }

    #[test]
    fn even_partial_window_uses_middle_pair() {
        let mut w = MedianWindow::new(5);
        assert_eq!(w.push(1.0), 1.0);
        assert_eq!(w.push(3.0), 2.0);
        assert_eq!(w.push(2.0), 2.0);
        assert_eq!(w.push(10.0), 2.5);
    }

    #[test]
    fn window_evicts_oldest() {
        let mut w = MedianWindow::new(3);
        for x in [100.0, 1.0, 2.0, 3.0] {
            w.push(x);
        }
        assert_eq!(w.values().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn ema_is_none_until_first_sample() {
        let mut f = FilterStack::new(&FilterCfg::default());
        assert_eq!(f.ema(), None);
        f.update(10, &unit_cal(), StabilityHint::Unknown);
        assert_eq!(f.ema(), Some(10.0));
    }

    #[test]
    fn single_outlier_is_suppressed_by_median() {
        let cfg = FilterCfg {
            window: 5,
            ..FilterCfg::default()
        };
        let mut f = FilterStack::new(&cfg);
        let mut before = 0.0;
        for (i, raw) in [0, 0, 0, 100, 0, 0, 0].into_iter().enumerate() {
            f.update(raw, &unit_cal(), StabilityHint::Unknown);
            let ema = f.ema().unwrap();
            if i == 3 {
                assert!((ema - before).abs() < cfg.ema_alpha * 100.0);
            }
            before = ema;
        }
        assert_eq!(f.ema(), Some(0.0));
    }

    #[test]
    fn device_hint_overrides_window() {
        let mut f = FilterStack::new(&FilterCfg::default());
        for _ in 0..20 {
            let s = f.update(0, &unit_cal(), StabilityHint::Unstable);
            assert!(!s.stable);
        }
        let s = FilterStack::new(&FilterCfg::default()).update(0, &unit_cal(), StabilityHint::Stable);
        assert!(s.stable);
    }

    #[test]
    fn quiet_window_becomes_stable_once_long_enough() {
        let mut f = FilterStack::new(&FilterCfg::default());
        let states: Vec<bool> = (0..6)
            .map(|_| f.update(250, &unit_cal(), StabilityHint::Unknown).stable)
            .collect();
        assert_eq!(states, vec![false, false, false, false, true, true]);
    }

    #[test]
    fn noisy_window_is_unstable() {
        let mut f = FilterStack::new(&FilterCfg::default());
        let mut last = None;
        for i in 0..11 {
            last = Some(f.update(if i % 2 == 0 { 0 } else { 1 }, &unit_cal(), StabilityHint::Unknown));
        }
        assert!(!last.unwrap().stable);
    }

    #[test]
    fn calibration_is_applied_before_filtering() {
        let cal = Calibration::new(1000, 1000.0);
        let s = FilterStack::new(&FilterCfg::default()).update(13_340, &cal, StabilityHint::Unknown);
        assert_eq!(s.grams, 12.3);
        assert_eq!(s.raw_counts, 13_340);
    }

    #[rstest]
    #[case(12.3456, 0.1, 12.3)]
    #[case(12.36, 0.1, 12.4)]
    #[case(-0.04, 0.1, 0.0)]
    #[case(7.26, 0.5, 7.5)]
    #[case(7.26, 0.0, 7.3)]
    #[case(7.26, -1.0, 7.3)]
    fn display_is_quantized(#[case] x: f64, #[case] p: f64, #[case] want: f64) {
        let got = quantize_display(x, p);
        assert_eq!(got, want);
        assert!(got.is_sign_positive() || got != 0.0);
    }

    #[test]
    fn pstdev_matches_population_formula() {
        assert_eq!(pstdev([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.0);
        assert_eq!(pstdev(std::iter::empty::<f64>()), 0.0);
    }

    proptest! {
        #[test]
        fn display_stays_within_half_a_step(x in -1.0e5f64..1.0e5, p in 0.001f64..10.0) {
            let d = quantize_display(x, p);
            prop_assert!((d - x).abs() <= p / 2.0 + 1e-3);
        }

        #[test]
        fn median_lies_within_window_bounds(xs in proptest::collection::vec(-1.0e6f64..1.0e6, 1..40)) {
            let mut w = MedianWindow::new(7);
            for x in &xs {
                let m = w.push(*x);
                let lo = w.values().fold(f64::INFINITY, f64::min);
                let hi = w.values().fold(f64::NEG_INFINITY, f64::max);
                prop_assert!(m >= lo && m <= hi);
            }
        }
    }
}
