//! Signed linear calibration between raw counts and grams.

use serde::Serialize;

use crate::error::{Result, WeighError};

/// Divisors below this magnitude are treated as a misconfiguration and replaced.
pub const MIN_SCALE_FACTOR: f64 = 1e-9;

/// `grams = scale_sign * (raw - zero_offset) / scale_factor`.
///
/// `scale_factor` is always positive; the wiring polarity lives in `scale_sign`
/// so a reversed load cell still reads positive grams.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Calibration {
    zero_offset: i64,
    scale_factor: f64,
    scale_sign: i8,
}

impl Calibration {
    /// Build from a signed counts-per-gram factor; near-zero or non-finite
    /// factors are clamped to 1.0 so conversion stays defined.
    pub fn new(zero_offset: i64, scale_factor: f64) -> Self {
        let scale_sign = if scale_factor >= 0.0 { 1 } else { -1 };
        let magnitude = scale_factor.abs();
        let scale_factor = if magnitude.is_finite() && magnitude > MIN_SCALE_FACTOR {
            magnitude
        } else {
            tracing::warn!(scale_factor, "degenerate scale factor clamped to 1.0");
            1.0
        };
        Self {
            zero_offset,
            scale_factor,
            scale_sign,
        }
    }

    pub fn zero_offset(&self) -> i64 {
        self.zero_offset
    }

    /// Counts per gram, always > 0.
    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn scale_sign(&self) -> i8 {
        self.scale_sign
    }

    /// Signed factor as it would be persisted.
    pub fn signed_scale_factor(&self) -> f64 {
        f64::from(self.scale_sign) * self.scale_factor
    }

    /// Counts above the tare. Widened so saturated readings cannot overflow.
    #[inline]
    fn counts_above_zero(&self, raw_counts: i64) -> i128 {
        i128::from(raw_counts) - i128::from(self.zero_offset)
    }

    #[inline]
    pub fn to_grams(&self, raw_counts: i64) -> f64 {
        f64::from(self.scale_sign) * self.counts_above_zero(raw_counts) as f64 / self.scale_factor
    }

    /// Same model with a new tare baseline.
    pub fn tared(&self, raw_at_zero: i64) -> Self {
        Self {
            zero_offset: raw_at_zero,
            ..*self
        }
    }

    /// Derive a new counts-per-gram factor from a known mass on the platform,
    /// keeping the current tare.
    pub fn with_known_mass(&self, raw_with_mass: i64, known_g: f64) -> Result<Self> {
        if !(known_g.is_finite() && known_g > 0.0) {
            return Err(WeighError::Calibration("known mass must be > 0 g".into()).into());
        }
        let counts = self.counts_above_zero(raw_with_mass);
        if counts == 0 {
            return Err(WeighError::Calibration(
                "place the known mass on the platform before calibrating".into(),
            )
            .into());
        }
        Ok(Self::new(self.zero_offset, counts as f64 / known_g))
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new(0, 1.0)
    }
}

impl From<weigh_config::PersistedCalibration> for Calibration {
    fn from(p: weigh_config::PersistedCalibration) -> Self {
        Self::new(p.zero_offset, p.scale_factor)
    }
}

impl From<Calibration> for weigh_config::PersistedCalibration {
    fn from(c: Calibration) -> Self {
        Self {
            zero_offset: c.zero_offset,
            scale_factor: c.signed_scale_factor(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sign_is_split_from_magnitude() {
        let c = Calibration::new(100, -250.0);
        assert_eq!(c.scale_sign(), -1);
        assert_eq!(c.scale_factor(), 250.0);
        assert_eq!(c.to_grams(100 - 2500), 10.0);
    }

    #[test]
    fn zero_factor_is_clamped() {
        let c = Calibration::new(0, 0.0);
        assert_eq!(c.scale_factor(), 1.0);
        assert_eq!(c.scale_sign(), 1);
        assert!(Calibration::new(0, 1e-12).to_grams(5).is_finite());
    }

    #[test]
    fn known_mass_derives_counts_per_gram() {
        let c = Calibration::new(1000, 1.0).with_known_mass(101_000, 100.0).unwrap();
        assert_eq!(c.zero_offset(), 1000);
        assert!((c.scale_factor() - 1000.0).abs() < 1e-12);
        assert!((c.to_grams(51_000) - 50.0).abs() < 1e-12);
    }

    #[test]
    fn known_mass_rejects_empty_platform() {
        let err = Calibration::new(1000, 1.0)
            .with_known_mass(1000, 100.0)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WeighError>(),
            Some(WeighError::Calibration(_))
        ));
    }

    #[test]
    fn extreme_counts_do_not_overflow() {
        let c = Calibration::new(250_000, 1000.0);
        let low = c.to_grams(i64::MIN);
        assert!(low.is_finite() && low < -9.0e15);
        let c = Calibration::new(-250_000, -1000.0);
        let high = c.to_grams(i64::MAX);
        assert!(high.is_finite() && high < -9.0e15);

        let c = Calibration::new(i64::MAX, 1.0)
            .with_known_mass(i64::MIN, 100.0)
            .unwrap();
        assert_eq!(c.scale_sign(), -1);
        assert!(c.scale_factor().is_finite());
    }

    proptest! {
        #[test]
        fn zero_offset_reads_zero_and_sign_follows_factor(
            zero in -8_000_000i64..8_000_000,
            factor in prop_oneof![-1.0e5f64..-1.0e-3, 1.0e-3f64..1.0e5],
        ) {
            let c = Calibration::new(zero, factor);
            prop_assert_eq!(c.to_grams(zero), 0.0);
            let step = factor.abs().ceil() as i64;
            let g = c.to_grams(zero + step * factor.signum() as i64);
            prop_assert!(g > 0.0);
            let g_raw_up = c.to_grams(zero + step);
            prop_assert_eq!(g_raw_up.signum(), factor.signum());
        }
    }
}
