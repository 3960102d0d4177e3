//! Runtime configuration for the acquisition pipeline.
//!
//! These are the validated, typed structs the core runs on. They are separate
//! from the TOML-deserialized config in `weigh_config`; see `conversions`.

use std::time::Duration;

/// Filtering stack tuning.
#[derive(Debug, Clone)]
pub struct FilterCfg {
    /// Median window size; forced odd at construction.
    pub window: usize,
    /// EMA smoothing factor in (0.0, 1.0].
    pub ema_alpha: f64,
    /// Population stdev (grams) under which a full-enough window is stable.
    pub stable_stdev_g: f64,
    /// Display granularity in grams; non-positive values fall back to 0.1.
    pub display_precision_g: f64,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            window: 11,
            ema_alpha: 0.2,
            stable_stdev_g: 0.05,
            display_precision_g: 0.1,
        }
    }
}

/// Zero-tracking drift compensator tuning.
#[derive(Debug, Clone)]
pub struct DriftCfg {
    pub median_n: usize,
    pub ema_alpha: f64,
    /// |y| must be below this for zero tracking to engage.
    pub zero_gate_g: f64,
    /// max - min over the recent window must be below this.
    pub zero_variance_g: f64,
    /// Offset step per engaged sample.
    pub zero_rate_g: f64,
    /// Sizes the recent window: max(10, sample_hz * 1.5).
    pub sample_hz: u32,
    /// When set, the compensator is an identity filter.
    pub bypass: bool,
}

impl Default for DriftCfg {
    fn default() -> Self {
        Self {
            median_n: 5,
            ema_alpha: 0.12,
            zero_gate_g: 3.0,
            zero_variance_g: 0.8,
            zero_rate_g: 0.05,
            sample_hz: 10,
            bypass: false,
        }
    }
}

/// Acquisition loop, transport supervision and cache tuning.
#[derive(Debug, Clone)]
pub struct AcquisitionCfg {
    /// Bridges ASCII grams into the raw-count vocabulary of bit-level ADCs.
    pub native_counts_per_gram: f64,
    /// Blocking read bound; the stop flag is revisited at least this often.
    pub read_timeout: Duration,
    /// Quiet period after which a single "no data" event is logged.
    pub quiet_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub log_capacity: usize,
    /// Raw reads older than this are "not ready".
    pub freshness: Duration,
}

impl Default for AcquisitionCfg {
    fn default() -> Self {
        Self {
            native_counts_per_gram: 1000.0,
            read_timeout: Duration::from_millis(500),
            quiet_timeout: Duration::from_millis(500),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(10),
            log_capacity: 2000,
            freshness: Duration::from_secs(1),
        }
    }
}

/// Everything the acquisition worker needs, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct PipelineCfg {
    pub acquisition: AcquisitionCfg,
    pub filter: FilterCfg,
}
