#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the weigh station.
//!
//! - `Config` and its sections are deserialized from TOML; every key has a default
//!   so an empty file is a valid (serial, `/dev/ttyUSB0`) configuration.
//! - `env` layers the `SCALE_*` environment variables on top of the file.
//! - `Config::validate` rejects out-of-range values before anything is built.
//! - `calibration` loads multi-point calibration CSVs.
use serde::{Deserialize, Serialize};

pub mod calibration;
pub mod env;

pub use calibration::{CalibrationRow, load_calibration_csv};

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Serial,
    Hx711,
    Simulated,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct TransportCfg {
    pub kind: TransportKind,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParityCfg {
    #[default]
    #[serde(alias = "n")]
    None,
    #[serde(alias = "e")]
    Even,
    #[serde(alias = "o")]
    Odd,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SerialCfg {
    pub port: String,
    pub baud: u32,
    pub read_timeout_ms: u64,
    pub data_bits: u8,
    pub parity: ParityCfg,
    pub stop_bits: u8,
    pub xonxoff: bool,
    pub rtscts: bool,
    pub dsrdtr: bool,
    pub force_dtr: bool,
    pub force_rts: bool,
    /// Escaped terminator text, e.g. `"\\r"` or `"\\r\\n"`.
    pub frame_terminator: String,
    pub frame_max_bytes: usize,
}

impl Default for SerialCfg {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 9600,
            read_timeout_ms: 500,
            data_bits: 8,
            parity: ParityCfg::None,
            stop_bits: 1,
            xonxoff: false,
            rtscts: false,
            dsrdtr: false,
            force_dtr: true,
            force_rts: true,
            frame_terminator: "\\r".to_string(),
            frame_max_bytes: 64,
        }
    }
}

impl SerialCfg {
    /// Terminator as bytes; an escape string that decodes to nothing means `\r`.
    pub fn terminator_bytes(&self) -> eyre::Result<Vec<u8>> {
        let bytes = env::unescape(&self.frame_terminator)?;
        if bytes.is_empty() {
            return Ok(b"\r".to_vec());
        }
        Ok(bytes)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Hx711Cfg {
    pub dt_pin: u8,
    pub sck_pin: u8,
    pub gain_pulses: u8,
    pub ready_timeout_ms: u64,
}

impl Default for Hx711Cfg {
    fn default() -> Self {
        Self {
            dt_pin: 5,
            sck_pin: 6,
            gain_pulses: 1,
            ready_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AcquisitionCfg {
    /// Counts per gram used to express ASCII readings in raw-count units.
    pub native_counts_per_gram: f64,
    pub sample_rate_hz: u32,
    pub quiet_timeout_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub log_capacity: usize,
    /// Raw reads older than this are "not ready".
    pub freshness_ms: u64,
}

impl Default for AcquisitionCfg {
    fn default() -> Self {
        Self {
            native_counts_per_gram: 1000.0,
            sample_rate_hz: 10,
            quiet_timeout_ms: 500,
            backoff_initial_ms: 1000,
            backoff_max_ms: 10_000,
            log_capacity: 2000,
            freshness_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FilterCfg {
    /// Median window; even values are bumped to the next odd size.
    pub window: usize,
    pub ema_alpha: f64,
    pub stable_stdev_g: f64,
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DriftCfg {
    pub median_n: usize,
    pub ema_alpha: f64,
    pub zero_gate_g: f64,
    pub zero_variance_g: f64,
    pub zero_rate_g: f64,
    pub sample_hz: u32,
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

/// Calibration as persisted by the storage layer: counts per gram plus tare.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct PersistedCalibration {
    pub zero_offset: i64,
    pub scale_factor: f64,
}

impl Default for PersistedCalibration {
    fn default() -> Self {
        Self {
            zero_offset: 0,
            scale_factor: 1.0,
        }
    }
}

impl PersistedCalibration {
    /// Serialize as a standalone `[calibration]` TOML document.
    pub fn to_toml(&self) -> eyre::Result<String> {
        #[derive(Serialize)]
        struct Doc<'a> {
            calibration: &'a PersistedCalibration,
        }
        toml::to_string(&Doc { calibration: self })
            .map_err(|e| eyre::eyre!("serialize calibration: {e}"))
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub transport: TransportCfg,
    pub serial: SerialCfg,
    pub hx711: Hx711Cfg,
    pub acquisition: AcquisitionCfg,
    pub filter: FilterCfg,
    pub drift: DriftCfg,
    /// Persisted calibration; `{0, 1.0}` when absent.
    pub calibration: Option<PersistedCalibration>,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn finite_positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn finite_non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

impl Config {
    pub fn calibration_or_default(&self) -> PersistedCalibration {
        self.calibration.unwrap_or_default()
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Serial
        let s = &self.serial;
        if s.port.trim().is_empty() {
            eyre::bail!("serial.port must not be empty");
        }
        if s.baud == 0 {
            eyre::bail!("serial.baud must be > 0");
        }
        if s.read_timeout_ms == 0 {
            eyre::bail!("serial.read_timeout_ms must be >= 1");
        }
        if !(5..=8).contains(&s.data_bits) {
            eyre::bail!("serial.data_bits must be in 5..=8");
        }
        if !matches!(s.stop_bits, 1 | 2) {
            eyre::bail!("serial.stop_bits must be 1 or 2");
        }
        if s.frame_max_bytes == 0 || s.frame_max_bytes > 4096 {
            eyre::bail!("serial.frame_max_bytes must be in 1..=4096");
        }
        s.terminator_bytes()?;

        // HX711
        if !(1..=3).contains(&self.hx711.gain_pulses) {
            eyre::bail!("hx711.gain_pulses must be in 1..=3");
        }
        if self.hx711.ready_timeout_ms == 0 {
            eyre::bail!("hx711.ready_timeout_ms must be >= 1");
        }

        // Acquisition
        let a = &self.acquisition;
        if !finite_positive(a.native_counts_per_gram) {
            eyre::bail!("acquisition.native_counts_per_gram must be finite and > 0");
        }
        if a.sample_rate_hz == 0 {
            eyre::bail!("acquisition.sample_rate_hz must be > 0");
        }
        if a.quiet_timeout_ms == 0 {
            eyre::bail!("acquisition.quiet_timeout_ms must be >= 1");
        }
        if a.backoff_initial_ms == 0 {
            eyre::bail!("acquisition.backoff_initial_ms must be >= 1");
        }
        if a.backoff_initial_ms > a.backoff_max_ms {
            eyre::bail!("acquisition.backoff_initial_ms must not exceed backoff_max_ms");
        }
        if a.log_capacity == 0 {
            eyre::bail!("acquisition.log_capacity must be >= 1");
        }
        if a.freshness_ms == 0 {
            eyre::bail!("acquisition.freshness_ms must be >= 1");
        }

        // Filter
        let f = &self.filter;
        if f.window == 0 {
            eyre::bail!("filter.window must be >= 1");
        }
        if !(f.ema_alpha > 0.0 && f.ema_alpha <= 1.0) {
            eyre::bail!("filter.ema_alpha must be in (0.0, 1.0]");
        }
        if !finite_non_negative(f.stable_stdev_g) {
            eyre::bail!("filter.stable_stdev_g must be >= 0.0");
        }
        if !f.display_precision_g.is_finite() {
            eyre::bail!("filter.display_precision_g must be finite");
        }

        // Drift
        let d = &self.drift;
        if d.median_n == 0 {
            eyre::bail!("drift.median_n must be >= 1");
        }
        if !(d.ema_alpha > 0.0 && d.ema_alpha <= 1.0) {
            eyre::bail!("drift.ema_alpha must be in (0.0, 1.0]");
        }
        if !finite_non_negative(d.zero_gate_g)
            || !finite_non_negative(d.zero_variance_g)
            || !finite_non_negative(d.zero_rate_g)
        {
            eyre::bail!("drift thresholds (zero_gate_g, zero_variance_g, zero_rate_g) must be >= 0.0");
        }
        if d.sample_hz == 0 {
            eyre::bail!("drift.sample_hz must be > 0");
        }

        // Calibration
        if let Some(c) = self.calibration
            && !c.scale_factor.is_finite()
        {
            eyre::bail!("calibration.scale_factor must be finite");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_a_valid_default_config() {
        let cfg = load_toml("").unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.transport.kind, TransportKind::Serial);
        assert_eq!(cfg.serial.baud, 9600);
        assert_eq!(cfg.filter.window, 11);
        assert_eq!(cfg.calibration_or_default(), PersistedCalibration::default());
    }

    #[test]
    fn terminator_escapes_decode() {
        let cfg = SerialCfg {
            frame_terminator: "\\r\\n".into(),
            ..SerialCfg::default()
        };
        assert_eq!(cfg.terminator_bytes().unwrap(), b"\r\n");
    }

    #[test]
    fn persisted_calibration_round_trips_through_toml() {
        let c = PersistedCalibration {
            zero_offset: -120,
            scale_factor: 1000.5,
        };
        let text = c.to_toml().unwrap();
        let cfg = load_toml(&text).unwrap();
        assert_eq!(cfg.calibration, Some(c));
    }
}
