//! Conversions from the TOML schema (`weigh_config`) to runtime structs.

use std::time::Duration;

use weigh_config as cfg;

use crate::config::{AcquisitionCfg, DriftCfg, FilterCfg, PipelineCfg};

impl From<&cfg::FilterCfg> for FilterCfg {
    fn from(f: &cfg::FilterCfg) -> Self {
        Self {
            window: f.window,
            ema_alpha: f.ema_alpha,
            stable_stdev_g: f.stable_stdev_g,
            display_precision_g: f.display_precision_g,
        }
    }
}

impl From<&cfg::DriftCfg> for DriftCfg {
    fn from(d: &cfg::DriftCfg) -> Self {
        Self {
            median_n: d.median_n,
            ema_alpha: d.ema_alpha,
            zero_gate_g: d.zero_gate_g,
            zero_variance_g: d.zero_variance_g,
            zero_rate_g: d.zero_rate_g,
            sample_hz: d.sample_hz,
            bypass: d.bypass,
        }
    }
}

impl From<&cfg::Config> for AcquisitionCfg {
    fn from(c: &cfg::Config) -> Self {
        let a = &c.acquisition;
        // The read bound follows the link: HX711 waits for data-ready, serial for bytes.
        let read_timeout_ms = match c.transport.kind {
            cfg::TransportKind::Hx711 => c.hx711.ready_timeout_ms,
            cfg::TransportKind::Serial | cfg::TransportKind::Simulated => c.serial.read_timeout_ms,
        };
        Self {
            native_counts_per_gram: a.native_counts_per_gram,
            read_timeout: Duration::from_millis(read_timeout_ms),
            quiet_timeout: Duration::from_millis(a.quiet_timeout_ms),
            backoff_initial: Duration::from_millis(a.backoff_initial_ms),
            backoff_max: Duration::from_millis(a.backoff_max_ms),
            log_capacity: a.log_capacity,
            freshness: Duration::from_millis(a.freshness_ms),
        }
    }
}

impl From<&cfg::Config> for PipelineCfg {
    fn from(c: &cfg::Config) -> Self {
        Self {
            acquisition: AcquisitionCfg::from(c),
            filter: FilterCfg::from(&c.filter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hx711_uses_ready_timeout_for_reads() {
        let mut c = cfg::Config::default();
        c.transport.kind = cfg::TransportKind::Hx711;
        c.hx711.ready_timeout_ms = 750;
        let p = PipelineCfg::from(&c);
        assert_eq!(p.acquisition.read_timeout, Duration::from_millis(750));
        assert_eq!(p.filter.window, 11);
    }

    #[test]
    fn serial_defaults_carry_over() {
        let p = PipelineCfg::from(&cfg::Config::default());
        assert_eq!(p.acquisition.read_timeout, Duration::from_millis(500));
        assert_eq!(p.acquisition.backoff_max, Duration::from_secs(10));
        assert_eq!(p.acquisition.log_capacity, 2000);
        let d = DriftCfg::from(&cfg::DriftCfg::default());
        assert_eq!(d.median_n, 5);
        assert!(!d.bypass);
    }
}
