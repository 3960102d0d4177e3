//! Environment overrides (`SCALE_*`, `DATA_PIN`, `CLOCK_PIN`, `DRIFT_FILTER_BYPASS`).
//!
//! Applied after the TOML file and before `Config::validate`. A variable that is
//! set but malformed is an error rather than silently ignored.
use crate::{Config, ParityCfg};

fn parse_bool(name: &str, v: &str) -> eyre::Result<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => eyre::bail!("{name}: expected a boolean, got {other:?}"),
    }
}

fn parse_num<T: std::str::FromStr>(name: &str, v: &str) -> eyre::Result<T> {
    v.trim()
        .parse::<T>()
        .map_err(|_| eyre::eyre!("{name}: invalid number {v:?}"))
}

fn parse_parity(v: &str) -> eyre::Result<ParityCfg> {
    match v.trim().to_ascii_lowercase().as_str() {
        "n" | "none" => Ok(ParityCfg::None),
        "e" | "even" => Ok(ParityCfg::Even),
        "o" | "odd" => Ok(ParityCfg::Odd),
        other => eyre::bail!("SCALE_PARITY: unsupported parity {other:?}"),
    }
}

fn parse_stop_bits(v: &str) -> eyre::Result<u8> {
    match v.trim() {
        "1" => Ok(1),
        "2" => Ok(2),
        other => eyre::bail!("SCALE_STOPBITS: expected 1 or 2, got {other:?}"),
    }
}

/// Decode backslash escapes: `\r \n \t \0 \\ \xHH`. Other characters pass through.
pub fn unescape(s: &str) -> eyre::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('r') => out.push(b'\r'),
            Some('n') => out.push(b'\n'),
            Some('t') => out.push(b'\t'),
            Some('0') => out.push(0),
            Some('\\') => out.push(b'\\'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                let b = u8::from_str_radix(&hex, 16)
                    .map_err(|_| eyre::eyre!("invalid \\x escape in {s:?}"))?;
                out.push(b);
            }
            Some(other) => eyre::bail!("unsupported escape \\{other} in {s:?}"),
            None => eyre::bail!("dangling backslash in {s:?}"),
        }
    }
    Ok(out)
}

impl Config {
    /// Apply overrides read through `lookup` (injectable for tests).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> eyre::Result<()> {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SCALE_PORT") {
            self.serial.port = v.trim().to_string();
        }
        if let Some(v) = get("SCALE_BAUD") {
            self.serial.baud = parse_num("SCALE_BAUD", &v)?;
        }
        if let Some(v) = get("SCALE_TIMEOUT") {
            let secs: f64 = parse_num("SCALE_TIMEOUT", &v)?;
            if !(secs.is_finite() && secs > 0.0) {
                eyre::bail!("SCALE_TIMEOUT must be a positive number of seconds");
            }
            self.serial.read_timeout_ms = (secs * 1000.0).round() as u64;
        }
        if let Some(v) = get("SCALE_NATIVE_COUNTS_PER_GRAM") {
            self.acquisition.native_counts_per_gram =
                parse_num("SCALE_NATIVE_COUNTS_PER_GRAM", &v)?;
        }
        if let Some(v) = get("SCALE_BYTESIZE") {
            self.serial.data_bits = parse_num("SCALE_BYTESIZE", &v)?;
        }
        if let Some(v) = get("SCALE_PARITY") {
            self.serial.parity = parse_parity(&v)?;
        }
        if let Some(v) = get("SCALE_STOPBITS") {
            self.serial.stop_bits = parse_stop_bits(&v)?;
        }
        if let Some(v) = get("SCALE_XONXOFF") {
            self.serial.xonxoff = parse_bool("SCALE_XONXOFF", &v)?;
        }
        if let Some(v) = get("SCALE_RTSCTS") {
            self.serial.rtscts = parse_bool("SCALE_RTSCTS", &v)?;
        }
        if let Some(v) = get("SCALE_DSRDTR") {
            self.serial.dsrdtr = parse_bool("SCALE_DSRDTR", &v)?;
        }
        if let Some(v) = get("SCALE_FORCE_DTR") {
            self.serial.force_dtr = parse_bool("SCALE_FORCE_DTR", &v)?;
        }
        if let Some(v) = get("SCALE_FORCE_RTS") {
            self.serial.force_rts = parse_bool("SCALE_FORCE_RTS", &v)?;
        }
        if let Some(v) = get("SCALE_FRAME_TERMINATOR") {
            self.serial.frame_terminator = v;
        }
        if let Some(v) = get("SCALE_FRAME_MAX_BYTES") {
            self.serial.frame_max_bytes = parse_num("SCALE_FRAME_MAX_BYTES", &v)?;
        }
        if let Some(v) = get("DATA_PIN") {
            self.hx711.dt_pin = parse_num("DATA_PIN", &v)?;
        }
        if let Some(v) = get("CLOCK_PIN") {
            self.hx711.sck_pin = parse_num("CLOCK_PIN", &v)?;
        }
        if let Some(v) = get("DRIFT_FILTER_BYPASS") {
            self.drift.bypass = v.trim() == "1";
        }
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_process_env(&mut self) -> eyre::Result<()> {
        self.apply_env(|k| std::env::var(k).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[
            ("SCALE_PORT", "/dev/ttyAMA0"),
            ("SCALE_BAUD", "19200"),
            ("SCALE_TIMEOUT", "0.25"),
            ("SCALE_PARITY", "E"),
            ("SCALE_STOPBITS", "2"),
            ("SCALE_FORCE_RTS", "off"),
            ("SCALE_FRAME_TERMINATOR", "\\r\\n"),
            ("DRIFT_FILTER_BYPASS", "1"),
        ]))
        .unwrap();
        assert_eq!(cfg.serial.port, "/dev/ttyAMA0");
        assert_eq!(cfg.serial.baud, 19200);
        assert_eq!(cfg.serial.read_timeout_ms, 250);
        assert_eq!(cfg.serial.parity, ParityCfg::Even);
        assert_eq!(cfg.serial.stop_bits, 2);
        assert!(!cfg.serial.force_rts);
        assert_eq!(cfg.serial.terminator_bytes().unwrap(), b"\r\n");
        assert!(cfg.drift.bypass);
        cfg.validate().unwrap();
    }

    #[test]
    fn malformed_values_are_errors() {
        let mut cfg = Config::default();
        let err = cfg.apply_env(env(&[("SCALE_BAUD", "fast")])).unwrap_err();
        assert!(err.to_string().contains("SCALE_BAUD"));
        let err = cfg.apply_env(env(&[("SCALE_XONXOFF", "maybe")])).unwrap_err();
        assert!(err.to_string().contains("SCALE_XONXOFF"));
    }

    #[test]
    fn blank_values_are_ignored() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[("SCALE_PORT", "  ")])).unwrap();
        assert_eq!(cfg.serial.port, "/dev/ttyUSB0");
    }

    #[test]
    fn unescape_handles_hex_and_rejects_garbage() {
        assert_eq!(unescape("\\x03").unwrap(), vec![3]);
        assert_eq!(unescape("ETX").unwrap(), b"ETX");
        assert!(unescape("\\q").is_err());
        assert!(unescape("\\").is_err());
    }
}
