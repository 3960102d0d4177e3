//! Human-readable error descriptions, exit codes and structured JSON errors.

use weigh_core::WeighError;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(we) = err.downcast_ref::<WeighError>() {
        return match we {
            WeighError::NotReady => {
                "What happened: The scale did not provide fresh data.\nLikely causes: Cable unplugged, wrong port, or the scale is not streaming.\nHow to fix: Check the connection and transport settings, then run `weigh self-check`.".to_string()
            }
            WeighError::Timeout => {
                "What happened: Scale read timed out.\nLikely causes: Wrong baud rate, no power, or read timeout too low.\nHow to fix: Verify the serial line settings and consider increasing serial.read_timeout_ms.".to_string()
            }
            WeighError::Transport(msg) => format!(
                "What happened: Transport failure ({msg}).\nLikely causes: Port missing or busy, insufficient permissions, or the device was unplugged.\nHow to fix: Check serial.port (or SCALE_PORT), make sure no other program holds it, and that the user may access it."
            ),
            WeighError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML or an environment override.\nHow to fix: Edit the config file or unset the override, then rerun."
            ),
            WeighError::Calibration(msg) => format!(
                "What happened: Calibration failed ({msg}).\nLikely causes: No load on the platform, or the tare was taken with the mass already on.\nHow to fix: Tare with an empty platform, place the reference mass, then calibrate again."
            ),
            WeighError::State(msg) => format!(
                "What happened: {msg}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("permission denied") {
        return "What happened: Access to the device was denied.\nLikely causes: The user is not in the dialout (serial) or gpio group.\nHow to fix: Add the user to the right group or run with sufficient permissions.".to_string();
    }

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'raw,grams'.".to_string();
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable reason name used in JSON errors.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<WeighError>() {
        Some(WeighError::NotReady) => "NotReady",
        Some(WeighError::Timeout) => "Timeout",
        Some(WeighError::Transport(_)) => "Transport",
        Some(WeighError::Config(_)) => "Config",
        Some(WeighError::Calibration(_)) => "Calibration",
        Some(WeighError::State(_)) => "State",
        None => "Error",
    }
}

/// Stable process exit codes: 2 config, 3 not ready, 4 link failure, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<WeighError>() {
        Some(WeighError::Config(_)) => 2,
        Some(WeighError::NotReady) => 3,
        Some(WeighError::Transport(_) | WeighError::Timeout) => 4,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({ "reason": reason_name(err), "message": humanize(err) }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(WeighError::Config("x".into()), 2, "Config")]
    #[case(WeighError::NotReady, 3, "NotReady")]
    #[case(WeighError::Timeout, 4, "Timeout")]
    #[case(WeighError::Transport("gone".into()), 4, "Transport")]
    #[case(WeighError::Calibration("flat".into()), 1, "Calibration")]
    fn typed_errors_map_to_codes(#[case] e: WeighError, #[case] code: i32, #[case] reason: &str) {
        let report = eyre::Report::new(e);
        assert_eq!(exit_code_for_error(&report), code);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&report)).unwrap();
        assert_eq!(v["reason"], reason);
        assert!(v["message"].as_str().unwrap().starts_with("What happened"));
    }

    #[test]
    fn untyped_errors_fall_back() {
        let report = eyre::eyre!("boom");
        assert_eq!(exit_code_for_error(&report), 1);
        assert!(humanize(&report).contains("Original: boom"));
    }
}
