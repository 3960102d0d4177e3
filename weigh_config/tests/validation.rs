use rstest::rstest;
use weigh_config::{TransportKind, load_toml};

const FULL: &str = r#"
[transport]
kind = "hx711"

[serial]
port = "/dev/ttyUSB1"
baud = 9600
read_timeout_ms = 500
parity = "n"
frame_terminator = "\\r\\n"
frame_max_bytes = 64

[hx711]
dt_pin = 5
sck_pin = 6
gain_pulses = 1

[acquisition]
native_counts_per_gram = 1000.0
sample_rate_hz = 10

[filter]
window = 9
ema_alpha = 0.2

[drift]
median_n = 5
bypass = true

[calibration]
zero_offset = 842913
scale_factor = -412.5

[logging]
level = "debug"
rotation = "daily"
"#;

#[test]
fn full_config_parses_and_validates() {
    let cfg = load_toml(FULL).expect("parse TOML");
    cfg.validate().expect("valid config");
    assert_eq!(cfg.transport.kind, TransportKind::Hx711);
    assert_eq!(cfg.filter.window, 9);
    assert!(cfg.drift.bypass);
    let cal = cfg.calibration_or_default();
    assert_eq!(cal.zero_offset, 842_913);
    assert_eq!(cal.scale_factor, -412.5);
}

#[test]
fn unknown_transport_kind_fails_to_parse() {
    assert!(load_toml("[transport]\nkind = \"usb\"\n").is_err());
}

#[rstest]
#[case("[serial]\nbaud = 0\n", "serial.baud")]
#[case("[serial]\ndata_bits = 9\n", "serial.data_bits")]
#[case("[serial]\nstop_bits = 3\n", "serial.stop_bits")]
#[case("[serial]\nframe_max_bytes = 0\n", "serial.frame_max_bytes")]
#[case("[serial]\nframe_terminator = \"\\\\q\"\n", "unsupported escape")]
#[case("[hx711]\ngain_pulses = 4\n", "hx711.gain_pulses")]
#[case("[acquisition]\nnative_counts_per_gram = 0.0\n", "native_counts_per_gram")]
#[case("[acquisition]\nsample_rate_hz = 0\n", "sample_rate_hz")]
#[case("[acquisition]\nbackoff_initial_ms = 20000\n", "backoff_initial_ms")]
#[case("[acquisition]\nlog_capacity = 0\n", "log_capacity")]
#[case("[filter]\nwindow = 0\n", "filter.window")]
#[case("[filter]\nema_alpha = 1.5\n", "filter.ema_alpha")]
#[case("[drift]\nmedian_n = 0\n", "drift.median_n")]
#[case("[drift]\nzero_gate_g = -1.0\n", "drift thresholds")]
#[case("[logging]\nrotation = \"weekly\"\n", "logging.rotation")]
fn out_of_range_values_are_rejected(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    let msg = format!("{err}");
    assert!(msg.contains(needle), "{msg:?} does not mention {needle:?}");
}
