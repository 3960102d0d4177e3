#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(mut cfg) = weigh_config::load_toml(data) {
        let _ = cfg.validate();
        let _ = cfg.apply_env(|_| Some(data.to_string()));
        let _ = cfg.serial.terminator_bytes();
    }
});
