//! Transport assembly from the validated config.

use std::time::Duration;

use weigh_config::{Config, ParityCfg, SerialCfg, TransportKind};
use weigh_core::WeighError;
use weigh_hardware::{DataBits, FlowControl, Parity, SerialSettings, SerialTransport, SimulatedTransport, StopBits};
use weigh_traits::Transport;

pub type BoxedTransport = Box<dyn Transport + Send>;

/// Initial load of the simulated scale, in grams.
pub const SIM_GRAMS_ENV: &str = "WEIGH_SIM_GRAMS";

fn config_error(msg: impl Into<String>) -> eyre::Report {
    WeighError::Config(msg.into()).into()
}

pub fn serial_settings(s: &SerialCfg) -> eyre::Result<SerialSettings> {
    let data_bits = match s.data_bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        8 => DataBits::Eight,
        n => return Err(config_error(format!("serial.data_bits must be 5..=8, got {n}"))),
    };
    let stop_bits = match s.stop_bits {
        1 => StopBits::One,
        2 => StopBits::Two,
        n => return Err(config_error(format!("serial.stop_bits must be 1 or 2, got {n}"))),
    };
    let parity = match s.parity {
        ParityCfg::None => Parity::None,
        ParityCfg::Even => Parity::Even,
        ParityCfg::Odd => Parity::Odd,
    };
    let flow_control = match (s.rtscts, s.xonxoff) {
        (true, xonxoff) => {
            if xonxoff {
                tracing::warn!("both rtscts and xonxoff set; using hardware flow control");
            }
            FlowControl::Hardware
        }
        (false, true) => FlowControl::Software,
        (false, false) => FlowControl::None,
    };
    Ok(SerialSettings {
        port: s.port.clone(),
        baud: s.baud,
        data_bits,
        parity,
        stop_bits,
        flow_control,
        dsrdtr: s.dsrdtr,
        force_dtr: s.force_dtr,
        force_rts: s.force_rts,
        read_timeout: Duration::from_millis(s.read_timeout_ms),
        terminator: s.terminator_bytes().map_err(|e| config_error(e.to_string()))?,
        max_frame_bytes: s.frame_max_bytes,
    })
}

fn simulated() -> eyre::Result<BoxedTransport> {
    let t = SimulatedTransport::new();
    if let Ok(v) = std::env::var(SIM_GRAMS_ENV) {
        let grams: f64 = v
            .trim()
            .parse()
            .map_err(|_| config_error(format!("{SIM_GRAMS_ENV}: invalid number {v:?}")))?;
        t.handle().set_grams(grams);
    }
    Ok(Box::new(t))
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn hx711(cfg: &Config) -> eyre::Result<BoxedTransport> {
    use weigh_hardware::{Hx711Settings, Hx711Transport};
    Ok(Box::new(Hx711Transport::new(Hx711Settings {
        dt_pin: cfg.hx711.dt_pin,
        sck_pin: cfg.hx711.sck_pin,
        gain_pulses: cfg.hx711.gain_pulses,
        ready_timeout: Duration::from_millis(cfg.hx711.ready_timeout_ms),
    })))
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn hx711(_cfg: &Config) -> eyre::Result<BoxedTransport> {
    Err(config_error(
        "transport.kind = \"hx711\" needs a Linux build with the `hardware` feature",
    ))
}

pub fn build_transport(cfg: &Config) -> eyre::Result<BoxedTransport> {
    match cfg.transport.kind {
        TransportKind::Serial => Ok(Box::new(SerialTransport::new(serial_settings(&cfg.serial)?))),
        TransportKind::Hx711 => hx711(cfg),
        TransportKind::Simulated => simulated(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_line_settings_map_through() {
        let s = SerialCfg {
            data_bits: 7,
            parity: ParityCfg::Even,
            stop_bits: 2,
            xonxoff: true,
            frame_terminator: "\\r\\n".into(),
            ..SerialCfg::default()
        };
        let out = serial_settings(&s).unwrap();
        assert_eq!(out.data_bits, DataBits::Seven);
        assert_eq!(out.parity, Parity::Even);
        assert_eq!(out.stop_bits, StopBits::Two);
        assert_eq!(out.flow_control, FlowControl::Software);
        assert_eq!(out.terminator, b"\r\n");
    }

    #[test]
    fn bad_data_bits_are_config_errors() {
        let s = SerialCfg {
            data_bits: 9,
            ..SerialCfg::default()
        };
        let err = serial_settings(&s).unwrap_err();
        assert!(matches!(err.downcast_ref::<WeighError>(), Some(WeighError::Config(_))));
    }
}
