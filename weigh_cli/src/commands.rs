//! Subcommand handlers: streaming, one-shot decode, tare/calibration and link checks.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde_json::json;
use weigh_config::Config;
use weigh_core::persist::save_calibration;
use weigh_core::util::period_ms;
use weigh_core::{
    Acquisition, CALIBRATION_SAMPLES, Calibration, DriftCompensator, FrameDecoder, PipelineCfg,
    Snapshot, WeighError,
};
use weigh_traits::{MonotonicClock, Transport};

use crate::transport::BoxedTransport;

/// How long tare/calibrate wait for the first fresh reading.
const READY_TIMEOUT: Duration = Duration::from_secs(5);

fn json_mode() -> bool {
    crate::cli::JSON_MODE.get().copied().unwrap_or(false)
}

fn acquisition(cfg: &Config, transport: BoxedTransport) -> Acquisition<BoxedTransport> {
    Acquisition::new(
        transport,
        PipelineCfg::from(cfg),
        Calibration::from(cfg.calibration_or_default()),
        Arc::new(MonotonicClock::new()),
    )
}

pub struct RunOpts {
    pub seconds: Option<u64>,
    pub interval: Duration,
    pub drift: bool,
    pub dump_log: Option<usize>,
}

fn print_reading(snap: &Snapshot, compensated: Option<f64>) {
    if json_mode() {
        let mut v = json!({
            "grams": snap.grams,
            "stable": snap.stable,
            "raw_counts": snap.raw_counts,
        });
        if let Some(c) = compensated {
            v["compensated_g"] = json!(c);
        }
        println!("{v}");
    } else {
        let shown = compensated.unwrap_or(snap.grams);
        let flag = if snap.stable { "stable" } else { "moving" };
        println!("{shown:>10.1} g  {flag:<6}  raw={}", snap.raw_counts);
    }
}

/// Stream readings until `shutdown` is raised or the optional deadline passes.
pub fn run_stream(
    cfg: &Config,
    transport: BoxedTransport,
    opts: &RunOpts,
    shutdown: Arc<AtomicBool>,
) -> eyre::Result<()> {
    let acq = acquisition(cfg, transport);
    let drift_cfg = weigh_core::DriftCfg::from(&cfg.drift);
    let mut drift = opts.drift.then(|| DriftCompensator::new(&drift_cfg));
    tracing::info!(link = %acq.describe(), rate_hz = cfg.acquisition.sample_rate_hz, "streaming");
    acq.start(cfg.acquisition.sample_rate_hz)?;

    let deadline = opts
        .seconds
        .map(|s| Instant::now() + Duration::from_secs(s));
    while !shutdown.load(Ordering::Relaxed) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        std::thread::sleep(opts.interval);
        // Only print fresh readings; a quiet or reconnecting link prints nothing.
        if acq.read_raw_average(1).is_err() {
            continue;
        }
        let snap = acq.read_latest();
        let compensated = drift.as_mut().map(|d| d.update(snap.grams));
        print_reading(&snap, compensated);
    }

    acq.stop();
    tracing::info!("stream stopped");
    if let Some(n) = opts.dump_log {
        for entry in acq.diagnostic_log(n) {
            println!("{}", serde_json::to_string(&entry)?);
        }
    }
    Ok(())
}

/// Decode one frame without touching any transport.
pub fn decode_one(cfg: &Config, frame: &str) -> eyre::Result<()> {
    let decoder = FrameDecoder::new(cfg.acquisition.native_counts_per_gram);
    let Some(sample) = decoder.decode(frame) else {
        eyre::bail!("frame not recognised: {frame:?}");
    };
    if json_mode() {
        println!("{}", serde_json::to_string(&sample)?);
    } else {
        let hint = match sample.stability_hint.as_flag() {
            Some(true) => "stable",
            Some(false) => "unstable",
            None => "no hint",
        };
        println!(
            "{:.3} g  (unit {}, {:?}, {hint}, raw={})",
            sample.grams, sample.unit, sample.strategy, sample.raw_counts
        );
    }
    Ok(())
}

fn print_calibration(cal: &Calibration) -> eyre::Result<()> {
    if json_mode() {
        println!("{}", serde_json::to_string(cal)?);
    } else {
        println!(
            "zero_offset={} scale_factor={} sign={}",
            cal.zero_offset(),
            cal.scale_factor(),
            cal.scale_sign()
        );
    }
    Ok(())
}

fn finish_calibration(cal: &Calibration, write: Option<&Path>) -> eyre::Result<()> {
    print_calibration(cal)?;
    if let Some(path) = write {
        save_calibration(path, cal)?;
    }
    Ok(())
}

/// Start streaming, wait for fresh data and let enough samples in to average.
fn sample_then<F>(cfg: &Config, transport: BoxedTransport, op: F) -> eyre::Result<Calibration>
where
    F: FnOnce(&Acquisition<BoxedTransport>) -> weigh_core::Result<Calibration>,
{
    let acq = acquisition(cfg, transport);
    let rate = cfg.acquisition.sample_rate_hz;
    acq.start(rate)?;
    acq.wait_until_ready(READY_TIMEOUT)?;
    std::thread::sleep(Duration::from_millis(period_ms(rate) * CALIBRATION_SAMPLES as u64));
    let out = op(&acq);
    acq.stop();
    out
}

pub fn tare(cfg: &Config, transport: BoxedTransport, write: Option<&Path>) -> eyre::Result<()> {
    let cal = sample_then(cfg, transport, |acq| acq.tare())?;
    finish_calibration(&cal, write)
}

pub fn calibrate_known(
    cfg: &Config,
    transport: BoxedTransport,
    known_g: f64,
    write: Option<&Path>,
) -> eyre::Result<()> {
    let cal = sample_then(cfg, transport, |acq| acq.calibrate_with_known(known_g))?;
    finish_calibration(&cal, write)
}

/// Fit a calibration from `raw,grams` rows; nothing is sampled.
pub fn calibrate_csv(csv: &Path, write: Option<&Path>) -> eyre::Result<()> {
    let persisted = weigh_config::load_calibration_csv(csv)?;
    finish_calibration(&Calibration::from(persisted), write)
}

/// Open the link once, try one frame, close it.
pub fn self_check(cfg: &Config, mut transport: BoxedTransport) -> eyre::Result<()> {
    let name = transport.describe();
    transport
        .open()
        .map_err(|e| WeighError::Transport(format!("{name}: {e}")))?;
    let timeout = weigh_core::AcquisitionCfg::from(cfg).read_timeout;
    let frame = transport.read_frame(timeout);
    transport.close();
    let frame = frame.map_err(|e| WeighError::Transport(format!("{name}: {e}")))?;
    let text = frame.map(|f| f.text());
    if json_mode() {
        println!("{}", json!({ "link": name, "ok": true, "frame": text }));
    } else {
        match text {
            Some(t) => println!("ok: {name} (first frame {t:?})"),
            None => println!("ok: {name} (opened, no frame within {} ms)", timeout.as_millis()),
        }
    }
    Ok(())
}
