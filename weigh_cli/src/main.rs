mod cli;
mod commands;
mod error_fmt;
mod logging;
mod transport;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use weigh_config::Config;
use weigh_core::WeighError;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::commands::RunOpts;
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

/// Read, parse, apply environment overrides and validate. Every failure is a
/// config error.
fn load_config(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| WeighError::Config(format!("read {}: {e}", path.display())))?;
    let mut cfg = weigh_config::load_toml(&text)
        .map_err(|e| WeighError::Config(format!("parse {}: {e}", path.display())))?;
    cfg.apply_process_env()
        .map_err(|e| WeighError::Config(format!("{e:#}")))?;
    cfg.validate()
        .map_err(|e| WeighError::Config(format!("{e:#}")))?;
    Ok(cfg)
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    color_eyre::install()?;
    let cfg = load_config(&cli.config)?;
    logging::init_tracing(cli.json, &cli.log_level, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match cli.cmd {
        Commands::Run {
            seconds,
            interval_ms,
            drift,
            dump_log,
        } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let flag = shutdown.clone();
                ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                    .map_err(|e| eyre::eyre!("install Ctrl-C handler: {e}"))?;
            }
            let opts = RunOpts {
                seconds,
                interval: Duration::from_millis(interval_ms.max(1)),
                drift,
                dump_log,
            };
            commands::run_stream(&cfg, transport::build_transport(&cfg)?, &opts, shutdown)
        }
        Commands::Decode { frame } => commands::decode_one(&cfg, &frame),
        Commands::Tare { write } => {
            commands::tare(&cfg, transport::build_transport(&cfg)?, write.as_deref())
        }
        Commands::Calibrate {
            known_g,
            csv,
            write,
        } => match (csv, known_g) {
            (Some(csv), _) => commands::calibrate_csv(&csv, write.as_deref()),
            (None, Some(g)) => commands::calibrate_known(
                &cfg,
                transport::build_transport(&cfg)?,
                g,
                write.as_deref(),
            ),
            (None, None) => Err(WeighError::Config("either --known-g or --csv is required".into()).into()),
        },
        Commands::SelfCheck => commands::self_check(&cfg, transport::build_transport(&cfg)?),
    }
}
