//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "weigh", version, about = "Weigh station acquisition CLI")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/weigh_config.toml")]
    pub config: PathBuf,

    /// Emit logs, readings and errors as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream readings from the configured scale
    Run {
        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long, value_name = "SECS")]
        seconds: Option<u64>,
        /// How often to print the latest reading
        #[arg(long, value_name = "MS", default_value_t = 100)]
        interval_ms: u64,
        /// Pass printed readings through the zero-tracking drift compensator
        #[arg(long, action = ArgAction::SetTrue)]
        drift: bool,
        /// Print the last N diagnostic log entries on exit
        #[arg(long, value_name = "N")]
        dump_log: Option<usize>,
    },
    /// Decode one frame with the configured decoder
    Decode {
        /// Frame text, e.g. "ST,GS,  0.000kg"
        frame: String,
    },
    /// Zero the scale with the current load and print the new calibration
    Tare {
        /// Write the resulting calibration to this TOML file
        #[arg(long, value_name = "FILE")]
        write: Option<PathBuf>,
    },
    /// Derive the scale factor from a known mass or a multi-point CSV
    Calibrate {
        /// Grams currently on the platform
        #[arg(long, value_name = "GRAMS", required_unless_present = "csv", conflicts_with = "csv")]
        known_g: Option<f64>,
        /// Fit `raw,grams` rows instead of sampling the scale
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
        /// Write the resulting calibration to this TOML file
        #[arg(long, value_name = "FILE")]
        write: Option<PathBuf>,
    },
    /// Open the configured transport once and report
    SelfCheck,
}
