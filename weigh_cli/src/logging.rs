//! Console and optional file logging.

use std::path::Path;

use eyre::WrapErr;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::FILE_GUARD;

fn rotation(name: Option<&str>) -> eyre::Result<Rotation> {
    match name.map(str::to_ascii_lowercase).as_deref() {
        None | Some("never") => Ok(Rotation::NEVER),
        Some("daily") => Ok(Rotation::DAILY),
        Some("hourly") => Ok(Rotation::HOURLY),
        Some(other) => eyre::bail!("logging.rotation must be never|daily|hourly, got {other:?}"),
    }
}

/// Logs go to stderr so stdout stays clean for readings. `RUST_LOG` wins over
/// `--log-level`. `[logging].file` adds a JSON-lines sink.
pub fn init_tracing(json: bool, level: &str, logging: &weigh_config::Logging) -> eyre::Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;
    let console: Box<dyn Layer<Registry> + Send + Sync> = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let file_layer = match &logging.file {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name: {}", path.display()))?;
            let appender = RollingFileAppender::new(rotation(logging.rotation.as_deref())?, dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            let file_level = logging.level.as_deref().unwrap_or(level);
            let filter = EnvFilter::try_new(file_level)
                .wrap_err_with(|| format!("invalid logging.level {file_level:?}"))?;
            Some(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(filter),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console.with_filter(console_filter))
        .with(file_layer)
        .try_init()
        .map_err(|e| eyre::eyre!("install tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_names() {
        assert_eq!(rotation(None).unwrap(), Rotation::NEVER);
        assert_eq!(rotation(Some("Daily")).unwrap(), Rotation::DAILY);
        assert!(rotation(Some("weekly")).is_err());
    }
}
