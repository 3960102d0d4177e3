//! Calibration persistence as a standalone `[calibration]` TOML file.

use std::path::Path;

use eyre::WrapErr;
use weigh_config::PersistedCalibration;

use crate::calibration::Calibration;
use crate::error::Result;
use crate::util::write_atomic;

pub fn save_calibration(path: &Path, cal: &Calibration) -> Result<()> {
    let doc = PersistedCalibration::from(*cal).to_toml()?;
    write_atomic(path, doc.as_bytes())
        .wrap_err_with(|| format!("write calibration to {}", path.display()))?;
    tracing::info!(path = %path.display(), "calibration saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_file_loads_back_as_config() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("calibration.toml");
        save_calibration(&p, &Calibration::new(842_913, -1000.5)).unwrap();
        let cfg = weigh_config::load_toml(&std::fs::read_to_string(&p).unwrap()).unwrap();
        let back = Calibration::from(cfg.calibration_or_default());
        assert_eq!(back, Calibration::new(842_913, -1000.5));
    }
}
