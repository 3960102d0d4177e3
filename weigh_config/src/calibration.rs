//! Multi-point calibration from a `raw,grams` CSV.
//!
//! The fit is `raw = scale_factor * grams + zero_offset` (counts per gram plus
//! tare), estimated by least squares. Points with a residual beyond 2 RMS are
//! dropped once and the line refitted when at least two points remain.
use serde::Deserialize;

use crate::PersistedCalibration;

/// Expected headers:
/// raw,grams
///
/// Example:
/// raw,grams
/// 842913,0.0
/// 942913,100.0
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CalibrationRow {
    pub raw: i64,
    pub grams: f64,
}

/// Least-squares line `raw = a * grams + b`.
fn fit_line(pts: &[(f64, f64)]) -> eyre::Result<(f64, f64)> {
    let n = pts.len() as f64;
    let mean_g = pts.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_r = pts.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sgg, mut sgr) = (0.0f64, 0.0f64);
    for (g, r) in pts {
        sgg += (g - mean_g) * (g - mean_g);
        sgr += (g - mean_g) * (r - mean_r);
    }
    if !sgg.is_finite() || sgg == 0.0 {
        eyre::bail!("calibration needs at least two distinct reference masses");
    }
    let a = sgr / sgg;
    if !a.is_finite() || a == 0.0 {
        eyre::bail!("calibration produced a zero or non-finite scale factor");
    }
    Ok((a, mean_r - a * mean_g))
}

impl TryFrom<&[CalibrationRow]> for PersistedCalibration {
    type Error = eyre::Report;

    fn try_from(rows: &[CalibrationRow]) -> Result<Self, Self::Error> {
        if rows.len() < 2 {
            eyre::bail!("calibration requires at least two rows, got {}", rows.len());
        }
        if rows.iter().any(|r| !r.grams.is_finite()) {
            eyre::bail!("calibration grams must be finite");
        }
        let pts: Vec<(f64, f64)> = rows.iter().map(|r| (r.grams, r.raw as f64)).collect();
        let (a0, b0) = fit_line(&pts)?;

        let rms = (pts
            .iter()
            .map(|(g, r)| (r - (a0 * g + b0)).powi(2))
            .sum::<f64>()
            / pts.len() as f64)
            .sqrt();
        let (a, b) = if rms > 0.0 {
            let inliers: Vec<(f64, f64)> = pts
                .iter()
                .copied()
                .filter(|(g, r)| (r - (a0 * g + b0)).abs() <= 2.0 * rms)
                .collect();
            if inliers.len() >= 2 && inliers.len() < pts.len() {
                fit_line(&inliers).unwrap_or((a0, b0))
            } else {
                (a0, b0)
            }
        } else {
            (a0, b0)
        };

        if !b.is_finite() {
            eyre::bail!("calibration produced an invalid zero offset");
        }
        Ok(PersistedCalibration {
            zero_offset: b.round() as i64,
            scale_factor: a,
        })
    }
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<PersistedCalibration> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<&str> = headers.iter().collect();
    if actual != ["raw", "grams"] {
        eyre::bail!(
            "calibration CSV must have headers 'raw,grams', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }
    PersistedCalibration::try_from(rows.as_slice())
}
