//! Time and file helpers.

use std::{fs, io::Write, path::Path};

pub const MICROS_PER_SEC: u64 = 1_000_000;
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Period in microseconds for `hz`; `hz` is clamped to at least 1.
#[inline]
pub fn period_us(hz: u32) -> u64 {
    (MICROS_PER_SEC / u64::from(hz.max(1))).max(1)
}

#[inline]
pub fn period_ms(hz: u32) -> u64 {
    (MILLIS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Write through a sibling temp file and rename over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periods_clamp_zero_hz() {
        assert_eq!(period_us(0), 1_000_000);
        assert_eq!(period_us(10), 100_000);
        assert_eq!(period_ms(0), 1000);
        assert_eq!(period_ms(4000), 1);
    }

    #[test]
    fn atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("nested").join("cal.toml");
        write_atomic(&p, b"one").unwrap();
        write_atomic(&p, b"two").unwrap();
        assert_eq!(fs::read(&p).unwrap(), b"two");
        assert!(!p.with_extension("new").exists());
    }
}
