pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::time::{Duration, SystemTime};

/// Error type used at the trait boundary; mapped to typed errors in `weigh_core`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a transport hands back for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Bytes of one terminated (or size-capped) ASCII frame, terminator excluded.
    Ascii(Vec<u8>),
    /// 24 raw bits clocked out of a bit-level ADC, MSB first, not sign-extended.
    Bits(u32),
}

/// One raw frame plus its arrival time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: Payload,
    pub received_at: SystemTime,
}

impl Frame {
    pub fn ascii(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: Payload::Ascii(bytes.into()),
            received_at: SystemTime::now(),
        }
    }

    pub fn bits(raw: u32) -> Self {
        Self {
            payload: Payload::Bits(raw & 0x00FF_FFFF),
            received_at: SystemTime::now(),
        }
    }

    /// Lossy text form used by the decoder and the diagnostic log.
    pub fn text(&self) -> String {
        match &self.payload {
            Payload::Ascii(bytes) => bytes
                .iter()
                .filter(|b| b.is_ascii())
                .map(|&b| b as char)
                .collect::<String>()
                .trim()
                .to_string(),
            Payload::Bits(raw) => format!("0x{raw:06X}"),
        }
    }
}

/// A physical link to a weighing platform.
///
/// `read_frame` returns `Ok(None)` when nothing usable arrived within `timeout`
/// (quiet serial line, ADC not ready). `Err` means the link is broken and must be
/// closed and reopened.
pub trait Transport {
    /// Human-readable link name for logs, e.g. `/dev/ttyUSB0 @ 9600 baud`.
    fn describe(&self) -> String;
    fn is_open(&self) -> bool;
    fn open(&mut self) -> Result<(), BoxError>;
    fn read_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, BoxError>;
    fn close(&mut self);

    /// Whether the device paces itself (blocking until data is ready). Links that
    /// return immediately are paced by the acquisition loop at the configured rate.
    fn is_self_paced(&self) -> bool {
        true
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }
    fn is_open(&self) -> bool {
        (**self).is_open()
    }
    fn open(&mut self) -> Result<(), BoxError> {
        (**self).open()
    }
    fn read_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, BoxError> {
        (**self).read_frame(timeout)
    }
    fn close(&mut self) {
        (**self).close()
    }
    fn is_self_paced(&self) -> bool {
        (**self).is_self_paced()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_text_is_trimmed_and_drops_non_ascii() {
        let f = Frame::ascii(b"  ST,GS,  0.000kg\r\xff".to_vec());
        assert_eq!(f.text(), "ST,GS,  0.000kg");
    }

    #[test]
    fn bits_are_masked_to_24() {
        let f = Frame::bits(0xFF80_0001);
        assert_eq!(f.payload, Payload::Bits(0x80_0001));
        assert_eq!(f.text(), "0x800001");
    }
}
