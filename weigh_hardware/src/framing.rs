//! Terminator-delimited framing for ASCII-streaming scales.
//!
//! A frame ends at the terminator sequence, at `max_len` bytes, or at the read
//! deadline, whichever comes first. A device that stops sending terminators can
//! therefore never grow a frame past `max_len`.

use std::io::{self, Read};
use std::time::{Duration, Instant};

/// Result of one framing attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawLine {
    pub bytes: Vec<u8>,
    /// True when the terminator was seen (and stripped).
    pub terminated: bool,
}

impl RawLine {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Read one frame from `reader`.
///
/// `TimedOut`/`WouldBlock` from the reader end the frame with whatever has
/// arrived; other I/O errors propagate. The overall `timeout` bounds the frame
/// even when the reader delivers bytes slowly.
pub fn read_terminated<R: Read + ?Sized>(
    reader: &mut R,
    terminator: &[u8],
    max_len: usize,
    timeout: Duration,
) -> io::Result<RawLine> {
    let deadline = Instant::now() + timeout;
    let mut line = RawLine {
        bytes: Vec::with_capacity(max_len.min(256)),
        terminated: false,
    };
    let mut byte = [0u8; 1];
    while line.bytes.len() < max_len {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                line.bytes.push(byte[0]);
                if !terminator.is_empty() && line.bytes.ends_with(terminator) {
                    let keep = line.bytes.len() - terminator.len();
                    line.bytes.truncate(keep);
                    line.terminated = true;
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                ) =>
            {
                break;
            }
            Err(e) => return Err(e),
        }
        if Instant::now() >= deadline {
            break;
        }
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const T: Duration = Duration::from_millis(100);

    #[test]
    fn splits_on_carriage_return() {
        let mut c = Cursor::new(b"ST,GS,  0.000kg\rUS,NT,+12.34 g\r".to_vec());
        let a = read_terminated(&mut c, b"\r", 64, T).unwrap();
        let b = read_terminated(&mut c, b"\r", 64, T).unwrap();
        assert_eq!(a.bytes, b"ST,GS,  0.000kg");
        assert!(a.terminated);
        assert_eq!(b.bytes, b"US,NT,+12.34 g");
    }

    #[test]
    fn multi_byte_terminator_is_stripped() {
        let mut c = Cursor::new(b"1.0 kg\r\n2.0 kg\r\n".to_vec());
        let a = read_terminated(&mut c, b"\r\n", 64, T).unwrap();
        assert_eq!(a.bytes, b"1.0 kg");
    }

    #[test]
    fn caps_runaway_frames() {
        let mut c = Cursor::new(vec![b'9'; 500]);
        let a = read_terminated(&mut c, b"\r", 64, T).unwrap();
        assert_eq!(a.bytes.len(), 64);
        assert!(!a.terminated);
    }

    struct TimesOut;
    impl Read for TimesOut {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "quiet"))
        }
    }

    #[test]
    fn timeout_yields_empty_line() {
        let a = read_terminated(&mut TimesOut, b"\r", 64, T).unwrap();
        assert!(a.is_empty());
    }

    struct Broken;
    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
        }
    }

    #[test]
    fn hard_errors_propagate() {
        let err = read_terminated(&mut Broken, b"\r", 64, T).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
