//! RS-232 transport for ASCII-streaming scales (Brecknell/Toledo style frames).

use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info, trace, warn};
use weigh_traits::{BoxError, Frame, Transport};

use crate::error::{HwError, Result};
use crate::framing::read_terminated;

/// Line settings for a serial scale.
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port: String,
    pub baud: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// DSR/DTR handshaking is not offered by the serial backend; when requested
    /// the transport logs a warning and asserts DTR instead.
    pub dsrdtr: bool,
    pub force_dtr: bool,
    pub force_rts: bool,
    pub read_timeout: Duration,
    pub terminator: Vec<u8>,
    pub max_frame_bytes: usize,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            dsrdtr: false,
            force_dtr: true,
            force_rts: true,
            read_timeout: Duration::from_millis(500),
            terminator: b"\r".to_vec(),
            max_frame_bytes: 64,
        }
    }
}

pub struct SerialTransport {
    settings: SerialSettings,
    port: Option<Box<dyn SerialPort>>,
    current_timeout: Duration,
}

impl SerialTransport {
    pub fn new(settings: SerialSettings) -> Self {
        let current_timeout = settings.read_timeout;
        Self {
            settings,
            port: None,
            current_timeout,
        }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    fn open_port(&self) -> Result<Box<dyn SerialPort>> {
        let s = &self.settings;
        let mut port = serialport::new(&s.port, s.baud)
            .data_bits(s.data_bits)
            .parity(s.parity)
            .stop_bits(s.stop_bits)
            .flow_control(s.flow_control)
            .timeout(s.read_timeout)
            .open()?;
        port.clear(ClearBuffer::Input)?;
        if s.dsrdtr {
            warn!(port = %s.port, "dsrdtr handshaking unsupported; asserting DTR only");
        }
        // Some interface boards only power the scale side when DTR/RTS are high.
        if s.force_dtr || s.dsrdtr {
            if let Err(e) = port.write_data_terminal_ready(true) {
                debug!(error = %e, "could not assert DTR");
            }
        }
        if s.force_rts {
            if let Err(e) = port.write_request_to_send(true) {
                debug!(error = %e, "could not assert RTS");
            }
        }
        Ok(port)
    }
}

impl Transport for SerialTransport {
    fn describe(&self) -> String {
        format!("{} @ {} baud", self.settings.port, self.settings.baud)
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn open(&mut self) -> std::result::Result<(), BoxError> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = self.open_port()?;
        info!(port = %self.settings.port, baud = self.settings.baud, "serial port opened");
        self.current_timeout = self.settings.read_timeout;
        self.port = Some(port);
        Ok(())
    }

    fn read_frame(&mut self, timeout: Duration) -> std::result::Result<Option<Frame>, BoxError> {
        let port = self.port.as_mut().ok_or(HwError::Closed)?;
        if timeout != self.current_timeout {
            port.set_timeout(timeout).map_err(HwError::from)?;
            self.current_timeout = timeout;
        }
        let line = read_terminated(
            port.as_mut(),
            &self.settings.terminator,
            self.settings.max_frame_bytes,
            timeout,
        )
        .map_err(HwError::from)?;
        if line.is_empty() {
            return Ok(None);
        }
        if !line.terminated {
            trace!(len = line.bytes.len(), "frame ended without terminator");
        }
        Ok(Some(Frame::ascii(line.bytes)))
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!(port = %self.settings.port, "serial port closed");
        }
    }

    fn is_self_paced(&self) -> bool {
        true
    }
}
