//! Scripted transports for exercising the acquisition loop without hardware.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use weigh_traits::{BoxError, Frame, Transport};

/// One scripted read result.
#[derive(Debug, Clone)]
pub enum Step {
    Frame(String),
    Bits(u32),
    Quiet,
    Fault(String),
}

/// Open/close/read counters shared with the test after the transport moves.
#[derive(Debug, Default)]
pub struct LinkStats {
    pub opens: AtomicUsize,
    pub open_attempts: AtomicUsize,
    pub closes: AtomicUsize,
    pub reads: AtomicUsize,
}

impl LinkStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
    pub fn open_attempts(&self) -> usize {
        self.open_attempts.load(Ordering::SeqCst)
    }
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Plays back `steps` in order, then stays quiet. The first `fail_opens`
/// open attempts fail.
#[derive(Debug)]
pub struct ScriptedTransport {
    steps: VecDeque<Step>,
    open: bool,
    fail_opens: usize,
    repeat_last: bool,
    last: Option<Step>,
    stats: Arc<LinkStats>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            open: false,
            fail_opens: 0,
            repeat_last: false,
            last: None,
            stats: Arc::new(LinkStats::default()),
        }
    }

    /// Repeats one frame forever.
    pub fn repeating(text: &str) -> Self {
        let mut t = Self::new(vec![Step::Frame(text.to_string())]);
        t.repeat_last = true;
        t
    }

    pub fn with_open_failures(mut self, n: usize) -> Self {
        self.fail_opens = n;
        self
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        self.stats.clone()
    }
}

impl Transport for ScriptedTransport {
    fn describe(&self) -> String {
        "scripted".into()
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn open(&mut self) -> Result<(), BoxError> {
        self.stats.open_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_opens > 0 {
            self.fail_opens -= 1;
            return Err("port busy".into());
        }
        self.open = true;
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_frame(&mut self, _timeout: Duration) -> Result<Option<Frame>, BoxError> {
        self.stats.reads.fetch_add(1, Ordering::SeqCst);
        let step = match self.steps.pop_front() {
            Some(s) => {
                self.last = Some(s.clone());
                s
            }
            None if self.repeat_last => self.last.clone().unwrap_or(Step::Quiet),
            None => Step::Quiet,
        };
        match step {
            Step::Frame(text) => Ok(Some(Frame::ascii(text.into_bytes()))),
            Step::Bits(raw) => Ok(Some(Frame::bits(raw))),
            Step::Quiet => Ok(None),
            Step::Fault(msg) => Err(msg.into()),
        }
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_self_paced(&self) -> bool {
        false
    }
}

/// A link whose open always fails with `message`.
#[derive(Debug)]
pub struct FailingOpenTransport {
    message: String,
    stats: Arc<LinkStats>,
}

impl FailingOpenTransport {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            stats: Arc::new(LinkStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        self.stats.clone()
    }
}

impl Transport for FailingOpenTransport {
    fn describe(&self) -> String {
        "unreachable".into()
    }
    fn is_open(&self) -> bool {
        false
    }
    fn open(&mut self) -> Result<(), BoxError> {
        self.stats.open_attempts.fetch_add(1, Ordering::SeqCst);
        Err(self.message.clone().into())
    }
    fn read_frame(&mut self, _timeout: Duration) -> Result<Option<Frame>, BoxError> {
        Ok(None)
    }
    fn close(&mut self) {}
}
