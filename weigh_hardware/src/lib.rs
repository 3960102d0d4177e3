//! Physical links for the weigh station: RS-232 ASCII scales, bit-banged HX711
//! (feature `hardware`, Linux only) and a simulated scale for development.
pub mod error;
pub mod framing;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod hx711;
pub mod serial;
pub mod sim;
pub mod util;

pub use error::HwError;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use hx711::{Hx711Settings, Hx711Transport};
pub use serial::{SerialSettings, SerialTransport};
pub use sim::{SimHandle, SimulatedTransport};

// Line-setting enums re-exported so callers need not depend on serialport directly.
pub use serialport::{DataBits, FlowControl, Parity, StopBits};
