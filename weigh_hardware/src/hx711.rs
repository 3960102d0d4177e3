//! Bit-banged HX711 transport on Raspberry Pi GPIO.

use std::time::Duration;

use rppal::gpio::{Gpio, InputPin, OutputPin};
use tracing::{info, trace};
use weigh_traits::{BoxError, Frame, Transport};

use crate::error::{HwError, Result};
use crate::util::{Readiness, wait_until_low};

/// Pin assignment and timing for one HX711.
#[derive(Debug, Clone, Copy)]
pub struct Hx711Settings {
    pub dt_pin: u8,
    pub sck_pin: u8,
    /// Extra clock pulses after the 24 data bits: 1 = A/128, 2 = B/32, 3 = A/64.
    pub gain_pulses: u8,
    /// Upper bound on waiting for DT to go low before reporting "not ready".
    pub ready_timeout: Duration,
}

impl Default for Hx711Settings {
    fn default() -> Self {
        Self {
            dt_pin: 5,
            sck_pin: 6,
            gain_pulses: 1,
            ready_timeout: Duration::from_secs(1),
        }
    }
}

struct Pins {
    dt: InputPin,
    sck: OutputPin,
}

pub struct Hx711Transport {
    settings: Hx711Settings,
    pins: Option<Pins>,
}

impl Hx711Transport {
    pub fn new(settings: Hx711Settings) -> Self {
        Self {
            settings,
            pins: None,
        }
    }

    fn claim_pins(&self) -> Result<Pins> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let dt = gpio
            .get(self.settings.dt_pin)
            .map_err(|e| HwError::Gpio(format!("open hx711 dt pin: {e}")))?
            .into_input();
        let mut sck = gpio
            .get(self.settings.sck_pin)
            .map_err(|e| HwError::Gpio(format!("open hx711 sck pin: {e}")))?
            .into_output();
        sck.set_low(); // clock idles low; holding it high >60us powers the chip down
        Ok(Pins { dt, sck })
    }
}

impl Transport for Hx711Transport {
    fn describe(&self) -> String {
        format!(
            "hx711 dt=GPIO{} sck=GPIO{}",
            self.settings.dt_pin, self.settings.sck_pin
        )
    }

    fn is_open(&self) -> bool {
        self.pins.is_some()
    }

    fn open(&mut self) -> std::result::Result<(), BoxError> {
        if self.pins.is_none() {
            self.pins = Some(self.claim_pins()?);
            info!(
                dt = self.settings.dt_pin,
                sck = self.settings.sck_pin,
                "hx711 pins claimed"
            );
        }
        Ok(())
    }

    fn read_frame(&mut self, timeout: Duration) -> std::result::Result<Option<Frame>, BoxError> {
        let pins = self.pins.as_mut().ok_or(HwError::Closed)?;
        let wait = timeout.min(self.settings.ready_timeout);
        if wait_until_low(|| pins.dt.is_high(), wait, Duration::from_micros(200))
            == Readiness::NotReady
        {
            return Ok(None);
        }

        let mut value: u32 = 0;
        for _ in 0..24 {
            pins.sck.set_high();
            spin_delay();
            value = (value << 1) | u32::from(pins.dt.is_high());
            pins.sck.set_low();
            spin_delay();
        }
        for _ in 0..self.settings.gain_pulses {
            pins.sck.set_high();
            spin_delay();
            pins.sck.set_low();
            spin_delay();
        }
        trace!(raw = value, "hx711 bits");
        Ok(Some(Frame::bits(value)))
    }

    fn close(&mut self) {
        if self.pins.take().is_some() {
            info!("hx711 pins released");
        }
    }
}

#[inline(always)]
fn spin_delay() {
    // PD_SCK high/low must each last >= 0.2us; a few spin hints cover that on a Pi.
    for _ in 0..4 {
        std::hint::spin_loop();
    }
}
