//! Status indicator on a GPIO output.
//!
//! Any `embedded-hal` 1.0 output pin works: an `esp-idf-hal` `PinDriver`
//! on the device, a mock in tests.

use embedded_hal::digital::{OutputPin, PinState};
use log::warn;

use crate::app::ports::StatusIndicator;

pub struct PinIndicator<P: OutputPin> {
    pin: P,
    active_low: bool,
    active: bool,
}

impl<P: OutputPin> PinIndicator<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            active_low: false,
            active: false,
        }
    }

    /// Drive the pin low while active (LED wired to VCC).
    pub fn active_low(pin: P) -> Self {
        Self {
            active_low: true,
            ..Self::new(pin)
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P: OutputPin> StatusIndicator for PinIndicator<P> {
    fn set_active(&mut self, active: bool) {
        let level = PinState::from(active != self.active_low);
        match self.pin.set_state(level) {
            Ok(()) => self.active = active,
            Err(e) => warn!("status pin: write failed ({:?})", e),
        }
    }
}
