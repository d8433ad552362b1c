//! Advertising controller.
//!
//! Tracks two things: whether advertising is *wanted* (set by explicit
//! start/stop requests) and whether the radio is *actually* advertising.
//! They diverge while the server is at its connection limit: advertising is
//! paused then, and resumed once a link drops.

use log::{debug, error, info};

use crate::app::ports::RadioPort;
use crate::error::RadioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdvertisingState {
    #[default]
    Stopped,
    Advertising,
}

#[derive(Debug, Default)]
pub struct AdvertisingController {
    state: AdvertisingState,
    wanted: bool,
}

impl AdvertisingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AdvertisingState {
        self.state
    }

    pub fn is_advertising(&self) -> bool {
        self.state == AdvertisingState::Advertising
    }

    pub fn is_wanted(&self) -> bool {
        self.wanted
    }

    /// Request advertising.  Returns `Ok(true)` if the radio was started,
    /// `Ok(false)` if nothing changed (already advertising, or deferred
    /// because the connection limit is reached).
    pub fn start(&mut self, radio: &mut dyn RadioPort, at_capacity: bool) -> Result<bool, RadioError> {
        self.wanted = true;
        if self.is_advertising() {
            info!("adv: already advertising");
            return Ok(false);
        }
        if at_capacity {
            info!("adv: start deferred, connection limit reached");
            return Ok(false);
        }
        self.radio_start(radio)
    }

    /// Cancel the advertising request.  Idempotent.
    pub fn stop(&mut self, radio: &mut dyn RadioPort) -> Result<bool, RadioError> {
        self.wanted = false;
        if !self.is_advertising() {
            info!("adv: already stopped");
            return Ok(false);
        }
        self.radio_stop(radio)
    }

    /// A central connected.  Legacy advertising ends on connection, so the
    /// radio is no longer advertising; [`sync`](Self::sync) restarts it if
    /// there is room for another link.
    pub fn link_established(&mut self) {
        if self.is_advertising() {
            debug!("adv: ended by connection");
            self.state = AdvertisingState::Stopped;
        }
    }

    /// Reconcile the radio with the intent after the connection count changed.
    pub fn sync(&mut self, radio: &mut dyn RadioPort, at_capacity: bool) -> Result<bool, RadioError> {
        match (self.wanted && !at_capacity, self.state) {
            (true, AdvertisingState::Stopped) => {
                info!("adv: resuming");
                self.radio_start(radio)
            }
            (false, AdvertisingState::Advertising) => {
                info!("adv: pausing");
                self.radio_stop(radio)
            }
            _ => Ok(false),
        }
    }

    fn radio_start(&mut self, radio: &mut dyn RadioPort) -> Result<bool, RadioError> {
        radio.start_advertising().map_err(|e| {
            error!("adv: start failed: {}", e);
            e
        })?;
        self.state = AdvertisingState::Advertising;
        info!("adv: started");
        Ok(true)
    }

    fn radio_stop(&mut self, radio: &mut dyn RadioPort) -> Result<bool, RadioError> {
        radio.stop_advertising().map_err(|e| {
            error!("adv: stop failed: {}", e);
            e
        })?;
        self.state = AdvertisingState::Stopped;
        info!("adv: stopped");
        Ok(true)
    }
}
