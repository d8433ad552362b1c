//! Event dispatch: per-kind listener lists.
//!
//! Listeners run in registration order.  A failing listener is logged and
//! skipped; the ones after it still run.

use log::{debug, warn};

use super::events::{EventKind, ServerEvent};

pub type Listener1 = Box<dyn FnMut(&str) -> anyhow::Result<()>>;
pub type Listener2 = Box<dyn FnMut(&str, &str) -> anyhow::Result<()>>;

#[derive(Default)]
pub struct Triggers {
    client_connected: Vec<Listener1>,
    pinpad_accepted: Vec<Listener2>,
    pinpad_rejected: Vec<Listener2>,
    user_selected: Vec<Listener1>,
    user_command_received: Vec<Listener2>,
}

impl Triggers {
    pub fn new() -> Self {
        Self::default()
    }

    /// `f(mac)`
    pub fn on_client_connected(
        &mut self,
        f: impl FnMut(&str) -> anyhow::Result<()> + 'static,
    ) -> &mut Self {
        self.client_connected.push(Box::new(f));
        self
    }

    /// `f(user, cmd)`
    pub fn on_pinpad_accepted(
        &mut self,
        f: impl FnMut(&str, &str) -> anyhow::Result<()> + 'static,
    ) -> &mut Self {
        self.pinpad_accepted.push(Box::new(f));
        self
    }

    /// `f(user, cmd)`
    pub fn on_pinpad_rejected(
        &mut self,
        f: impl FnMut(&str, &str) -> anyhow::Result<()> + 'static,
    ) -> &mut Self {
        self.pinpad_rejected.push(Box::new(f));
        self
    }

    /// `f(user)`
    pub fn on_user_selected(
        &mut self,
        f: impl FnMut(&str) -> anyhow::Result<()> + 'static,
    ) -> &mut Self {
        self.user_selected.push(Box::new(f));
        self
    }

    /// `f(mac, cmd)`
    pub fn on_user_command_received(
        &mut self,
        f: impl FnMut(&str, &str) -> anyhow::Result<()> + 'static,
    ) -> &mut Self {
        self.user_command_received.push(Box::new(f));
        self
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::ClientConnected => self.client_connected.len(),
            EventKind::PinpadAccepted => self.pinpad_accepted.len(),
            EventKind::PinpadRejected => self.pinpad_rejected.len(),
            EventKind::UserSelected => self.user_selected.len(),
            EventKind::UserCommandReceived => self.user_command_received.len(),
        }
    }

    /// Run every listener for `event`.  Returns how many failed.
    pub fn fire(&mut self, event: &ServerEvent<'_>) -> usize {
        debug!("dispatch: {}", event);
        let results: Vec<anyhow::Result<()>> = match *event {
            ServerEvent::ClientConnected { mac } => {
                self.client_connected.iter_mut().map(|f| f(mac)).collect()
            }
            ServerEvent::PinpadAccepted { user, cmd } => {
                self.pinpad_accepted.iter_mut().map(|f| f(user, cmd)).collect()
            }
            ServerEvent::PinpadRejected { user, cmd } => {
                self.pinpad_rejected.iter_mut().map(|f| f(user, cmd)).collect()
            }
            ServerEvent::UserSelected { user } => {
                self.user_selected.iter_mut().map(|f| f(user)).collect()
            }
            ServerEvent::UserCommandReceived { mac, cmd } => self
                .user_command_received
                .iter_mut()
                .map(|f| f(mac, cmd))
                .collect(),
        };

        let mut failures = 0;
        for (i, r) in results.into_iter().enumerate() {
            if let Err(e) = r {
                warn!("dispatch: {:?} listener {} failed: {:#}", event.kind(), i, e);
                failures += 1;
            }
        }
        failures
    }
}
