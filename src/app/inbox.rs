//! Cross-context inbox for the dispatch loop.
//!
//! The registry and connection table are only touched from the dispatch
//! loop.  Everything else (radio callbacks, timers, sensor tasks) posts an
//! [`Inbound`] here and the loop drains it with
//! [`GattServer::drain`](super::service::GattServer::drain).
//!
//! ```text
//! ┌──────────────┐   Inbound    ┌───────────────┐
//! │ BLE callback │─────────────▶│ dispatch loop │
//! │ automations  │  (bounded)   │  GattServer   │
//! └──────────────┘              └───────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use log::warn;

use super::commands::{Inbound, RadioEvent, ServerAction};

/// Queue depth.
pub const INBOX_DEPTH: usize = 16;

pub struct ActionQueue {
    channel: Channel<CriticalSectionRawMutex, Inbound, INBOX_DEPTH>,
}

impl ActionQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Enqueue without blocking.  A full queue hands the message back.
    pub fn post(&self, msg: impl Into<Inbound>) -> Result<(), Inbound> {
        match self.channel.try_send(msg.into()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(m)) => {
                warn!("inbox: queue full ({} pending)", INBOX_DEPTH);
                Err(m)
            }
        }
    }

    pub fn post_action(&self, action: ServerAction) -> Result<(), Inbound> {
        self.post(action)
    }

    pub fn post_radio(&self, event: RadioEvent) -> Result<(), Inbound> {
        self.post(event)
    }

    pub(crate) fn take(&self) -> Option<Inbound> {
        self.channel.try_receive().ok()
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnHandle;

    #[test]
    fn fifo_order_and_capacity() {
        let q = ActionQueue::new();
        assert!(q.is_empty());
        for i in 0..INBOX_DEPTH {
            q.post(ServerAction::Disconnect(ConnHandle(i as u16))).unwrap();
        }
        let rejected = q.post(ServerAction::StartAdvertising).unwrap_err();
        assert_eq!(rejected, Inbound::Action(ServerAction::StartAdvertising));
        assert_eq!(q.len(), INBOX_DEPTH);

        assert_eq!(
            q.take(),
            Some(Inbound::Action(ServerAction::Disconnect(ConnHandle(0))))
        );
        q.post_radio(RadioEvent::Disconnected { conn: ConnHandle(9) }).unwrap();
        let mut drained = 1;
        while q.take().is_some() {
            drained += 1;
        }
        assert_eq!(drained, INBOX_DEPTH + 1);
    }
}
