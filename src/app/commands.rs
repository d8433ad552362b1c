//! Inbound requests to the GATT server.
//!
//! [`ServerAction`]s are imperative requests from automations and other
//! tasks.  [`RadioEvent`]s are BLE stack callbacks deferred to the dispatch
//! loop.  Both travel through the [`ActionQueue`](super::inbox::ActionQueue).

use crate::connection::ConnHandle;
use crate::gatt::AttrHandle;

/// Largest value carried by a single queued write or notification
/// (ATT_MTU 247 minus the 3-byte header).
pub const MAX_PDU_VALUE: usize = 244;

pub type PduValue = heapless::Vec<u8, MAX_PDU_VALUE>;

/// Actions that external code can request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    StartAdvertising,
    StopAdvertising,
    /// Update a Notify characteristic and push it to subscribers.
    Notify { attr: AttrHandle, value: PduValue },
    /// Force a link down.
    Disconnect(ConnHandle),
}

/// BLE stack callbacks marshalled onto the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    Connected { conn: ConnHandle, mac: [u8; 6] },
    Disconnected { conn: ConnHandle },
    /// Read request; answered with [`send_response`](super::ports::RadioPort::send_response).
    /// `offset` is non-zero for Read Blob continuations of long values.
    Read {
        conn: ConnHandle,
        attr: AttrHandle,
        request: u32,
        offset: u16,
    },
    /// Write request.  `request` is `None` for write-without-response.
    Write {
        conn: ConnHandle,
        attr: AttrHandle,
        value: PduValue,
        request: Option<u32>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Action(ServerAction),
    Radio(RadioEvent),
}

impl From<ServerAction> for Inbound {
    fn from(a: ServerAction) -> Self {
        Self::Action(a)
    }
}

impl From<RadioEvent> for Inbound {
    fn from(e: RadioEvent) -> Self {
        Self::Radio(e)
    }
}
