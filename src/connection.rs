//! Connection manager: tracks live BLE links and drives the status indicator.
//!
//! A [`Connection`] exists from the connect event to the disconnect event.
//! It carries the peer address, the user selected on the pinpad (if any)
//! and the link's pairing state.  Connection handles are opaque; the
//! manager allocates them sequentially unless the radio supplies its own.

use core::fmt::Write as _;

use log::{debug, info, warn};

use crate::app::ports::StatusIndicator;
use crate::error::GattError;
use crate::pairing::PairingState;

/// Hard upper bound on simultaneous links.
pub const MAX_CONNECTIONS: usize = 4;

/// Maximum length of a user identifier selected on the pinpad.
pub const MAX_USER_LEN: usize = 32;

pub type MacString = heapless::String<17>;
pub type UserId = heapless::String<MAX_USER_LEN>;

/// Opaque connection identifier shared with the radio driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnHandle(pub u16);

impl core::fmt::Display for ConnHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Render a peer address as `AA:BB:CC:DD:EE:FF`.
pub fn format_mac(mac: &[u8; 6]) -> MacString {
    let mut s = MacString::new();
    for (i, b) in mac.iter().enumerate() {
        if i > 0 {
            let _ = s.push(':');
        }
        let _ = write!(s, "{b:02X}");
    }
    s
}

// ── Connection ────────────────────────────────────────────────

#[derive(Debug)]
pub struct Connection {
    handle: ConnHandle,
    mac: [u8; 6],
    mac_str: MacString,
    user: Option<UserId>,
    pub(crate) pairing: PairingState,
}

impl Connection {
    fn new(handle: ConnHandle, mac: [u8; 6]) -> Self {
        Self {
            handle,
            mac,
            mac_str: format_mac(&mac),
            user: None,
            pairing: PairingState::Unauthenticated,
        }
    }

    pub fn handle(&self) -> ConnHandle {
        self.handle
    }

    pub fn mac(&self) -> [u8; 6] {
        self.mac
    }

    pub fn mac_str(&self) -> &str {
        &self.mac_str
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Selected user, falling back to the peer address.
    pub fn identity(&self) -> &str {
        self.user.as_deref().unwrap_or(&self.mac_str)
    }

    pub fn pairing(&self) -> &PairingState {
        &self.pairing
    }

    pub fn is_authenticated(&self) -> bool {
        self.pairing.is_authenticated()
    }

    /// Record the pinpad user.  Over-long identifiers are truncated.
    pub(crate) fn select_user(&mut self, user: &str) {
        let mut id = UserId::new();
        for ch in user.chars() {
            if id.push(ch).is_err() {
                break;
            }
        }
        self.user = Some(id);
    }
}

// ── Manager ───────────────────────────────────────────────────

pub struct ConnectionManager {
    connections: heapless::Vec<Connection, MAX_CONNECTIONS>,
    limit: usize,
    next_handle: u16,
    indicator: Option<Box<dyn StatusIndicator>>,
}

impl ConnectionManager {
    /// `limit` is clamped to `1..=MAX_CONNECTIONS`.
    pub fn new(limit: usize) -> Self {
        Self {
            connections: heapless::Vec::new(),
            limit: limit.clamp(1, MAX_CONNECTIONS),
            next_handle: 0,
            indicator: None,
        }
    }

    pub fn set_indicator(&mut self, indicator: Box<dyn StatusIndicator>) {
        self.indicator = Some(indicator);
        self.refresh_indicator();
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.connections.len() >= self.limit
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    pub fn get(&self, handle: ConnHandle) -> Option<&Connection> {
        self.connections.iter().find(|c| c.handle == handle)
    }

    pub(crate) fn get_mut(&mut self, handle: ConnHandle) -> Option<&mut Connection> {
        self.connections.iter_mut().find(|c| c.handle == handle)
    }

    /// Admit a new link under a freshly allocated handle.
    pub fn connect(&mut self, mac: [u8; 6]) -> Result<ConnHandle, GattError> {
        let handle = self.allocate_handle();
        self.connect_as(handle, mac)
    }

    /// Admit a new link under a handle chosen by the radio driver.
    pub fn connect_as(&mut self, handle: ConnHandle, mac: [u8; 6]) -> Result<ConnHandle, GattError> {
        if self.get(handle).is_some() {
            warn!("conn: handle {} already in use", handle);
            return Err(GattError::InvalidConnection);
        }
        if self.is_full() {
            warn!("conn: rejecting {} (limit {} reached)", format_mac(&mac), self.limit);
            return Err(GattError::InsufficientResources);
        }
        let conn = Connection::new(handle, mac);
        info!("conn: {} connected as {}", conn.mac_str, handle);
        // Capacity was checked against `limit`, which never exceeds the Vec capacity.
        let _ = self.connections.push(conn);
        self.refresh_indicator();
        Ok(handle)
    }

    /// Forget a link.  Returns the removed connection, if it existed.
    pub fn disconnect(&mut self, handle: ConnHandle) -> Option<Connection> {
        let pos = self.connections.iter().position(|c| c.handle == handle)?;
        let conn = self.connections.swap_remove(pos);
        info!("conn: {} ({}) disconnected", conn.mac_str, handle);
        self.refresh_indicator();
        Some(conn)
    }

    fn allocate_handle(&mut self) -> ConnHandle {
        loop {
            let candidate = ConnHandle(self.next_handle);
            self.next_handle = self.next_handle.wrapping_add(1);
            if self.get(candidate).is_none() {
                return candidate;
            }
        }
    }

    fn refresh_indicator(&mut self) {
        let active = !self.connections.is_empty();
        if let Some(indicator) = self.indicator.as_mut() {
            debug!("conn: status indicator {}", if active { "on" } else { "off" });
            indicator.set_active(active);
        }
    }
}
