//! Port traits: the hexagonal boundary between the GATT core and the outside world.
//!
//! ```text
//!   BLE stack ──▶ GattServer (domain) ──▶ RadioPort ──▶ BLE stack
//!                        │
//!                        ├──▶ StatusIndicator (GPIO)
//!                        └──▶ Clock
//! ```
//!
//! Adapters in [`crate::adapters`] implement these for ESP-IDF and for
//! host-side simulation.

use crate::connection::ConnHandle;
use crate::error::{GattError, RadioError};
use crate::gatt::{AttrHandle, Service};

// ───────────────────────────────────────────────────────────────
// Radio port (driven adapter: domain → BLE stack)
// ───────────────────────────────────────────────────────────────

/// Requests the core makes of the BLE stack.  None of these block; failures
/// are reported, never retried here.
pub trait RadioPort {
    /// Publish the finalised attribute table.  Called once, at start.
    fn register_attributes(&mut self, services: &[Service]) -> Result<(), RadioError>;

    fn start_advertising(&mut self) -> Result<(), RadioError>;

    fn stop_advertising(&mut self) -> Result<(), RadioError>;

    /// Tear down a link.
    fn disconnect(&mut self, conn: ConnHandle) -> Result<(), RadioError>;

    /// Push a notification for `attr` to one subscriber.
    fn notify(&mut self, conn: ConnHandle, attr: AttrHandle, value: &[u8]) -> Result<(), RadioError>;

    /// Answer a queued read or write request.
    ///
    /// Stacks that answer requests synchronously from their callbacks can
    /// rely on this default.
    fn send_response(
        &mut self,
        conn: ConnHandle,
        request: u32,
        attr: AttrHandle,
        outcome: Result<&[u8], GattError>,
    ) -> Result<(), RadioError> {
        let _ = (conn, request, attr, outcome);
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Status indicator port (domain → GPIO)
// ───────────────────────────────────────────────────────────────

/// Binary output lit while at least one client is connected.
pub trait StatusIndicator {
    fn set_active(&mut self, active: bool);
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

pub trait Clock {
    /// Monotonic milliseconds since boot.
    fn uptime_ms(&self) -> u64;

    /// Seconds since the Unix epoch, or `None` until the wall clock is set.
    fn unix_time_secs(&self) -> Option<u64>;
}
