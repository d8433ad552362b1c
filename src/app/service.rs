//! GATT server facade: the hexagonal core.
//!
//! [`GattServer`] owns the attribute registry, the connection table, the
//! pairing gate and the advertising controller.  The BLE stack calls in
//! through `on_*` methods (directly, or via [`drain`](GattServer::drain)
//! when its callbacks run in another task); requests back to the stack go
//! out through the [`RadioPort`].
//!
//! ```text
//!  BLE stack ──▶ ┌──────────────────────────────┐ ──▶ RadioPort
//!                │          GattServer          │
//!  ActionQueue ─▶│ registry · gate · conns · adv│ ──▶ Triggers
//!                └──────────────────────────────┘
//! ```

use log::{debug, info, warn};

use crate::adapters::utils::printable_preview;
use crate::advertising::{AdvertisingController, AdvertisingState};
use crate::config::{ServerConfig, ServiceConfig};
use crate::connection::{format_mac, ConnHandle, Connection, ConnectionManager};
use crate::error::{Error, GattError, PairingError, RadioError, RegistryError, Result};
use crate::gatt::registry::MAX_VALUE_LEN;
use crate::gatt::{AttrHandle, AttributeRegistry, Characteristic, Permissions, ServiceId, Uuid};
use crate::pairing::{frame, PairingGate, PairingState, Rejection};

use super::commands::{Inbound, RadioEvent, ServerAction};
use super::dispatch::Triggers;
use super::events::ServerEvent;
use super::inbox::ActionQueue;
use super::ports::{Clock, RadioPort, StatusIndicator};

/// Component-level state, mirroring the last pairing verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not started yet.
    Stopped,
    /// Serving, no verdict since the last client left.
    Idle,
    PinAccepted,
    PinRejected,
}

// ───────────────────────────────────────────────────────────────
// GattServer
// ───────────────────────────────────────────────────────────────

pub struct GattServer<R: RadioPort, C: Clock> {
    registry: AttributeRegistry,
    connections: ConnectionManager,
    gate: PairingGate,
    advertising: AdvertisingController,
    triggers: Triggers,
    radio: R,
    clock: C,
    pinpad_uuid: Option<Uuid>,
    pinpad_attr: Option<AttrHandle>,
    start_advertising: bool,
    stop_advertising: bool,
    state: ServerState,
    last_user: String,
    last_command: String,
}

impl<R: RadioPort, C: Clock> GattServer<R, C> {
    /// Build the server and register every configured service.
    ///
    /// Does **not** touch the radio; call [`start`](Self::start) next.
    pub fn new(config: &ServerConfig, radio: R, clock: C) -> Result<Self> {
        config.validate()?;
        let mut registry = AttributeRegistry::new();
        for svc in &config.services {
            registry.register_service(svc)?;
        }
        Ok(Self {
            registry,
            connections: ConnectionManager::new(config.max_connections as usize),
            gate: PairingGate::new(config),
            advertising: AdvertisingController::new(),
            triggers: Triggers::new(),
            radio,
            clock,
            pinpad_uuid: config.pinpad_uuid,
            pinpad_attr: None,
            start_advertising: config.start_advertising,
            stop_advertising: config.stop_advertising,
            state: ServerState::Stopped,
            last_user: String::new(),
            last_command: String::new(),
        })
    }

    // ── Setup ─────────────────────────────────────────────────

    /// Register an additional service.  Only valid before [`start`](Self::start).
    pub fn register_service(&mut self, def: &ServiceConfig) -> Result<ServiceId> {
        Ok(self.registry.register_service(def)?)
    }

    pub fn triggers_mut(&mut self) -> &mut Triggers {
        &mut self.triggers
    }

    pub fn set_status_indicator(&mut self, indicator: Box<dyn StatusIndicator>) {
        self.connections.set_indicator(indicator);
    }

    /// Freeze the attribute table, publish it to the radio and apply the
    /// startup advertising flags (start first, then stop).
    ///
    /// Errors only if the table cannot be published.  Once it is, the server
    /// is serving: an advertising failure is logged and left for the caller
    /// to retry through [`start_advertising`](Self::start_advertising).
    pub fn start(&mut self) -> Result<()> {
        self.registry.finalize()?;
        self.radio.register_attributes(self.registry.services())?;
        self.pinpad_attr = self
            .pinpad_uuid
            .and_then(|u| self.registry.find_characteristic_uuid(u));
        self.state = ServerState::Idle;
        info!(
            "server: started ({} service(s), {} characteristic(s))",
            self.registry.services().len(),
            self.registry.characteristic_count()
        );

        if self.start_advertising {
            if let Err(e) = self.start_advertising() {
                warn!("server: startup advertising failed: {}", e);
            }
        }
        if self.stop_advertising {
            if let Err(e) = self.stop_advertising() {
                warn!("server: startup advertising stop failed: {}", e);
            }
        }
        Ok(())
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != ServerState::Stopped
    }

    pub fn is_accepted(&self) -> bool {
        self.state == ServerState::PinAccepted
    }

    pub fn is_rejected(&self) -> bool {
        self.state == ServerState::PinRejected
    }

    pub fn last_user(&self) -> &str {
        &self.last_user
    }

    pub fn last_command(&self) -> &str {
        &self.last_command
    }

    pub fn advertising_state(&self) -> AdvertisingState {
        self.advertising.state()
    }

    pub fn registry(&self) -> &AttributeRegistry {
        &self.registry
    }

    pub fn connection(&self, conn: ConnHandle) -> Option<&Connection> {
        self.connections.get(conn)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Value handle of characteristic `chr` in service `svc`.
    pub fn value_handle(&self, svc: Uuid, chr: Uuid) -> Option<AttrHandle> {
        self.registry.find_by_uuid(svc, chr)
    }

    /// Characteristic at `attr`, as seen by connection `conn`.
    pub fn find_characteristic(&self, conn: ConnHandle, attr: AttrHandle) -> Option<&Characteristic> {
        self.connections.get(conn)?;
        self.registry.characteristic(attr)
    }

    // ── Connection lifecycle ──────────────────────────────────

    /// A central connected; the server picks the handle.
    pub fn on_connect(&mut self, mac: [u8; 6]) -> Result<ConnHandle> {
        self.admit(None, mac)
    }

    /// A central connected under a handle chosen by the radio.
    pub fn on_connect_as(&mut self, conn: ConnHandle, mac: [u8; 6]) -> Result<ConnHandle> {
        self.admit(Some(conn), mac)
    }

    fn admit(&mut self, conn: Option<ConnHandle>, mac: [u8; 6]) -> Result<ConnHandle> {
        if self.state == ServerState::Stopped {
            return Err(RadioError::NotReady.into());
        }
        let admitted = match conn {
            Some(h) => self.connections.connect_as(h, mac),
            None => self.connections.connect(mac),
        };
        let handle = match admitted {
            Ok(h) => h,
            Err(e) => {
                if let Some(h) = conn {
                    if let Err(re) = self.radio.disconnect(h) {
                        warn!("server: could not drop refused link {}: {}", h, re);
                    }
                }
                return Err(e.into());
            }
        };

        self.advertising.link_established();
        self.sync_advertising();
        let mac_str = format_mac(&mac);
        self.triggers.fire(&ServerEvent::ClientConnected { mac: &mac_str });
        Ok(handle)
    }

    /// The radio reported a link loss.  Releases every subscription the
    /// link held.
    pub fn on_disconnect(&mut self, conn: ConnHandle) -> Result<()> {
        self.connections
            .disconnect(conn)
            .ok_or(GattError::InvalidConnection)?;
        let released = self.registry.unsubscribe_all(conn);
        if released > 0 {
            debug!("server: {} released {} subscription(s)", conn, released);
        }
        if self.connections.is_empty() && self.state != ServerState::Stopped {
            self.state = ServerState::Idle;
        }
        self.sync_advertising();
        Ok(())
    }

    /// Tear a link down from our side.
    pub fn disconnect(&mut self, conn: ConnHandle) -> Result<()> {
        if self.connections.get(conn).is_none() {
            return Err(GattError::InvalidConnection.into());
        }
        if let Err(e) = self.radio.disconnect(conn) {
            warn!("server: radio disconnect of {} failed: {}", conn, e);
        }
        self.on_disconnect(conn)
    }

    // ── GATT requests ─────────────────────────────────────────

    /// Current value of `attr`.  Not gated by pairing.
    pub fn on_read(&self, conn: ConnHandle, attr: AttrHandle) -> core::result::Result<&[u8], GattError> {
        self.connections.get(conn).ok_or(GattError::InvalidConnection)?;
        let chr = self.registry.characteristic(attr).ok_or(GattError::InvalidHandle)?;
        if !chr.permissions().contains(Permissions::READ) {
            debug!("gatt: read of {} from {} not permitted", attr, conn);
            return Err(GattError::ReadNotPermitted);
        }
        debug!("gatt: read {} by {} ({} bytes)", attr, conn, chr.value().len());
        Ok(chr.value())
    }

    /// Write `data` to `attr`.
    ///
    /// Writes to a CCCD toggle the subscription; writes to the pinpad
    /// characteristic are handled as pinpad frames.  Any other write must
    /// come from an authenticated link: an unauthenticated one is
    /// challenged instead and gets [`PairingError::NotAuthenticated`].
    pub fn on_write(
        &mut self,
        conn: ConnHandle,
        attr: AttrHandle,
        data: &[u8],
    ) -> core::result::Result<(), GattError> {
        let Some(connection) = self.connections.get(conn) else {
            return Err(GattError::InvalidConnection);
        };

        if let Some(value_attr) = self.registry.value_handle_for_cccd(attr) {
            let enable = data.first().is_some_and(|b| b & 0x01 != 0);
            return if enable {
                self.on_subscribe(conn, value_attr)
            } else {
                self.on_unsubscribe(conn, value_attr)
            };
        }

        let chr = self.registry.characteristic(attr).ok_or(GattError::InvalidHandle)?;
        if !chr.permissions().contains(Permissions::WRITE) {
            warn!("gatt: write to {} from {} not permitted", attr, conn);
            return Err(GattError::WriteNotPermitted);
        }
        if data.len() > MAX_VALUE_LEN {
            return Err(GattError::InvalidValueLength);
        }
        if Some(attr) == self.pinpad_attr {
            return self.on_pinpad_write(conn, data);
        }

        let cmd = String::from_utf8_lossy(data).into_owned();
        if !connection.is_authenticated() {
            return Err(self.challenge(conn, attr, &cmd).into());
        }

        self.registry
            .characteristic_mut(attr)
            .ok_or(GattError::InvalidHandle)?
            .set_value(data)?;
        debug!(
            "gatt: write {} by {}: \"{}\"",
            attr,
            conn,
            printable_preview(data, 32)
        );

        let mac = format_mac(&connection_mac(&self.connections, conn)?);
        self.last_command.clone_from(&cmd);
        self.triggers.fire(&ServerEvent::UserCommandReceived { mac: &mac, cmd: &cmd });
        Ok(())
    }

    fn challenge(&mut self, conn: ConnHandle, attr: AttrHandle, cmd: &str) -> PairingError {
        let Some(connection) = self.connections.get_mut(conn) else {
            return PairingError::NotAuthenticated;
        };
        let first = matches!(connection.pairing, PairingState::Unauthenticated);
        let err = self.gate.challenge(&mut connection.pairing, cmd);
        warn!("gatt: write to {} from {} refused, not authenticated", attr, conn);
        if first {
            let user = connection.identity().to_owned();
            self.triggers.fire(&ServerEvent::UserSelected { user: &user });
        }
        err
    }

    pub fn on_subscribe(&mut self, conn: ConnHandle, attr: AttrHandle) -> core::result::Result<(), GattError> {
        self.connections.get(conn).ok_or(GattError::InvalidConnection)?;
        let chr = self
            .registry
            .characteristic_mut(attr)
            .ok_or(GattError::InvalidHandle)?;
        if !chr.permissions().contains(Permissions::NOTIFY) {
            return Err(GattError::NotifyNotPermitted);
        }
        chr.subscribe(conn)?;
        debug!("gatt: {} subscribed to {}", conn, attr);
        Ok(())
    }

    pub fn on_unsubscribe(&mut self, conn: ConnHandle, attr: AttrHandle) -> core::result::Result<(), GattError> {
        self.connections.get(conn).ok_or(GattError::InvalidConnection)?;
        let chr = self
            .registry
            .characteristic_mut(attr)
            .ok_or(GattError::InvalidHandle)?;
        if chr.unsubscribe(conn) {
            debug!("gatt: {} unsubscribed from {}", conn, attr);
        }
        Ok(())
    }

    // ── Pairing ───────────────────────────────────────────────

    /// Verify a passcode for `conn`.  Fires `on_pinpad_accepted` or
    /// `on_pinpad_rejected` with the command captured by the challenge.
    /// Too many wrong codes drop the link.
    pub fn submit_passcode(&mut self, conn: ConnHandle, passcode: &[u8]) -> Result<()> {
        self.verify(conn, passcode, None)
    }

    /// Record the user identity for `conn` and fire `on_user_selected`.
    pub fn select_user(&mut self, conn: ConnHandle, user: &str) -> Result<()> {
        let connection = self
            .connections
            .get_mut(conn)
            .ok_or(GattError::InvalidConnection)?;
        connection.select_user(user);
        let user = connection.identity().to_owned();
        self.last_user.clone_from(&user);
        self.triggers.fire(&ServerEvent::UserSelected { user: &user });
        Ok(())
    }

    /// Handle a `user:passcode[:command]` frame written to the pinpad.
    pub fn on_pinpad_write(&mut self, conn: ConnHandle, data: &[u8]) -> core::result::Result<(), GattError> {
        let frame = frame::parse(data).map_err(|e| {
            warn!("pinpad: malformed frame from {}", conn);
            GattError::from(e)
        })?;
        self.select_user(conn, frame.user).map_err(gatt_error)?;
        self.verify(conn, frame.passcode.as_bytes(), Some(frame.command))
            .map_err(gatt_error)
    }

    fn verify(&mut self, conn: ConnHandle, passcode: &[u8], command: Option<&str>) -> Result<()> {
        let Some(connection) = self.connections.get_mut(conn) else {
            return Err(GattError::InvalidConnection.into());
        };
        let cmd = command
            .unwrap_or_else(|| connection.pairing.pending_command())
            .to_owned();
        let outcome = self.gate.submit(&mut connection.pairing, passcode, &self.clock);
        let user = connection.identity().to_owned();

        match outcome {
            Ok(()) => {
                info!("pairing: {} accepted on {}", user, conn);
                self.record_verdict(ServerState::PinAccepted, &user, &cmd);
                self.triggers
                    .fire(&ServerEvent::PinpadAccepted { user: &user, cmd: &cmd });
                Ok(())
            }
            Err(Rejection { error, attempts }) => {
                if matches!(
                    error,
                    PairingError::AuthenticationFailed | PairingError::TooManyAttempts
                ) {
                    warn!("pairing: {} rejected on {} (attempt {})", user, conn, attempts);
                    self.record_verdict(ServerState::PinRejected, &user, &cmd);
                    self.triggers
                        .fire(&ServerEvent::PinpadRejected { user: &user, cmd: &cmd });
                }
                if error == PairingError::TooManyAttempts {
                    warn!(
                        "pairing: {} reached {} attempts, disconnecting",
                        conn,
                        self.gate.max_attempts()
                    );
                    if let Err(e) = self.disconnect(conn) {
                        warn!("pairing: forced disconnect of {} failed: {}", conn, e);
                    }
                }
                Err(error.into())
            }
        }
    }

    fn record_verdict(&mut self, state: ServerState, user: &str, cmd: &str) {
        self.state = state;
        user.clone_into(&mut self.last_user);
        cmd.clone_into(&mut self.last_command);
    }

    // ── Outbound actions ──────────────────────────────────────

    /// Update a Notify characteristic and push it to every subscriber.
    /// Returns how many subscribers the radio accepted it for.
    pub fn notify(&mut self, attr: AttrHandle, data: &[u8]) -> Result<usize> {
        let chr = self
            .registry
            .characteristic_mut(attr)
            .ok_or(GattError::InvalidHandle)?;
        if !chr.permissions().contains(Permissions::NOTIFY) {
            return Err(GattError::NotifyNotPermitted.into());
        }
        chr.set_value(data)?;
        let subscribers = chr.subscribers().to_vec();

        let mut reached = 0;
        for conn in subscribers {
            match self.radio.notify(conn, attr, data) {
                Ok(()) => reached += 1,
                Err(e) => warn!("gatt: notify {} to {} failed: {}", attr, conn, e),
            }
        }
        debug!("gatt: notified {} subscriber(s) of {}", reached, attr);
        Ok(reached)
    }

    /// Request advertising.  A repeat request is a no-op.
    pub fn start_advertising(&mut self) -> core::result::Result<(), RadioError> {
        self.advertising
            .start(&mut self.radio, self.connections.is_full())
            .map(|_| ())
    }

    /// Stop advertising and clear the intent.  A repeat request is a no-op.
    pub fn stop_advertising(&mut self) -> core::result::Result<(), RadioError> {
        self.advertising.stop(&mut self.radio).map(|_| ())
    }

    fn sync_advertising(&mut self) {
        // Failures are logged by the controller; the next sync retries.
        let _ = self
            .advertising
            .sync(&mut self.radio, self.connections.is_full());
    }

    pub fn handle_action(&mut self, action: ServerAction) -> Result<()> {
        match action {
            ServerAction::StartAdvertising => Ok(self.start_advertising()?),
            ServerAction::StopAdvertising => Ok(self.stop_advertising()?),
            ServerAction::Notify { attr, value } => self.notify(attr, &value).map(|_| ()),
            ServerAction::Disconnect(conn) => self.disconnect(conn),
        }
    }

    // ── Dispatch loop ─────────────────────────────────────────

    /// Process everything queued in `queue`.  Returns the number handled.
    pub fn drain(&mut self, queue: &ActionQueue) -> usize {
        let mut handled = 0;
        while let Some(msg) = queue.take() {
            handled += 1;
            match msg {
                Inbound::Action(action) => {
                    if let Err(e) = self.handle_action(action) {
                        warn!("server: action failed: {}", e);
                    }
                }
                Inbound::Radio(event) => self.handle_radio_event(event),
            }
        }
        handled
    }

    fn handle_radio_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::Connected { conn, mac } => {
                if let Err(e) = self.on_connect_as(conn, mac) {
                    warn!("server: connect {} refused: {}", conn, e);
                }
            }
            RadioEvent::Disconnected { conn } => {
                if let Err(e) = self.on_disconnect(conn) {
                    debug!("server: disconnect {}: {}", conn, e);
                }
            }
            RadioEvent::Read {
                conn,
                attr,
                request,
                offset,
            } => {
                // Read Blob continues a long value from `offset`.
                let outcome = self.on_read(conn, attr).and_then(|v| {
                    v.get(usize::from(offset)..)
                        .map(<[u8]>::to_vec)
                        .ok_or(GattError::InvalidOffset)
                });
                self.respond(conn, request, attr, outcome.as_deref().map_err(|e| *e));
            }
            RadioEvent::Write {
                conn,
                attr,
                value,
                request,
            } => {
                let outcome = self.on_write(conn, attr, &value);
                if let Some(request) = request {
                    self.respond(conn, request, attr, outcome.map(|()| &[][..]));
                }
            }
        }
    }

    fn respond(
        &mut self,
        conn: ConnHandle,
        request: u32,
        attr: AttrHandle,
        outcome: core::result::Result<&[u8], GattError>,
    ) {
        if let Err(e) = self.radio.send_response(conn, request, attr, outcome) {
            warn!("server: response to {} failed: {}", conn, e);
        }
    }
}

fn connection_mac(
    connections: &ConnectionManager,
    conn: ConnHandle,
) -> core::result::Result<[u8; 6], GattError> {
    connections
        .get(conn)
        .map(Connection::mac)
        .ok_or(GattError::InvalidConnection)
}

/// Narrow a server error to what the BLE stack can be told.
fn gatt_error(e: Error) -> GattError {
    match e {
        Error::Gatt(g) => g,
        Error::Pairing(p) => GattError::Pairing(p),
        Error::Registry(RegistryError::Full) => GattError::InsufficientResources,
        Error::Config(_) | Error::Registry(_) | Error::Radio(_) => GattError::InvalidHandle,
    }
}
