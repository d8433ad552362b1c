//! Attribute registry: owns every service and characteristic.
//!
//! Services are registered once at startup.  [`AttributeRegistry::finalize`]
//! then assigns attribute handles sequentially, mirroring how the BLE stack
//! allocates them, and builds a handle-sorted index used for O(log n)
//! lookups during GATT traffic.  After finalisation the structure is frozen:
//! only characteristic values and subscriber sets change.
//!
//! ```text
//!  handle  attribute
//!  ──────  ───────────────────────────────
//!    1     service declaration  (0x1234)
//!    2     characteristic decl  (0x5678)
//!    3     characteristic value (0x5678)   ← AttrHandle used by on_read/on_write
//!    4     CCCD                 (only when Notify is permitted)
//! ```

use log::{debug, info};

use crate::config::ServiceConfig;
use crate::connection::{ConnHandle, MAX_CONNECTIONS};
use crate::error::{ConfigError, GattError, RegistryError};

use super::permissions::Permissions;
use super::uuid::Uuid;

// ── Capacity ──────────────────────────────────────────────────

/// Maximum number of services in the attribute table.
pub const MAX_SERVICES: usize = 8;

/// Maximum number of characteristics across all services.
pub const MAX_CHARACTERISTICS: usize = 32;

/// Maximum length of a characteristic value (ATT limit).
pub const MAX_VALUE_LEN: usize = 512;

/// Attribute handle as assigned at finalisation.
pub type AttrHandle = u16;

/// Index of a registered service, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceId(pub u8);

// ── Characteristic ────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Characteristic {
    uuid: Uuid,
    permissions: Permissions,
    value: Vec<u8>,
    subscribers: heapless::Vec<ConnHandle, MAX_CONNECTIONS>,
    decl_handle: AttrHandle,
    value_handle: AttrHandle,
    cccd_handle: Option<AttrHandle>,
}

impl Characteristic {
    fn new(uuid: Uuid, permissions: Permissions) -> Self {
        Self {
            uuid,
            permissions,
            value: Vec::new(),
            subscribers: heapless::Vec::new(),
            decl_handle: 0,
            value_handle: 0,
            cccd_handle: None,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn subscribers(&self) -> &[ConnHandle] {
        &self.subscribers
    }

    pub fn decl_handle(&self) -> AttrHandle {
        self.decl_handle
    }

    pub fn value_handle(&self) -> AttrHandle {
        self.value_handle
    }

    /// Client Characteristic Configuration descriptor, present only when
    /// Notify is permitted.
    pub fn cccd_handle(&self) -> Option<AttrHandle> {
        self.cccd_handle
    }

    pub(crate) fn set_value(&mut self, data: &[u8]) -> Result<(), GattError> {
        if data.len() > MAX_VALUE_LEN {
            return Err(GattError::InvalidValueLength);
        }
        self.value.clear();
        self.value.extend_from_slice(data);
        Ok(())
    }

    /// Adds `conn` to the subscriber set.  Subscribing twice is a no-op.
    pub(crate) fn subscribe(&mut self, conn: ConnHandle) -> Result<(), GattError> {
        if self.subscribers.contains(&conn) {
            return Ok(());
        }
        self.subscribers
            .push(conn)
            .map_err(|_| GattError::InsufficientResources)
    }

    /// Returns `true` if `conn` was subscribed.
    pub(crate) fn unsubscribe(&mut self, conn: ConnHandle) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|c| *c != conn);
        self.subscribers.len() != before
    }
}

// ── Service ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Service {
    uuid: Uuid,
    handle: AttrHandle,
    end_handle: AttrHandle,
    characteristics: Vec<Characteristic>,
}

impl Service {
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Service declaration handle.
    pub fn handle(&self) -> AttrHandle {
        self.handle
    }

    pub fn end_handle(&self) -> AttrHandle {
        self.end_handle
    }

    pub fn characteristics(&self) -> &[Characteristic] {
        &self.characteristics
    }
}

// ── Registry ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CharRef {
    service: u8,
    index: u8,
}

#[derive(Debug, Default)]
pub struct AttributeRegistry {
    services: Vec<Service>,
    /// Value handle → characteristic, sorted by handle.
    values: Vec<(AttrHandle, CharRef)>,
    /// CCCD handle → owning value handle, sorted by handle.
    cccds: Vec<(AttrHandle, AttrHandle)>,
    frozen: bool,
}

impl AttributeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service and its characteristics.
    ///
    /// Rejects duplicate service UUIDs, duplicate characteristic UUIDs within
    /// the service, and characteristics without permissions.  Nothing is
    /// registered when any check fails.
    pub fn register_service(&mut self, def: &ServiceConfig) -> Result<ServiceId, RegistryError> {
        if self.frozen {
            return Err(RegistryError::Frozen);
        }
        if self.services.iter().any(|s| s.uuid == def.uuid) {
            return Err(ConfigError::DuplicateUuid(def.uuid).into());
        }
        if self.services.len() >= MAX_SERVICES
            || self.characteristic_count() + def.characteristics.len() > MAX_CHARACTERISTICS
        {
            return Err(RegistryError::Full);
        }

        let mut characteristics: Vec<Characteristic> = Vec::with_capacity(def.characteristics.len());
        for c in &def.characteristics {
            if c.permissions.is_empty() {
                return Err(ConfigError::EmptyPermissions(c.uuid).into());
            }
            if characteristics.iter().any(|existing| existing.uuid == c.uuid) {
                return Err(ConfigError::DuplicateUuid(c.uuid).into());
            }
            characteristics.push(Characteristic::new(c.uuid, c.permissions));
        }

        let id = ServiceId(self.services.len() as u8);
        debug!(
            "registry: service {} registered with {} characteristic(s)",
            def.uuid,
            characteristics.len()
        );
        self.services.push(Service {
            uuid: def.uuid,
            handle: 0,
            end_handle: 0,
            characteristics,
        });
        Ok(id)
    }

    /// Assign attribute handles and freeze the registry.
    pub fn finalize(&mut self) -> Result<(), RegistryError> {
        if self.frozen {
            return Err(RegistryError::Frozen);
        }

        let mut next: AttrHandle = 1;
        self.values.clear();
        self.cccds.clear();

        for (si, service) in self.services.iter_mut().enumerate() {
            service.handle = next;
            next += 1;
            for (ci, c) in service.characteristics.iter_mut().enumerate() {
                c.decl_handle = next;
                c.value_handle = next + 1;
                next += 2;
                self.values.push((
                    c.value_handle,
                    CharRef {
                        service: si as u8,
                        index: ci as u8,
                    },
                ));
                if c.permissions.contains(Permissions::NOTIFY) {
                    c.cccd_handle = Some(next);
                    self.cccds.push((next, c.value_handle));
                    next += 1;
                }
            }
            service.end_handle = next - 1;
        }

        // Handles are allocated in increasing order, so both tables are
        // already sorted.
        self.frozen = true;
        info!(
            "registry: finalised {} service(s), {} characteristic(s), last handle {}",
            self.services.len(),
            self.values.len(),
            next - 1
        );
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn characteristic_count(&self) -> usize {
        self.services.iter().map(|s| s.characteristics.len()).sum()
    }

    fn lookup(&self, attr: AttrHandle) -> Option<CharRef> {
        self.values
            .binary_search_by_key(&attr, |(h, _)| *h)
            .ok()
            .map(|i| self.values[i].1)
    }

    /// Characteristic whose value handle is `attr`.
    pub fn characteristic(&self, attr: AttrHandle) -> Option<&Characteristic> {
        let r = self.lookup(attr)?;
        self.services
            .get(r.service as usize)?
            .characteristics
            .get(r.index as usize)
    }

    pub(crate) fn characteristic_mut(&mut self, attr: AttrHandle) -> Option<&mut Characteristic> {
        let r = self.lookup(attr)?;
        self.services
            .get_mut(r.service as usize)?
            .characteristics
            .get_mut(r.index as usize)
    }

    /// Value handle owning the CCCD at `cccd`.
    pub fn value_handle_for_cccd(&self, cccd: AttrHandle) -> Option<AttrHandle> {
        self.cccds
            .binary_search_by_key(&cccd, |(h, _)| *h)
            .ok()
            .map(|i| self.cccds[i].1)
    }

    /// Value handle of characteristic `chr` inside service `svc`.
    pub fn find_by_uuid(&self, svc: Uuid, chr: Uuid) -> Option<AttrHandle> {
        if !self.frozen {
            return None;
        }
        self.services
            .iter()
            .find(|s| s.uuid == svc)?
            .characteristics
            .iter()
            .find(|c| c.uuid == chr)
            .map(|c| c.value_handle)
    }

    /// Value handle of the first characteristic with UUID `chr`, any service.
    pub fn find_characteristic_uuid(&self, chr: Uuid) -> Option<AttrHandle> {
        if !self.frozen {
            return None;
        }
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.uuid == chr)
            .map(|c| c.value_handle)
    }

    /// Remove `conn` from every subscriber set.  Returns how many
    /// subscriptions were released.
    pub(crate) fn unsubscribe_all(&mut self, conn: ConnHandle) -> usize {
        self.services
            .iter_mut()
            .flat_map(|s| s.characteristics.iter_mut())
            .map(|c| c.unsubscribe(conn))
            .filter(|released| *released)
            .count()
    }
}
