//! GATT attribute model: UUIDs, permission flags and the attribute registry.

pub mod permissions;
pub mod registry;
pub mod uuid;

pub use permissions::Permissions;
pub use registry::{AttrHandle, AttributeRegistry, Characteristic, Service, ServiceId};
pub use uuid::Uuid;
