//! nimble_server firmware library.
//!
//! BLE GATT server with a passcode pairing gate.  Exposes every domain
//! module for integration testing.  All ESP-IDF-specific code is guarded
//! by `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod advertising;
pub mod app;
pub mod config;
pub mod connection;
pub mod error;
pub mod gatt;
pub mod pairing;

pub use app::service::{GattServer, ServerState};
pub use config::ServerConfig;
pub use error::{Error, Result};
