//! Application core: the GATT server and its hexagonal boundary.
//!
//! The server logic lives in [`service`]; everything it needs from the
//! outside (radio, GPIO, clock) comes through the traits in [`ports`].
//! Automations hook in through [`dispatch`], and other tasks reach the
//! server through the [`inbox`].

pub mod commands;
pub mod dispatch;
pub mod events;
pub mod inbox;
pub mod ports;
pub mod service;
