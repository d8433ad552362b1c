//! Fuzz target: `ServerConfig::from_json`
//!
//! Feeds arbitrary UTF-8 text to the configuration loader.
//!
//! Invariants checked:
//! - No panics under any input
//! - An accepted configuration passes `validate()` again
//! - An accepted configuration builds a server and starts it
//!
//! cargo fuzz run fuzz_config_json

#![no_main]

use libfuzzer_sys::fuzz_target;
use nimble_server::adapters::radio::SimRadio;
use nimble_server::adapters::time::SystemClock;
use nimble_server::{GattServer, ServerConfig};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = ServerConfig::from_json(text) else {
        return;
    };

    assert!(config.validate().is_ok(), "loaded config must stay valid");

    // Capacity limits may still refuse the table; that is an error, not a panic.
    if let Ok(mut server) = GattServer::new(&config, SimRadio::new(), SystemClock::new()) {
        let _ = server.start();
    }
});
