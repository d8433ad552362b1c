//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below exercises one subsystem through the public server API
//! against simulated ports.  All tests run on the host.

mod mock_ports;
mod pairing_flow_tests;
mod server_tests;
