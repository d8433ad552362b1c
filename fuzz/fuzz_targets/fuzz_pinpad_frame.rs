//! Fuzz target: `pairing::frame::parse` (pinpad write path)
//!
//! cargo fuzz run fuzz_pinpad_frame

#![no_main]

use libfuzzer_sys::fuzz_target;
use nimble_server::connection::MAX_USER_LEN;
use nimble_server::pairing::frame::{self, MAX_COMMAND_LEN};

fuzz_target!(|data: &[u8]| {
    if let Ok(f) = frame::parse(data) {
        assert!(!f.user.is_empty() && f.user.len() <= MAX_USER_LEN);
        assert!(!f.passcode.is_empty());
        assert!(f.command.len() <= MAX_COMMAND_LEN);
        assert!(!f.user.contains(':'));
    }
});
