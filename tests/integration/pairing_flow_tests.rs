//! Pairing gate end-to-end: challenge, rejection, lockout, cooldown,
//! pinpad frames and one-time-code modes.

use nimble_server::error::{Error, GattError, PairingError};
use nimble_server::gatt::Uuid;
use nimble_server::pairing::otp;
use nimble_server::adapters::radio::RadioCall;
use nimble_server::ServerState;

use crate::mock_ports::{Harness, BASIC, MAC, MAC_STR};

const PINPAD: &str = r#"{
    "services": [ { "uuid": "0x1234", "characteristics": [
        { "uuid": "0x5678", "permissions": ["read", "write"] },
        { "uuid": "0x2000", "permissions": ["write"] } ] } ],
    "secret_passcode": "4242",
    "pinpad_uuid": "0x2000"
}"#;

fn attr(h: &Harness, chr: u16) -> u16 {
    h.server
        .value_handle(Uuid::Uuid16(0x1234), Uuid::Uuid16(chr))
        .expect("characteristic registered")
}

#[test]
fn gated_write_opens_challenge_once() {
    let mut h = Harness::start(BASIC);
    let conn = h.server.on_connect(MAC).unwrap();
    let value = attr(&h, 0x5678);

    for _ in 0..2 {
        assert_eq!(
            h.server.on_write(conn, value, b"open"),
            Err(GattError::Pairing(PairingError::NotAuthenticated))
        );
    }
    assert_eq!(
        h.take_events(),
        vec![format!("connected:{MAC_STR}"), format!("user:{MAC_STR}")],
        "user_selected fires only when the challenge opens"
    );
    assert_eq!(h.server.connection(conn).unwrap().pairing().pending_command(), "open");
}

#[test]
fn rejection_reports_pending_command() {
    let mut h = Harness::start(BASIC);
    let conn = h.server.on_connect(MAC).unwrap();
    let value = attr(&h, 0x5678);
    let _ = h.server.on_write(conn, value, b"unlock");
    h.take_events();

    assert_eq!(
        h.server.submit_passcode(conn, b"0000"),
        Err(Error::Pairing(PairingError::AuthenticationFailed))
    );
    assert_eq!(h.take_events(), vec![format!("rejected:{MAC_STR}:unlock")]);
    assert!(h.server.is_rejected());
    assert_eq!(h.server.last_command(), "unlock");
}

#[test]
fn lockout_disconnects_and_invalidates_handle() {
    let mut h = Harness::start(BASIC);
    let conn = h.server.on_connect(MAC).unwrap();
    let value = attr(&h, 0x5678);

    assert!(h.server.submit_passcode(conn, b"1").is_err());
    assert!(h.server.submit_passcode(conn, b"2").is_err());
    assert_eq!(
        h.server.submit_passcode(conn, b"3"),
        Err(Error::Pairing(PairingError::TooManyAttempts))
    );

    assert_eq!(h.server.radio().count(&RadioCall::Disconnect(conn)), 1);
    assert!(h.server.connection(conn).is_none());
    assert_eq!(h.server.on_read(conn, value), Err(GattError::InvalidConnection));
    assert_eq!(
        h.server.on_write(conn, value, b"x"),
        Err(GattError::InvalidConnection)
    );
    assert_eq!(
        h.server.submit_passcode(conn, b"4242"),
        Err(Error::Gatt(GattError::InvalidConnection))
    );
    // Last client gone.
    assert_eq!(h.server.state(), ServerState::Idle);
}

#[test]
fn cooldown_refuses_early_retry() {
    let json = BASIC.replace(
        r#""secret_passcode": "4242""#,
        r#""secret_passcode": "4242", "rejection_cooldown_ms": 1000"#,
    );
    let mut h = Harness::start(&json);
    let conn = h.server.on_connect(MAC).unwrap();
    h.take_events();

    assert!(h.server.submit_passcode(conn, b"bad").is_err());
    h.clock.advance_ms(999);
    assert_eq!(
        h.server.submit_passcode(conn, b"4242"),
        Err(Error::Pairing(PairingError::CoolingDown))
    );
    h.clock.advance_ms(1);
    assert_eq!(h.server.submit_passcode(conn, b"4242"), Ok(()));

    let events = h.take_events();
    assert_eq!(events.len(), 2, "cooldown refusals fire no trigger: {events:?}");
    assert!(events[1].starts_with("accepted:"));
}

#[test]
fn pinpad_frame_accepts_and_authenticates() {
    let mut h = Harness::start(PINPAD);
    let conn = h.server.on_connect(MAC).unwrap();
    let pinpad = attr(&h, 0x2000);
    let value = attr(&h, 0x5678);
    h.take_events();

    assert_eq!(h.server.on_write(conn, pinpad, b"alice:4242:open"), Ok(()));
    assert_eq!(h.take_events(), vec!["user:alice", "accepted:alice:open"]);
    assert!(h.server.is_accepted());
    assert_eq!(h.server.last_user(), "alice");
    assert_eq!(h.server.last_command(), "open");

    h.server.on_write(conn, value, b"hello").unwrap();
    assert_eq!(h.take_events(), vec![format!("command:{MAC_STR}:hello")]);
}

#[test]
fn wrong_pinpad_frame_revokes_authentication() {
    let mut h = Harness::start(PINPAD);
    let conn = h.server.on_connect(MAC).unwrap();
    let pinpad = attr(&h, 0x2000);
    let value = attr(&h, 0x5678);
    h.server.on_write(conn, pinpad, b"alice:4242").unwrap();
    h.take_events();

    assert_eq!(
        h.server.on_write(conn, pinpad, b"bob:0000:lock"),
        Err(GattError::Pairing(PairingError::AuthenticationFailed))
    );
    assert_eq!(h.take_events(), vec!["user:bob", "rejected:bob:lock"]);
    assert_eq!(
        h.server.on_write(conn, value, b"hello"),
        Err(GattError::Pairing(PairingError::NotAuthenticated))
    );
}

#[test]
fn malformed_pinpad_frame() {
    let mut h = Harness::start(PINPAD);
    let conn = h.server.on_connect(MAC).unwrap();
    let pinpad = attr(&h, 0x2000);
    h.take_events();

    assert_eq!(
        h.server.on_write(conn, pinpad, b"no-separator"),
        Err(GattError::Pairing(PairingError::MalformedFrame))
    );
    assert!(h.take_events().is_empty());
}

#[test]
fn hotp_codes_are_single_use() {
    let json = BASIC.replace(
        r#""secret_passcode": "4242""#,
        r#""secret_passcode": "4242", "security_mode": "hotp""#,
    );
    let mut h = Harness::start(&json);
    let conn = h.server.on_connect(MAC).unwrap();
    let code = otp::format_code(otp::hotp(b"4242", 0, 6), 6);

    assert_eq!(h.server.submit_passcode(conn, code.as_bytes()), Ok(()));
    assert_eq!(
        h.server.submit_passcode(conn, code.as_bytes()),
        Err(Error::Pairing(PairingError::AuthenticationFailed))
    );
}

#[test]
fn totp_needs_wall_clock() {
    let json = BASIC.replace(
        r#""secret_passcode": "4242""#,
        r#""secret_passcode": "4242", "security_mode": "totp""#,
    );
    let mut h = Harness::start(&json);
    let conn = h.server.on_connect(MAC).unwrap();
    h.take_events();

    assert_eq!(
        h.server.submit_passcode(conn, b"123456"),
        Err(Error::Pairing(PairingError::ClockUnavailable))
    );
    assert!(h.take_events().is_empty());

    h.clock.set_unix(1_700_000_000);
    let code = otp::format_code(otp::totp(b"4242", 1_700_000_000, 6), 6);
    assert_eq!(h.server.submit_passcode(conn, code.as_bytes()), Ok(()));
}
