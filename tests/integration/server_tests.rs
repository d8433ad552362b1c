//! Server lifecycle: subscriptions, status indicator, advertising under a
//! connection limit, the action queue and the component state.

use nimble_server::adapters::radio::RadioCall;
use nimble_server::advertising::AdvertisingState;
use nimble_server::app::commands::{PduValue, RadioEvent, ServerAction};
use nimble_server::app::inbox::ActionQueue;
use nimble_server::connection::ConnHandle;
use nimble_server::error::{Error, GattError};
use nimble_server::gatt::Uuid;
use nimble_server::ServerState;

use crate::mock_ports::{Harness, IndicatorLog, BASIC, MAC};

const SENSOR: &str = r#"{
    "services": [ { "uuid": "0x181A", "characteristics": [
        { "uuid": "0x2A6E", "permissions": ["read", "notify"] },
        { "uuid": "0x2A6F", "permissions": ["read", "write"] } ] } ],
    "secret_passcode": "4242",
    "max_connections": 2
}"#;

const PEER: [u8; 6] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];

fn temperature(h: &Harness) -> u16 {
    h.server
        .value_handle(Uuid::Uuid16(0x181A), Uuid::Uuid16(0x2A6E))
        .unwrap()
}

#[test]
fn subscriptions_released_on_disconnect() {
    let mut h = Harness::start(SENSOR);
    let temp = temperature(&h);
    let a = h.server.on_connect(MAC).unwrap();
    let b = h.server.on_connect(PEER).unwrap();
    h.server.on_subscribe(a, temp).unwrap();
    h.server.on_subscribe(b, temp).unwrap();
    // Subscribing twice does not duplicate the entry.
    h.server.on_subscribe(b, temp).unwrap();

    assert_eq!(h.server.notify(temp, b"20").unwrap(), 2);
    h.server.on_disconnect(a).unwrap();
    assert_eq!(h.server.notify(temp, b"21").unwrap(), 1);
    h.server.on_disconnect(b).unwrap();
    assert_eq!(h.server.notify(temp, b"22").unwrap(), 0);

    let to_b = h
        .server
        .radio()
        .notifications()
        .filter(|c| matches!(c, RadioCall::Notify { conn, .. } if *conn == b))
        .count();
    assert_eq!(to_b, 2);
}

#[test]
fn notifications_do_not_need_pairing() {
    let mut h = Harness::start(SENSOR);
    let temp = temperature(&h);
    let conn = h.server.on_connect(MAC).unwrap();
    h.server.on_subscribe(conn, temp).unwrap();
    h.server.notify(temp, b"19.5").unwrap();

    assert_eq!(h.server.on_read(conn, temp), Ok(&b"19.5"[..]));
    assert!(h.server.radio().calls().contains(&RadioCall::Notify {
        conn,
        attr: temp,
        value: b"19.5".to_vec(),
    }));
}

#[test]
fn request_errors() {
    let mut h = Harness::start(BASIC);
    let conn = h.server.on_connect(MAC).unwrap();
    let value = h
        .server
        .value_handle(Uuid::Uuid16(0x1234), Uuid::Uuid16(0x5678))
        .unwrap();
    h.server.submit_passcode(conn, b"4242").unwrap();

    assert_eq!(h.server.on_read(conn, 0x7FFF), Err(GattError::InvalidHandle));
    assert_eq!(
        h.server.on_write(conn, value, &[0u8; 513]),
        Err(GattError::InvalidValueLength)
    );
    assert_eq!(
        h.server.on_read(ConnHandle(9), value),
        Err(GattError::InvalidConnection)
    );
    assert_eq!(
        h.server.on_disconnect(ConnHandle(9)),
        Err(Error::Gatt(GattError::InvalidConnection))
    );
    // The failed write left the value untouched.
    assert_eq!(h.server.on_read(conn, value), Ok(&b""[..]));
}

#[test]
fn indicator_follows_connections() {
    let mut h = Harness::start(SENSOR);
    let log = IndicatorLog::default();
    h.server.set_status_indicator(Box::new(log.clone()));

    let a = h.server.on_connect(MAC).unwrap();
    let b = h.server.on_connect(PEER).unwrap();
    h.server.on_disconnect(a).unwrap();
    h.server.disconnect(b).unwrap();

    assert_eq!(*log.history.borrow(), vec![false, true, true, true, false]);
}

#[test]
fn advertising_pauses_at_capacity() {
    let mut h = Harness::start(BASIC);
    assert_eq!(h.server.advertising_state(), AdvertisingState::Advertising);

    let conn = h.server.on_connect(MAC).unwrap();
    assert_eq!(h.server.advertising_state(), AdvertisingState::Stopped);
    assert_eq!(
        h.server.on_connect(PEER),
        Err(Error::Gatt(GattError::InsufficientResources))
    );
    assert_eq!(h.server.connection_count(), 1);

    h.server.on_disconnect(conn).unwrap();
    assert_eq!(h.server.advertising_state(), AdvertisingState::Advertising);
    assert_eq!(h.server.radio().count(&RadioCall::StartAdvertising), 2);
}

#[test]
fn advertising_resumes_below_capacity() {
    let mut h = Harness::start(SENSOR);
    h.server.on_connect(MAC).unwrap();
    // Connection ended legacy advertising; one slot left, so it restarts.
    assert_eq!(h.server.advertising_state(), AdvertisingState::Advertising);
    h.server.on_connect(PEER).unwrap();
    assert_eq!(h.server.advertising_state(), AdvertisingState::Stopped);
}

#[test]
fn explicit_stop_survives_disconnect() {
    let mut h = Harness::start(BASIC);
    let conn = h.server.on_connect(MAC).unwrap();
    h.server.stop_advertising().unwrap();
    h.server.on_disconnect(conn).unwrap();

    assert_eq!(h.server.advertising_state(), AdvertisingState::Stopped);
    assert_eq!(h.server.radio().count(&RadioCall::StartAdvertising), 1);
}

#[test]
fn queued_actions_run_in_order() {
    let mut h = Harness::start(SENSOR);
    let temp = temperature(&h);
    let queue = ActionQueue::new();

    queue
        .post_radio(RadioEvent::Connected {
            conn: ConnHandle(7),
            mac: MAC,
        })
        .unwrap();
    let mut cccd_on = PduValue::new();
    cccd_on.extend_from_slice(&[0x01, 0x00]).unwrap();
    let cccd = h
        .server
        .registry()
        .characteristic(temp)
        .and_then(|c| c.cccd_handle())
        .unwrap();
    queue
        .post_radio(RadioEvent::Write {
            conn: ConnHandle(7),
            attr: cccd,
            value: cccd_on,
            request: Some(1),
        })
        .unwrap();
    let mut reading = PduValue::new();
    reading.extend_from_slice(b"23").unwrap();
    queue
        .post_action(ServerAction::Notify {
            attr: temp,
            value: reading,
        })
        .unwrap();
    queue.post_action(ServerAction::Disconnect(ConnHandle(7))).unwrap();

    assert_eq!(h.server.drain(&queue), 4);
    assert!(queue.is_empty());

    let calls = h.server.radio().calls();
    assert!(calls.contains(&RadioCall::Response {
        conn: ConnHandle(7),
        request: 1,
        attr: cccd,
        status: 0,
        value: Vec::new(),
    }));
    assert!(calls.contains(&RadioCall::Notify {
        conn: ConnHandle(7),
        attr: temp,
        value: b"23".to_vec(),
    }));
    assert_eq!(h.server.radio().count(&RadioCall::Disconnect(ConnHandle(7))), 1);
    assert_eq!(h.server.connection_count(), 0);
}

#[test]
fn gated_write_response_carries_att_error() {
    let mut h = Harness::start(BASIC);
    let value = h
        .server
        .value_handle(Uuid::Uuid16(0x1234), Uuid::Uuid16(0x5678))
        .unwrap();
    let queue = ActionQueue::new();
    queue
        .post_radio(RadioEvent::Connected {
            conn: ConnHandle(2),
            mac: MAC,
        })
        .unwrap();
    let mut data = PduValue::new();
    data.extend_from_slice(b"open").unwrap();
    queue
        .post_radio(RadioEvent::Write {
            conn: ConnHandle(2),
            attr: value,
            value: data,
            request: Some(5),
        })
        .unwrap();
    h.server.drain(&queue);

    let status = h.server.radio().calls().iter().find_map(|c| match c {
        RadioCall::Response { request: 5, status, .. } => Some(*status),
        _ => None,
    });
    assert_eq!(
        status,
        Some(GattError::Pairing(nimble_server::error::PairingError::NotAuthenticated).att_code())
    );
    assert_ne!(status, Some(0));
}

#[test]
fn read_blob_continues_from_offset() {
    let mut h = Harness::start(SENSOR);
    let temp = temperature(&h);
    let long: Vec<u8> = (0u8..40).collect();
    h.server.notify(temp, &long).unwrap();

    let queue = ActionQueue::new();
    queue
        .post_radio(RadioEvent::Connected {
            conn: ConnHandle(4),
            mac: MAC,
        })
        .unwrap();
    for (request, offset) in [(1, 22), (2, 40), (3, 41)] {
        queue
            .post_radio(RadioEvent::Read {
                conn: ConnHandle(4),
                attr: temp,
                request,
                offset,
            })
            .unwrap();
    }
    assert_eq!(h.server.drain(&queue), 4);

    let response = |id: u32| {
        h.server.radio().calls().iter().find_map(|c| match c {
            RadioCall::Response {
                request, status, value, ..
            } if *request == id => Some((*status, value.clone())),
            _ => None,
        })
    };
    assert_eq!(response(1), Some((0, long[22..].to_vec())));
    // Offset at the end yields an empty tail.
    assert_eq!(response(2), Some((0, Vec::new())));
    assert_eq!(response(3).map(|(status, _)| status), Some(GattError::InvalidOffset.att_code()));
    assert_eq!(GattError::InvalidOffset.att_code(), 0x07);
}

#[test]
fn state_tracks_last_verdict() {
    let mut h = Harness::start(BASIC);
    assert_eq!(h.server.state(), ServerState::Idle);
    assert!(h.server.is_active());

    let conn = h.server.on_connect(MAC).unwrap();
    h.server.submit_passcode(conn, b"nope").unwrap_err();
    assert!(h.server.is_rejected());
    h.server.submit_passcode(conn, b"4242").unwrap();
    assert!(h.server.is_accepted());

    h.server.disconnect(conn).unwrap();
    assert_eq!(h.server.state(), ServerState::Idle);
    assert_eq!(h.server.radio().count(&RadioCall::Disconnect(conn)), 1);
}
