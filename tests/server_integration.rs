//! Integration tests: GattServer → pairing gate → triggers, end to end
//! through the public API with the simulated radio.

use nimble_server::adapters::radio::{RadioCall, SimRadio};
use nimble_server::adapters::time::SystemClock;
use nimble_server::advertising::AdvertisingState;
use nimble_server::app::ports::RadioPort;
use nimble_server::config::{CharacteristicConfig, ServiceConfig};
use nimble_server::connection::ConnHandle;
use nimble_server::error::{Error, GattError, PairingError, RadioError};
use nimble_server::gatt::{AttrHandle, Permissions, Service, Uuid};
use nimble_server::{GattServer, ServerConfig, ServerState};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn single_service_config() -> ServerConfig {
    let service = ServiceConfig {
        uuid: Uuid::Uuid16(0x1234),
        characteristics: vec![CharacteristicConfig {
            uuid: Uuid::Uuid16(0x5678),
            permissions: Permissions::READ | Permissions::WRITE,
        }],
    };
    ServerConfig::new(vec![service], "4242").unwrap()
}

/// Radio whose advertising start fails while `adv_down` is set.
struct FlakyRadio {
    adv_down: Rc<Cell<bool>>,
}

impl RadioPort for FlakyRadio {
    fn register_attributes(&mut self, _services: &[Service]) -> Result<(), RadioError> {
        Ok(())
    }

    fn start_advertising(&mut self) -> Result<(), RadioError> {
        if self.adv_down.get() {
            Err(RadioError::Driver(-1))
        } else {
            Ok(())
        }
    }

    fn stop_advertising(&mut self) -> Result<(), RadioError> {
        Ok(())
    }

    fn disconnect(&mut self, _conn: ConnHandle) -> Result<(), RadioError> {
        Ok(())
    }

    fn notify(&mut self, _conn: ConnHandle, _attr: AttrHandle, _value: &[u8]) -> Result<(), RadioError> {
        Ok(())
    }
}

// ── Walkthrough ───────────────────────────────────────────────

#[test]
fn connect_authenticate_write_read() {
    let config = single_service_config();
    let mut server = GattServer::new(&config, SimRadio::new(), SystemClock::new()).unwrap();

    let connected = Rc::new(RefCell::new(Vec::<String>::new()));
    let accepted = Rc::new(RefCell::new(0u32));
    {
        let connected = connected.clone();
        let accepted = accepted.clone();
        server
            .triggers_mut()
            .on_client_connected(move |mac| {
                connected.borrow_mut().push(mac.to_owned());
                Ok(())
            })
            .on_pinpad_accepted(move |_, _| {
                *accepted.borrow_mut() += 1;
                Ok(())
            });
    }
    server.start().unwrap();

    let conn = server.on_connect([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]).unwrap();
    assert_eq!(*connected.borrow(), vec!["AA:BB:CC:DD:EE:FF".to_owned()]);

    let attr = server
        .value_handle(Uuid::Uuid16(0x1234), Uuid::Uuid16(0x5678))
        .unwrap();
    assert_eq!(
        server.on_write(conn, attr, b"hello"),
        Err(GattError::Pairing(PairingError::NotAuthenticated))
    );
    // Reads are not gated, and the refused write stored nothing.
    assert_eq!(server.on_read(conn, attr), Ok(&b""[..]));

    server.submit_passcode(conn, b"4242").unwrap();
    assert_eq!(*accepted.borrow(), 1);

    assert_eq!(server.on_write(conn, attr, b"hello"), Ok(()));
    assert_eq!(server.on_read(conn, attr), Ok(&b"hello"[..]));
}

// ── Advertising ───────────────────────────────────────────────

#[test]
fn start_advertising_twice_is_noop() {
    let mut config = single_service_config();
    config.start_advertising = false;
    let mut server = GattServer::new(&config, SimRadio::new(), SystemClock::new()).unwrap();
    server.start().unwrap();
    assert_eq!(server.advertising_state(), AdvertisingState::Stopped);

    assert_eq!(server.start_advertising(), Ok(()));
    assert_eq!(server.start_advertising(), Ok(()));
    assert_eq!(server.advertising_state(), AdvertisingState::Advertising);
    assert_eq!(server.radio().count(&RadioCall::StartAdvertising), 1);
}

#[test]
fn radio_failure_surfaces_and_retry_succeeds() {
    let mut config = single_service_config();
    config.start_advertising = false;
    let mut server = GattServer::new(&config, SimRadio::new(), SystemClock::new()).unwrap();
    server.start().unwrap();

    server.radio_mut().fail_next(RadioError::Driver(-1));
    assert_eq!(server.start_advertising(), Err(RadioError::Driver(-1)));
    assert_eq!(server.advertising_state(), AdvertisingState::Stopped);

    server.start_advertising().unwrap();
    assert_eq!(server.advertising_state(), AdvertisingState::Advertising);
}

#[test]
fn startup_advertising_failure_leaves_server_serving() {
    let config = single_service_config();
    let adv_down = Rc::new(Cell::new(true));
    let radio = FlakyRadio {
        adv_down: adv_down.clone(),
    };
    let mut server = GattServer::new(&config, radio, SystemClock::new()).unwrap();

    assert_eq!(server.start(), Ok(()));
    assert_eq!(server.state(), ServerState::Idle);
    assert_eq!(server.advertising_state(), AdvertisingState::Stopped);
    assert_eq!(server.start_advertising(), Err(RadioError::Driver(-1)));

    adv_down.set(false);
    assert_eq!(server.start_advertising(), Ok(()));
    assert_eq!(server.advertising_state(), AdvertisingState::Advertising);
    assert!(server.on_connect([1, 2, 3, 4, 5, 6]).is_ok());
}

// ── Registration ──────────────────────────────────────────────

#[test]
fn registration_after_start_is_refused() {
    let config = single_service_config();
    let mut server = GattServer::new(&config, SimRadio::new(), SystemClock::new()).unwrap();
    let extra = ServiceConfig {
        uuid: Uuid::Uuid16(0x180F),
        characteristics: vec![CharacteristicConfig {
            uuid: Uuid::Uuid16(0x2A19),
            permissions: Permissions::READ | Permissions::NOTIFY,
        }],
    };
    server.register_service(&extra).unwrap();
    server.start().unwrap();
    assert!(server
        .value_handle(Uuid::Uuid16(0x180F), Uuid::Uuid16(0x2A19))
        .is_some());

    let late = ServiceConfig {
        uuid: Uuid::Uuid16(0x1800),
        characteristics: Vec::new(),
    };
    assert_eq!(
        server.register_service(&late),
        Err(Error::Registry(nimble_server::error::RegistryError::Frozen))
    );
}
