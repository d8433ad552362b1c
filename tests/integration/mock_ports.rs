//! Mock ports and a server harness for integration tests.
//!
//! The radio is the library's [`SimRadio`]; the clock is manual so cooldown
//! tests control time; every trigger is recorded as a formatted string.

use nimble_server::adapters::radio::SimRadio;
use nimble_server::app::ports::{Clock, StatusIndicator};
use nimble_server::{GattServer, ServerConfig};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub const MAC: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
pub const MAC_STR: &str = "AA:BB:CC:DD:EE:FF";

// ── ManualClock ───────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct ManualClock {
    uptime_ms: Rc<Cell<u64>>,
    unix_secs: Rc<Cell<Option<u64>>>,
}

#[allow(dead_code)]
impl ManualClock {
    pub fn advance_ms(&self, ms: u64) {
        self.uptime_ms.set(self.uptime_ms.get() + ms);
    }

    pub fn set_unix(&self, secs: u64) {
        self.unix_secs.set(Some(secs));
    }
}

impl Clock for ManualClock {
    fn uptime_ms(&self) -> u64 {
        self.uptime_ms.get()
    }

    fn unix_time_secs(&self) -> Option<u64> {
        self.unix_secs.get()
    }
}

// ── Status indicator log ──────────────────────────────────────

#[derive(Clone, Default)]
pub struct IndicatorLog {
    pub history: Rc<RefCell<Vec<bool>>>,
}

impl StatusIndicator for IndicatorLog {
    fn set_active(&mut self, active: bool) {
        self.history.borrow_mut().push(active);
    }
}

// ── Harness ───────────────────────────────────────────────────

pub type Server = GattServer<SimRadio, ManualClock>;

pub struct Harness {
    pub server: Server,
    pub clock: ManualClock,
    pub events: Rc<RefCell<Vec<String>>>,
}

#[allow(dead_code)]
impl Harness {
    /// Parse `json`, build the server, hook every trigger and start it.
    pub fn start(json: &str) -> Self {
        let config = ServerConfig::from_json(json).expect("valid test config");
        let clock = ManualClock::default();
        let mut server = GattServer::new(&config, SimRadio::new(), clock.clone()).expect("server");
        let events = Rc::new(RefCell::new(Vec::new()));

        let t = server.triggers_mut();
        let e = events.clone();
        t.on_client_connected(move |mac| {
            e.borrow_mut().push(format!("connected:{mac}"));
            Ok(())
        });
        let e = events.clone();
        t.on_user_selected(move |user| {
            e.borrow_mut().push(format!("user:{user}"));
            Ok(())
        });
        let e = events.clone();
        t.on_pinpad_accepted(move |user, cmd| {
            e.borrow_mut().push(format!("accepted:{user}:{cmd}"));
            Ok(())
        });
        let e = events.clone();
        t.on_pinpad_rejected(move |user, cmd| {
            e.borrow_mut().push(format!("rejected:{user}:{cmd}"));
            Ok(())
        });
        let e = events.clone();
        t.on_user_command_received(move |mac, cmd| {
            e.borrow_mut().push(format!("command:{mac}:{cmd}"));
            Ok(())
        });

        server.start().expect("start");
        Self {
            server,
            clock,
            events,
        }
    }

    pub fn take_events(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.borrow_mut())
    }
}

/// One service `0x1234` with characteristic `0x5678` (read, write),
/// passcode `4242`.
pub const BASIC: &str = r#"{
    "services": [ { "uuid": "0x1234", "characteristics": [
        { "uuid": "0x5678", "permissions": ["read", "write"] } ] } ],
    "secret_passcode": "4242"
}"#;
