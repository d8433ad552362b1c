//! nimble_server firmware: main entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  EspRadio (Bluedroid)   PinIndicator (GPIO)   SystemClock │
//! │  ─────────────── Port trait boundary ────────────────────│
//! │          GattServer (registry · gate · conns · adv)      │
//! │  ─────────────────────────────────────────────────────── │
//! │   RADIO_INBOX ──▶ drain loop ──▶ Triggers (log actions)  │
//! └──────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::{Context, Result};
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyOutputPin, PinDriver};
use log::info;

use nimble_server::adapters::radio::{EspRadio, RADIO_INBOX};
use nimble_server::adapters::status_pin::PinIndicator;
use nimble_server::adapters::time::SystemClock;
use nimble_server::app::commands::{PduValue, ServerAction};
use nimble_server::app::ports::Clock;
use nimble_server::config::{ServerConfig, EMBEDDED_CONFIG};
use nimble_server::gatt::{Permissions, Uuid};
use nimble_server::{Error, GattServer};

/// Dispatch loop period.
const LOOP_PERIOD_MS: u32 = 10;

/// Interval between uptime notifications on the first Notify characteristic.
const HEARTBEAT_MS: u64 = 5_000;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;
    info!("nimble_server v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Configuration ──────────────────────────────────────
    let config = ServerConfig::from_json(EMBEDDED_CONFIG)
        .map_err(Error::from)
        .context("embedded configuration")?;

    // ── 3. Radio + server ─────────────────────────────────────
    let radio = EspRadio::new(&config.device_name)
        .map_err(Error::from)
        .context("BLE stack")?;
    let clock = SystemClock::new();
    let mut server = GattServer::new(&config, radio, SystemClock::new())?;

    if let Some(ind) = config.status_indicator {
        // SAFETY: the pin number comes from validated configuration and is
        // not claimed by any other driver in this firmware.
        let pin = unsafe { AnyOutputPin::new(i32::from(ind.pin)) };
        let driver = PinDriver::output(pin)?;
        let indicator = if ind.inverted {
            PinIndicator::active_low(driver)
        } else {
            PinIndicator::new(driver)
        };
        server.set_status_indicator(Box::new(indicator));
    }

    // ── 4. Automation hooks ───────────────────────────────────
    server
        .triggers_mut()
        .on_client_connected(|mac| {
            info!("trigger: client connected {}", mac);
            Ok(())
        })
        .on_user_selected(|user| {
            info!("trigger: user selected '{}'", user);
            Ok(())
        })
        .on_pinpad_accepted(|user, cmd| {
            info!("trigger: pinpad accepted user='{}' cmd='{}'", user, cmd);
            Ok(())
        })
        .on_pinpad_rejected(|user, cmd| {
            info!("trigger: pinpad rejected user='{}' cmd='{}'", user, cmd);
            Ok(())
        })
        .on_user_command_received(|mac, cmd| {
            info!("trigger: command from {}: '{}'", mac, cmd);
            Ok(())
        });

    server.start()?;

    let heartbeat_attr = config
        .services
        .iter()
        .find_map(|s| {
            s.characteristics
                .iter()
                .find(|c| c.permissions.contains(Permissions::NOTIFY))
                .map(|c| (s.uuid, c.uuid))
        })
        .and_then(|(svc, chr): (Uuid, Uuid)| server.value_handle(svc, chr));

    // ── 5. Dispatch loop ──────────────────────────────────────
    let mut next_heartbeat = clock.uptime_ms() + HEARTBEAT_MS;
    loop {
        server.drain(&RADIO_INBOX);

        let now = clock.uptime_ms();
        if let Some(attr) = heartbeat_attr {
            if now >= next_heartbeat {
                next_heartbeat = now + HEARTBEAT_MS;
                let mut value = PduValue::new();
                let _ = value.extend_from_slice(&(now / 1_000).to_le_bytes());
                // Marshalled through the inbox like any other task would.
                let _ = RADIO_INBOX.post_action(ServerAction::Notify { attr, value });
            }
        }

        FreeRtos::delay_ms(LOOP_PERIOD_MS);
    }
}
