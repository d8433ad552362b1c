//! Radio adapters implementing [`RadioPort`].
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: [`EspRadio`], a Bluedroid GATT server.
//!   Stack callbacks post [`RadioEvent`]s to [`RADIO_INBOX`]; the main
//!   loop drains them into the server.
//! - **all targets**: [`SimRadio`], which records every request for
//!   host-side tests and can be told to fail the next one.

use log::{debug, info};

use crate::app::ports::RadioPort;
use crate::connection::ConnHandle;
use crate::error::{GattError, RadioError};
use crate::gatt::{AttrHandle, Service};

// ───────────────────────────────────────────────────────────────
// Simulation radio
// ───────────────────────────────────────────────────────────────

/// One request made of the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    RegisterAttributes { services: usize, last_handle: AttrHandle },
    StartAdvertising,
    StopAdvertising,
    Disconnect(ConnHandle),
    Notify {
        conn: ConnHandle,
        attr: AttrHandle,
        value: Vec<u8>,
    },
    Response {
        conn: ConnHandle,
        request: u32,
        attr: AttrHandle,
        /// ATT error code, 0 on success.
        status: u8,
        value: Vec<u8>,
    },
}

#[derive(Debug, Default)]
pub struct SimRadio {
    calls: Vec<RadioCall>,
    fail_next: Option<RadioError>,
}

impl SimRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next request fail with `err`.
    pub fn fail_next(&mut self, err: RadioError) {
        self.fail_next = Some(err);
    }

    pub fn calls(&self) -> &[RadioCall] {
        &self.calls
    }

    pub fn count(&self, call: &RadioCall) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    pub fn notifications(&self) -> impl Iterator<Item = &RadioCall> {
        self.calls.iter().filter(|c| matches!(c, RadioCall::Notify { .. }))
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    fn record(&mut self, call: RadioCall) -> Result<(), RadioError> {
        if let Some(err) = self.fail_next.take() {
            debug!("BLE(sim): failing {:?} with {}", call, err);
            return Err(err);
        }
        debug!("BLE(sim): {:?}", call);
        self.calls.push(call);
        Ok(())
    }
}

impl RadioPort for SimRadio {
    fn register_attributes(&mut self, services: &[Service]) -> Result<(), RadioError> {
        let last_handle = services.last().map_or(0, Service::end_handle);
        info!(
            "BLE(sim): {} service(s) registered, handles 1..={}",
            services.len(),
            last_handle
        );
        self.record(RadioCall::RegisterAttributes {
            services: services.len(),
            last_handle,
        })
    }

    fn start_advertising(&mut self) -> Result<(), RadioError> {
        self.record(RadioCall::StartAdvertising)
    }

    fn stop_advertising(&mut self) -> Result<(), RadioError> {
        self.record(RadioCall::StopAdvertising)
    }

    fn disconnect(&mut self, conn: ConnHandle) -> Result<(), RadioError> {
        self.record(RadioCall::Disconnect(conn))
    }

    fn notify(&mut self, conn: ConnHandle, attr: AttrHandle, value: &[u8]) -> Result<(), RadioError> {
        self.record(RadioCall::Notify {
            conn,
            attr,
            value: value.to_vec(),
        })
    }

    fn send_response(
        &mut self,
        conn: ConnHandle,
        request: u32,
        attr: AttrHandle,
        outcome: Result<&[u8], GattError>,
    ) -> Result<(), RadioError> {
        let (status, value) = match outcome {
            Ok(v) => (0, v.to_vec()),
            Err(e) => (e.att_code(), Vec::new()),
        };
        self.record(RadioCall::Response {
            conn,
            request,
            attr,
            status,
            value,
        })
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF Bluedroid radio
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::{EspRadio, RADIO_INBOX};

#[cfg(target_os = "espidf")]
mod esp {
    use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Mutex;

    use esp_idf_svc::sys::*;
    use log::{error, info, warn};

    use super::super::utils::is_printable_ascii;
    use crate::app::commands::{PduValue, RadioEvent};
    use crate::app::inbox::ActionQueue;
    use crate::app::ports::RadioPort;
    use crate::connection::ConnHandle;
    use crate::error::{GattError, RadioError};
    use crate::gatt::{AttrHandle, Permissions, Service, Uuid};

    const CCCD_UUID: u16 = 0x2902;

    /// Radio callbacks land here; the main loop drains it.
    pub static RADIO_INBOX: ActionQueue = ActionQueue::new();

    // ── Callback bridge state ─────────────────────────────────
    //
    // Bluedroid callbacks are C function pointers that cannot capture Rust
    // closures.  These statics carry the registration plan and the handle
    // map between the adapter and the callbacks.

    static GATTS_IF: AtomicU32 = AtomicU32::new(ESP_GATT_IF_NONE as u32);
    static PLAN_STEP: AtomicUsize = AtomicUsize::new(0);
    static CURRENT_SVC: AtomicU32 = AtomicU32::new(0);

    #[derive(Clone, Copy)]
    enum Step {
        Service { uuid: Uuid, handles: u16 },
        Characteristic { uuid: Uuid, permissions: Permissions },
        Cccd,
    }

    /// Attribute creation order plus the local handle each step yields.
    static PLAN: Mutex<Vec<(Step, AttrHandle)>> = Mutex::new(Vec::new());

    /// (stack handle, local handle) pairs.
    static HANDLE_MAP: Mutex<Vec<(u16, AttrHandle)>> = Mutex::new(Vec::new());

    fn to_local(stack: u16) -> Option<AttrHandle> {
        HANDLE_MAP
            .lock()
            .ok()?
            .iter()
            .find(|(s, _)| *s == stack)
            .map(|(_, l)| *l)
    }

    fn to_stack(local: AttrHandle) -> Option<u16> {
        HANDLE_MAP
            .lock()
            .ok()?
            .iter()
            .find(|(_, l)| *l == local)
            .map(|(s, _)| *s)
    }

    fn esp_uuid(uuid: Uuid) -> esp_bt_uuid_t {
        let mut t: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        match uuid {
            Uuid::Uuid16(v) => {
                t.len = 2;
                t.uuid.uuid16 = v;
            }
            Uuid::Uuid128(bytes) => {
                t.len = 16;
                t.uuid.uuid128 = bytes;
            }
        }
        t
    }

    fn esp_perm_prop(p: Permissions) -> (esp_gatt_perm_t, esp_gatt_char_prop_t) {
        let mut perm = 0;
        let mut prop = 0;
        if p.contains(Permissions::READ) {
            perm |= ESP_GATT_PERM_READ;
            prop |= ESP_GATT_CHAR_PROP_BIT_READ;
        }
        if p.contains(Permissions::WRITE) {
            perm |= ESP_GATT_PERM_WRITE;
            prop |= ESP_GATT_CHAR_PROP_BIT_WRITE | ESP_GATT_CHAR_PROP_BIT_WRITE_NR;
        }
        if p.contains(Permissions::NOTIFY) {
            prop |= ESP_GATT_CHAR_PROP_BIT_NOTIFY;
        }
        (perm as esp_gatt_perm_t, prop as esp_gatt_char_prop_t)
    }

    fn check(ret: esp_err_t, what: &str) -> Result<(), RadioError> {
        if ret == ESP_OK as esp_err_t {
            Ok(())
        } else {
            error!("BLE: {} failed ({})", what, ret);
            Err(RadioError::Driver(ret))
        }
    }

    /// Issue the creation request for the current plan step.
    unsafe fn issue_step(gatts_if: esp_gatt_if_t) {
        let idx = PLAN_STEP.load(AtomicOrdering::Relaxed);
        let step = PLAN.lock().ok().and_then(|p| p.get(idx).map(|(s, _)| *s));
        let svc = CURRENT_SVC.load(AtomicOrdering::Relaxed) as u16;
        match step {
            Some(Step::Service { uuid, handles }) => {
                let mut id = esp_gatt_srvc_id_t {
                    id: esp_gatt_id_t {
                        uuid: esp_uuid(uuid),
                        inst_id: 0,
                    },
                    is_primary: true,
                };
                unsafe { esp_ble_gatts_create_service(gatts_if, &mut id, handles) };
            }
            Some(Step::Characteristic { uuid, permissions }) => {
                let (perm, prop) = esp_perm_prop(permissions);
                let mut u = esp_uuid(uuid);
                unsafe {
                    esp_ble_gatts_add_char(
                        svc,
                        &mut u,
                        perm,
                        prop,
                        core::ptr::null_mut(),
                        core::ptr::null_mut(),
                    )
                };
            }
            Some(Step::Cccd) => {
                let mut u = esp_uuid(Uuid::Uuid16(CCCD_UUID));
                unsafe {
                    esp_ble_gatts_add_char_descr(
                        svc,
                        &mut u,
                        (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                        core::ptr::null_mut(),
                        core::ptr::null_mut(),
                    )
                };
            }
            None => info!("BLE GATTS: attribute table registered"),
        }
    }

    /// Record the stack handle for the current step and move on.
    unsafe fn complete_step(gatts_if: esp_gatt_if_t, stack_handle: u16) {
        let idx = PLAN_STEP.fetch_add(1, AtomicOrdering::Relaxed);
        let local = PLAN.lock().ok().and_then(|p| p.get(idx).map(|(_, l)| *l));
        if let (Some(local), Ok(mut map)) = (local, HANDLE_MAP.lock()) {
            map.push((stack_handle, local));
        }
        unsafe { issue_step(gatts_if) };
    }

    /// Answer a request from the callback, for requests that never reach
    /// the dispatch loop.
    unsafe fn reply_status(
        gatts_if: esp_gatt_if_t,
        conn_id: u16,
        trans_id: u32,
        status: esp_gatt_status_t,
    ) {
        let mut rsp: esp_gatt_rsp_t = unsafe { core::mem::zeroed() };
        let ret = unsafe { esp_ble_gatts_send_response(gatts_if, conn_id, trans_id, status, &mut rsp) };
        if ret != ESP_OK as esp_err_t {
            warn!("BLE GATTS: status reply failed ({})", ret);
        }
    }

    fn post(event: RadioEvent) {
        if RADIO_INBOX.post_radio(event).is_err() {
            warn!("BLE: inbox full, event dropped");
        }
    }

    unsafe extern "C" fn gap_event_handler(
        event: esp_gap_ble_cb_event_t,
        _param: *mut esp_ble_gap_cb_param_t,
    ) {
        match event {
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
                info!("BLE GAP: advertising started");
            }
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
                info!("BLE GAP: advertising stopped");
            }
            _ => {}
        }
    }

    unsafe extern "C" fn gatts_event_handler(
        event: esp_gatts_cb_event_t,
        gatts_if: esp_gatt_if_t,
        param: *mut esp_ble_gatts_cb_param_t,
    ) {
        match event {
            esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
                GATTS_IF.store(gatts_if as u32, AtomicOrdering::Relaxed);
                info!("BLE GATTS: app registered (if={})", gatts_if);
                unsafe { issue_step(gatts_if) };
            }
            esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
                let p = unsafe { &(*param).create };
                CURRENT_SVC.store(p.service_handle as u32, AtomicOrdering::Relaxed);
                unsafe {
                    esp_ble_gatts_start_service(p.service_handle);
                    complete_step(gatts_if, p.service_handle);
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
                let p = unsafe { &(*param).add_char };
                unsafe { complete_step(gatts_if, p.attr_handle) };
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
                let p = unsafe { &(*param).add_char_descr };
                unsafe { complete_step(gatts_if, p.attr_handle) };
            }
            esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
                let p = unsafe { &(*param).connect };
                post(RadioEvent::Connected {
                    conn: ConnHandle(p.conn_id),
                    mac: p.remote_bda,
                });
            }
            esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
                let p = unsafe { &(*param).disconnect };
                post(RadioEvent::Disconnected {
                    conn: ConnHandle(p.conn_id),
                });
            }
            esp_gatts_cb_event_t_ESP_GATTS_READ_EVT => {
                let p = unsafe { &(*param).read };
                let Some(attr) = to_local(p.handle) else {
                    return;
                };
                post(RadioEvent::Read {
                    conn: ConnHandle(p.conn_id),
                    attr,
                    request: p.trans_id,
                    offset: p.offset,
                });
            }
            esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
                let p = unsafe { &(*param).write };
                let Some(attr) = to_local(p.handle) else {
                    return;
                };
                // Prepared (queued) writes are not buffered.
                if p.is_prep {
                    warn!("BLE GATTS: prepared write to {} rejected", attr);
                    unsafe {
                        reply_status(
                            gatts_if,
                            p.conn_id,
                            p.trans_id,
                            esp_gatt_status_t_ESP_GATT_REQ_NOT_SUPPORTED,
                        )
                    };
                    return;
                }
                let data = unsafe { core::slice::from_raw_parts(p.value, p.len as usize) };
                let mut value = PduValue::new();
                if value.extend_from_slice(data).is_err() {
                    warn!("BLE GATTS: write of {} bytes to {} rejected", data.len(), attr);
                    if p.need_rsp {
                        unsafe {
                            reply_status(
                                gatts_if,
                                p.conn_id,
                                p.trans_id,
                                esp_gatt_status_t_ESP_GATT_INVALID_ATTR_LEN,
                            )
                        };
                    }
                    return;
                }
                post(RadioEvent::Write {
                    conn: ConnHandle(p.conn_id),
                    attr,
                    value,
                    request: p.need_rsp.then_some(p.trans_id),
                });
            }
            esp_gatts_cb_event_t_ESP_GATTS_EXEC_WRITE_EVT => {
                // Nothing is ever queued, so there is nothing to execute.
                let p = unsafe { &(*param).exec_write };
                unsafe { reply_status(gatts_if, p.conn_id, p.trans_id, esp_gatt_status_t_ESP_GATT_OK) };
            }
            _ => {}
        }
    }

    /// Bluedroid-backed radio.
    pub struct EspRadio {
        device_name: heapless::String<24>,
    }

    impl EspRadio {
        /// Bring up the controller and Bluedroid in BLE-only mode.
        pub fn new(device_name: &str) -> Result<Self, RadioError> {
            let mut name = heapless::String::new();
            if !is_printable_ascii(device_name) || name.push_str(device_name).is_err() {
                return Err(RadioError::NotReady);
            }
            unsafe {
                esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);
                let mut bt_cfg = esp_bt_controller_config_t::default();
                check(esp_bt_controller_init(&mut bt_cfg), "bt_controller_init")?;
                check(
                    esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE),
                    "bt_controller_enable",
                )?;
                check(esp_bluedroid_init(), "bluedroid_init")?;
                check(esp_bluedroid_enable(), "bluedroid_enable")?;
                check(
                    esp_ble_gap_register_callback(Some(gap_event_handler)),
                    "gap_register_callback",
                )?;
                check(
                    esp_ble_gatts_register_callback(Some(gatts_event_handler)),
                    "gatts_register_callback",
                )?;
            }
            info!("BLE(espidf): Bluedroid up as '{}'", name);
            Ok(Self { device_name: name })
        }

        fn gatts_if() -> Result<esp_gatt_if_t, RadioError> {
            let v = GATTS_IF.load(AtomicOrdering::Relaxed);
            if v == ESP_GATT_IF_NONE as u32 {
                Err(RadioError::NotReady)
            } else {
                Ok(v as esp_gatt_if_t)
            }
        }
    }

    impl RadioPort for EspRadio {
        fn register_attributes(&mut self, services: &[Service]) -> Result<(), RadioError> {
            let mut plan = PLAN.lock().map_err(|_| RadioError::NotReady)?;
            plan.clear();
            for s in services {
                let handles = s.end_handle() - s.handle() + 1;
                plan.push((
                    Step::Service {
                        uuid: s.uuid(),
                        handles,
                    },
                    s.handle(),
                ));
                for c in s.characteristics() {
                    plan.push((
                        Step::Characteristic {
                            uuid: c.uuid(),
                            permissions: c.permissions(),
                        },
                        c.value_handle(),
                    ));
                    if let Some(cccd) = c.cccd_handle() {
                        plan.push((Step::Cccd, cccd));
                    }
                }
            }
            drop(plan);
            PLAN_STEP.store(0, AtomicOrdering::Relaxed);
            if let Ok(mut map) = HANDLE_MAP.lock() {
                map.clear();
            }

            // The rest of the table is created from the REG event onwards.
            unsafe {
                let name = self.device_name.as_bytes();
                let mut cname = [0u8; 25];
                cname[..name.len()].copy_from_slice(name);
                check(
                    esp_ble_gap_set_device_name(cname.as_ptr() as *const _),
                    "set_device_name",
                )?;
                check(esp_ble_gatts_app_register(0), "gatts_app_register")
            }
        }

        fn start_advertising(&mut self) -> Result<(), RadioError> {
            let mut adv_params = esp_ble_adv_params_t {
                adv_int_min: 0x20,
                adv_int_max: 0x40,
                adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
                own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
                channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
                adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
                ..unsafe { core::mem::zeroed() }
            };
            check(
                unsafe { esp_ble_gap_start_advertising(&mut adv_params) },
                "start_advertising",
            )
        }

        fn stop_advertising(&mut self) -> Result<(), RadioError> {
            check(unsafe { esp_ble_gap_stop_advertising() }, "stop_advertising")
        }

        fn disconnect(&mut self, conn: ConnHandle) -> Result<(), RadioError> {
            let gatts_if = Self::gatts_if()?;
            check(unsafe { esp_ble_gatts_close(gatts_if, conn.0) }, "gatts_close")
        }

        fn notify(&mut self, conn: ConnHandle, attr: AttrHandle, value: &[u8]) -> Result<(), RadioError> {
            let gatts_if = Self::gatts_if()?;
            let handle = to_stack(attr).ok_or(RadioError::NotReady)?;
            check(
                unsafe {
                    esp_ble_gatts_send_indicate(
                        gatts_if,
                        conn.0,
                        handle,
                        value.len() as u16,
                        value.as_ptr() as *mut u8,
                        false,
                    )
                },
                "send_indicate",
            )
        }

        fn send_response(
            &mut self,
            conn: ConnHandle,
            request: u32,
            attr: AttrHandle,
            outcome: Result<&[u8], GattError>,
        ) -> Result<(), RadioError> {
            let gatts_if = Self::gatts_if()?;
            let handle = to_stack(attr).ok_or(RadioError::NotReady)?;
            let mut rsp: esp_gatt_rsp_t = unsafe { core::mem::zeroed() };
            let status = match outcome {
                Ok(value) => {
                    unsafe {
                        let n = value.len().min(rsp.attr_value.value.len());
                        rsp.attr_value.handle = handle;
                        rsp.attr_value.len = n as u16;
                        rsp.attr_value.value[..n].copy_from_slice(&value[..n]);
                    }
                    esp_gatt_status_t_ESP_GATT_OK
                }
                Err(e) => e.att_code() as esp_gatt_status_t,
            };
            check(
                unsafe { esp_ble_gatts_send_response(gatts_if, conn.0, request, status, &mut rsp) },
                "send_response",
            )
        }
    }
}
