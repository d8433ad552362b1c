//! Server configuration.
//!
//! The build tool hands the firmware a JSON document describing the GATT
//! layout, the pairing secret and a few behavioural switches.  Parsing is
//! two-stage: `serde` reads a permissive raw schema (unknown keys are still
//! rejected), then [`ServerConfig::try_from`] turns it into typed values and
//! enforces every cross-field rule.  The typed form never holds a service
//! with both `uuid` and `uuid128`, an empty permission set, or a duplicate
//! UUID.

use log::warn;
use serde::Deserialize;

use crate::adapters::utils::is_printable_ascii;
use crate::error::ConfigError;
use crate::gatt::permissions::Permissions;
use crate::gatt::uuid::Uuid;
use crate::pairing::frame;

/// Sample configuration embedded into the firmware image.
pub const EMBEDDED_CONFIG: &str = include_str!("../config/server.json");

pub const DEFAULT_MAX_PASSCODE_ATTEMPTS: u8 = 3;
pub const DEFAULT_MAX_CONNECTIONS: u8 = 1;
pub const DEFAULT_OTP_DIGITS: u8 = 6;
pub const DEFAULT_DEVICE_NAME: &str = "nimble-server";

const MAX_DEVICE_NAME_LEN: usize = 24;

// ───────────────────────────────────────────────────────────────
// Typed configuration
// ───────────────────────────────────────────────────────────────

/// How the expected passcode is derived from `secret_passcode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    /// The secret itself is the passcode.
    #[default]
    Static,
    /// Counter-based one-time code keyed by the secret.
    Hotp,
    /// Time-based one-time code keyed by the secret.
    Totp,
}

/// GPIO driven while a client is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusIndicatorConfig {
    pub pin: u8,
    /// Drive the pin low while active.
    #[serde(default)]
    pub inverted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicConfig {
    pub uuid: Uuid,
    pub permissions: Permissions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawServerConfig")]
pub struct ServerConfig {
    pub services: Vec<ServiceConfig>,
    pub secret_passcode: String,
    pub security_mode: SecurityMode,
    /// Digits in a one-time code (HOTP/TOTP only).
    pub otp_digits: u8,
    /// Apply a start-advertising request at startup.
    pub start_advertising: bool,
    /// Apply a stop-advertising request at startup (after the start request).
    pub stop_advertising: bool,
    /// Wrong passcodes tolerated before the connection is dropped.
    pub max_passcode_attempts: u8,
    /// Minimum delay between a rejected passcode and the next submission.
    pub rejection_cooldown_ms: u32,
    /// Concurrent connections accepted; advertising pauses at this count.
    pub max_connections: u8,
    pub device_name: heapless::String<MAX_DEVICE_NAME_LEN>,
    /// Characteristic whose writes carry pinpad frames instead of commands.
    pub pinpad_uuid: Option<Uuid>,
    pub status_indicator: Option<StatusIndicatorConfig>,
}

impl ServerConfig {
    /// Configuration with every optional field at its default.
    pub fn new(services: Vec<ServiceConfig>, secret_passcode: &str) -> Result<Self, ConfigError> {
        let mut device_name = heapless::String::new();
        let _ = device_name.push_str(DEFAULT_DEVICE_NAME);
        let cfg = Self {
            services,
            secret_passcode: secret_passcode.into(),
            security_mode: SecurityMode::Static,
            otp_digits: DEFAULT_OTP_DIGITS,
            start_advertising: true,
            stop_advertising: false,
            max_passcode_attempts: DEFAULT_MAX_PASSCODE_ATTEMPTS,
            rejection_cooldown_ms: 0,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            device_name,
            pinpad_uuid: None,
            status_indicator: None,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: RawServerConfig = serde_json::from_str(text).map_err(|e| {
            warn!("config: {}", e);
            ConfigError::Parse
        })?;
        Self::try_from(raw)
    }

    /// Enforce every cross-field rule.  Call again after mutating fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_passcode.is_empty() {
            return Err(ConfigError::EmptyPasscode);
        }
        if !self.secret_passcode.is_ascii() {
            return Err(ConfigError::NonAsciiPasscode);
        }
        if self.max_passcode_attempts == 0 {
            return Err(ConfigError::OutOfRange("max_passcode_attempts must be at least 1"));
        }
        if self.max_connections == 0 || self.max_connections as usize > crate::connection::MAX_CONNECTIONS {
            return Err(ConfigError::OutOfRange("max_connections must be 1-4"));
        }
        if self.security_mode != SecurityMode::Static && !(6..=8).contains(&self.otp_digits) {
            return Err(ConfigError::OutOfRange("otp_digits must be 6-8"));
        }
        if self.device_name.is_empty() || !is_printable_ascii(&self.device_name) {
            return Err(ConfigError::OutOfRange("device_name must be printable ASCII"));
        }

        for (i, svc) in self.services.iter().enumerate() {
            if self.services[..i].iter().any(|s| s.uuid == svc.uuid) {
                return Err(ConfigError::DuplicateUuid(svc.uuid));
            }
            for (j, chr) in svc.characteristics.iter().enumerate() {
                if chr.permissions.is_empty() {
                    return Err(ConfigError::EmptyPermissions(chr.uuid));
                }
                if svc.characteristics[..j].iter().any(|c| c.uuid == chr.uuid) {
                    return Err(ConfigError::DuplicateUuid(chr.uuid));
                }
            }
        }

        if self.status_indicator.is_some_and(|s| s.pin > 48) {
            return Err(ConfigError::OutOfRange("status_indicator pin must be a GPIO number (0-48)"));
        }

        if let Some(pinpad) = self.pinpad_uuid {
            let writable = self
                .services
                .iter()
                .flat_map(|s| s.characteristics.iter())
                .any(|c| c.uuid == pinpad && c.permissions.contains(Permissions::WRITE));
            if !writable {
                return Err(ConfigError::InvalidPinpad);
            }
            if self.secret_passcode.contains(frame::SEPARATOR) {
                return Err(ConfigError::PasscodeContainsSeparator);
            }
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Raw schema
// ───────────────────────────────────────────────────────────────

/// Integer or hex string (`"0x180A"` / `"180A"`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HexValue {
    Int(u64),
    Text(String),
}

impl HexValue {
    fn to_u64(&self) -> Option<u64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Text(s) => {
                let s = s.trim();
                let digits = s
                    .strip_prefix("0x")
                    .or_else(|| s.strip_prefix("0X"))
                    .unwrap_or(s);
                u64::from_str_radix(digits, 16).ok()
            }
        }
    }
}

/// A single value or a list, like `permissions: read`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCharacteristic {
    uuid: Option<HexValue>,
    uuid128: Option<Vec<HexValue>>,
    permissions: OneOrMany,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawService {
    uuid: Option<HexValue>,
    uuid128: Option<Vec<HexValue>>,
    characteristics: Vec<RawCharacteristic>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawServerConfig {
    services: Vec<RawService>,
    secret_passcode: String,
    #[serde(default)]
    security_mode: SecurityMode,
    #[serde(default = "default_otp_digits")]
    otp_digits: u8,
    #[serde(default = "default_true")]
    start_advertising: bool,
    #[serde(default)]
    stop_advertising: bool,
    #[serde(default = "default_max_attempts")]
    max_passcode_attempts: u8,
    #[serde(default)]
    rejection_cooldown_ms: u32,
    #[serde(default = "default_max_connections")]
    max_connections: u8,
    #[serde(default)]
    device_name: Option<String>,
    #[serde(default)]
    pinpad_uuid: Option<String>,
    #[serde(default)]
    status_indicator: Option<StatusIndicatorConfig>,
}

fn default_true() -> bool {
    true
}

fn default_otp_digits() -> u8 {
    DEFAULT_OTP_DIGITS
}

fn default_max_attempts() -> u8 {
    DEFAULT_MAX_PASSCODE_ATTEMPTS
}

fn default_max_connections() -> u8 {
    DEFAULT_MAX_CONNECTIONS
}

fn resolve_uuid(uuid: Option<&HexValue>, uuid128: Option<&Vec<HexValue>>) -> Result<Uuid, ConfigError> {
    match (uuid, uuid128) {
        (Some(_), Some(_)) => Err(ConfigError::ConflictingUuid),
        (None, None) => Err(ConfigError::MissingUuid),
        (Some(v), None) => {
            let v = v.to_u64().ok_or(ConfigError::InvalidUuid16)?;
            u16::try_from(v)
                .map(Uuid::Uuid16)
                .map_err(|_| ConfigError::InvalidUuid16)
        }
        (None, Some(list)) => {
            if list.len() != 16 {
                return Err(ConfigError::InvalidUuid128Length(list.len()));
            }
            let mut bytes = [0u8; 16];
            for (dst, v) in bytes.iter_mut().zip(list) {
                let v = v.to_u64().ok_or(ConfigError::InvalidUuidByte)?;
                *dst = u8::try_from(v).map_err(|_| ConfigError::InvalidUuidByte)?;
            }
            Ok(Uuid::Uuid128(bytes))
        }
    }
}

impl TryFrom<RawCharacteristic> for CharacteristicConfig {
    type Error = ConfigError;

    fn try_from(raw: RawCharacteristic) -> Result<Self, Self::Error> {
        let uuid = resolve_uuid(raw.uuid.as_ref(), raw.uuid128.as_ref())?;
        let names = match raw.permissions {
            OneOrMany::One(name) => vec![name],
            OneOrMany::Many(names) => names,
        };
        let mut permissions = Permissions::empty();
        for name in &names {
            permissions |= Permissions::parse_name(name).ok_or(ConfigError::UnknownPermission)?;
        }
        if permissions.is_empty() {
            return Err(ConfigError::EmptyPermissions(uuid));
        }
        Ok(Self { uuid, permissions })
    }
}

impl TryFrom<RawService> for ServiceConfig {
    type Error = ConfigError;

    fn try_from(raw: RawService) -> Result<Self, Self::Error> {
        let uuid = resolve_uuid(raw.uuid.as_ref(), raw.uuid128.as_ref())?;
        let characteristics = raw
            .characteristics
            .into_iter()
            .map(CharacteristicConfig::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            uuid,
            characteristics,
        })
    }
}

impl TryFrom<RawServerConfig> for ServerConfig {
    type Error = ConfigError;

    fn try_from(raw: RawServerConfig) -> Result<Self, Self::Error> {
        let services = raw
            .services
            .into_iter()
            .map(ServiceConfig::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let mut device_name = heapless::String::new();
        device_name
            .push_str(raw.device_name.as_deref().unwrap_or(DEFAULT_DEVICE_NAME))
            .map_err(|()| ConfigError::OutOfRange("device_name must be at most 24 bytes"))?;

        let pinpad_uuid = raw
            .pinpad_uuid
            .as_deref()
            .map(str::parse::<Uuid>)
            .transpose()
            .map_err(|_| ConfigError::InvalidPinpad)?;

        let cfg = Self {
            services,
            secret_passcode: raw.secret_passcode,
            security_mode: raw.security_mode,
            otp_digits: raw.otp_digits,
            start_advertising: raw.start_advertising,
            stop_advertising: raw.stop_advertising,
            max_passcode_attempts: raw.max_passcode_attempts,
            rejection_cooldown_ms: raw.rejection_cooldown_ms,
            max_connections: raw.max_connections,
            device_name,
            pinpad_uuid,
            status_indicator: raw.status_indicator,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}
