//! Unified error types for the GATT server.
//!
//! A single top-level [`Error`] that every subsystem converts into, keeping
//! the dispatch loop's error handling uniform.  Subsystem errors stay small
//! and `Clone` so they can be returned straight to the radio stack.

use core::fmt;

use crate::gatt::uuid::Uuid;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Startup configuration is malformed.
    Config(ConfigError),
    /// Attribute registry rejected an operation.
    Registry(RegistryError),
    /// Pairing gate refused a submission.
    Pairing(PairingError),
    /// A GATT request could not be served.
    Gatt(GattError),
    /// The radio driver failed to carry out a request.
    Radio(RadioError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Registry(e) => write!(f, "registry: {e}"),
            Self::Pairing(e) => write!(f, "pairing: {e}"),
            Self::Gatt(e) => write!(f, "gatt: {e}"),
            Self::Radio(e) => write!(f, "radio: {e}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The same UUID appears twice at one scope.
    DuplicateUuid(Uuid),
    /// A characteristic allows no operation at all.
    EmptyPermissions(Uuid),
    /// Both `uuid` and `uuid128` were given.
    ConflictingUuid,
    /// Neither `uuid` nor `uuid128` was given.
    MissingUuid,
    /// A 16-bit UUID string is not valid hex or out of range.
    InvalidUuid16,
    /// `uuid128` did not contain exactly 16 bytes (carries the actual count).
    InvalidUuid128Length(usize),
    /// A `uuid128` entry is not a valid byte.
    InvalidUuidByte,
    /// Permission name is not one of read / write / notify.
    UnknownPermission,
    /// Passcode contains non-ASCII characters.
    NonAsciiPasscode,
    /// Passcode is empty.
    EmptyPasscode,
    /// A scalar field is out of range.  Describes which field and why.
    OutOfRange(&'static str),
    /// `pinpad_uuid` does not name a Write-permitted characteristic.
    InvalidPinpad,
    /// Passcode contains the pinpad frame separator, so it could never be
    /// entered through the pinpad.
    PasscodeContainsSeparator,
    /// Document could not be parsed at all.
    Parse,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateUuid(u) => write!(f, "duplicate UUID {u}"),
            Self::EmptyPermissions(u) => write!(f, "characteristic {u} has no permissions"),
            Self::ConflictingUuid => write!(f, "cannot specify both uuid and uuid128"),
            Self::MissingUuid => write!(f, "must specify either uuid or uuid128"),
            Self::InvalidUuid16 => write!(f, "uuid must be a 16-bit hex value"),
            Self::InvalidUuid128Length(n) => write!(f, "uuid128 must be a list of 16 bytes (got {n})"),
            Self::InvalidUuidByte => write!(f, "uuid128 entries must be byte values"),
            Self::UnknownPermission => write!(f, "permission must be one of read, write, notify"),
            Self::NonAsciiPasscode => write!(f, "pin must consist of only ascii characters"),
            Self::EmptyPasscode => write!(f, "secret passcode must not be empty"),
            Self::OutOfRange(msg) => write!(f, "out of range: {msg}"),
            Self::InvalidPinpad => write!(f, "pinpad_uuid must name a writable characteristic"),
            Self::PasscodeContainsSeparator => {
                write!(f, "secret passcode must not contain ':' when a pinpad is configured")
            }
            Self::Parse => write!(f, "malformed configuration document"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The service definition itself is invalid.
    Config(ConfigError),
    /// Registration attempted after the server started serving.
    Frozen,
    /// Fixed capacity of the attribute table exhausted.
    Full,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{e}"),
            Self::Frozen => write!(f, "registry is frozen"),
            Self::Full => write!(f, "attribute table full"),
        }
    }
}

impl From<ConfigError> for RegistryError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

// ---------------------------------------------------------------------------
// Pairing errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingError {
    /// Wrong passcode.
    AuthenticationFailed,
    /// Attempt threshold exceeded; the connection is dropped.
    TooManyAttempts,
    /// Gated operation attempted while unauthenticated.
    NotAuthenticated,
    /// Submission arrived inside the post-rejection cooldown.
    CoolingDown,
    /// Time-based codes need a synchronised wall clock.
    ClockUnavailable,
    /// Pinpad frame could not be parsed.
    MalformedFrame,
}

impl fmt::Display for PairingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenticationFailed => write!(f, "authentication failed"),
            Self::TooManyAttempts => write!(f, "too many attempts"),
            Self::NotAuthenticated => write!(f, "not authenticated"),
            Self::CoolingDown => write!(f, "retry attempted during cooldown"),
            Self::ClockUnavailable => write!(f, "wall clock not synchronised"),
            Self::MalformedFrame => write!(f, "malformed pinpad frame"),
        }
    }
}

impl From<PairingError> for Error {
    fn from(e: PairingError) -> Self {
        Self::Pairing(e)
    }
}

// ---------------------------------------------------------------------------
// GATT errors
// ---------------------------------------------------------------------------

/// Errors returned to the BLE stack for a GATT request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattError {
    /// Connection handle unknown (never connected or already dropped).
    InvalidConnection,
    /// Attribute handle does not name a characteristic value.
    InvalidHandle,
    ReadNotPermitted,
    WriteNotPermitted,
    NotifyNotPermitted,
    /// Value exceeds the maximum attribute length.
    InvalidValueLength,
    /// Read Blob offset lies past the end of the value.
    InvalidOffset,
    /// Subscriber set for this characteristic is full.
    InsufficientResources,
    /// Write rejected by the pairing gate.
    Pairing(PairingError),
}

impl GattError {
    /// ATT protocol error code to hand back to the stack.
    pub const fn att_code(self) -> u8 {
        match self {
            Self::InvalidConnection => 0x0E,
            Self::InvalidHandle => 0x01,
            Self::ReadNotPermitted => 0x02,
            Self::WriteNotPermitted | Self::NotifyNotPermitted => 0x03,
            Self::InvalidValueLength => 0x0D,
            Self::InvalidOffset => 0x07,
            Self::InsufficientResources => 0x11,
            Self::Pairing(_) => 0x05,
        }
    }
}

impl fmt::Display for GattError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConnection => write!(f, "invalid connection handle"),
            Self::InvalidHandle => write!(f, "invalid attribute handle"),
            Self::ReadNotPermitted => write!(f, "read not permitted"),
            Self::WriteNotPermitted => write!(f, "write not permitted"),
            Self::NotifyNotPermitted => write!(f, "notify not permitted"),
            Self::InvalidValueLength => write!(f, "invalid attribute value length"),
            Self::InvalidOffset => write!(f, "invalid offset"),
            Self::InsufficientResources => write!(f, "insufficient resources"),
            Self::Pairing(e) => write!(f, "{e}"),
        }
    }
}

impl From<PairingError> for GattError {
    fn from(e: PairingError) -> Self {
        Self::Pairing(e)
    }
}

impl From<GattError> for Error {
    fn from(e: GattError) -> Self {
        Self::Gatt(e)
    }
}

// ---------------------------------------------------------------------------
// Radio errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// Driver returned a non-zero status code.
    Driver(i32),
    /// Stack not initialised.
    NotReady,
    /// Operation referenced a connection the driver does not know.
    UnknownConnection,
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver(code) => write!(f, "driver error {code}"),
            Self::NotReady => write!(f, "radio not ready"),
            Self::UnknownConnection => write!(f, "unknown connection"),
        }
    }
}

impl From<RadioError> for Error {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
