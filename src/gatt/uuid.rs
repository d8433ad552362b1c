//! Bluetooth UUIDs in their two GATT forms.
//!
//! 16-bit values are SIG-assigned short forms; 128-bit values are custom
//! UUIDs kept as a byte array in wire (little-endian) order, exactly as the
//! radio stack expects them.  Equality and ordering are per variant: a
//! 16-bit UUID never equals a 128-bit one, even if the latter expands from
//! the Bluetooth base UUID.

use core::fmt;
use core::str::FromStr;

/// A service or characteristic UUID.  Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Uuid {
    /// 16-bit SIG-assigned UUID.
    Uuid16(u16),
    /// 128-bit UUID, bytes in wire order.
    Uuid128([u8; 16]),
}

impl Uuid {
    /// Build a 128-bit UUID from its conventional big-endian `u128` spelling
    /// (`0x4a650001_b7e4_...`).
    pub const fn from_u128(value: u128) -> Self {
        Uuid::Uuid128(value.to_le_bytes())
    }

    /// Wire bytes: 2 for a 16-bit UUID, 16 for a 128-bit one.
    pub fn to_wire_bytes(&self) -> heapless::Vec<u8, 16> {
        let mut out = heapless::Vec::new();
        match self {
            Uuid::Uuid16(v) => {
                let _ = out.extend_from_slice(&v.to_le_bytes());
            }
            Uuid::Uuid128(bytes) => {
                let _ = out.extend_from_slice(bytes);
            }
        }
        out
    }

    pub const fn as_u16(&self) -> Option<u16> {
        match self {
            Uuid::Uuid16(v) => Some(*v),
            Uuid::Uuid128(_) => None,
        }
    }

    pub const fn is_128(&self) -> bool {
        matches!(self, Uuid::Uuid128(_))
    }
}

impl From<u16> for Uuid {
    fn from(value: u16) -> Self {
        Uuid::Uuid16(value)
    }
}

impl From<[u8; 16]> for Uuid {
    /// Assumes bytes are in wire order.
    fn from(bytes: [u8; 16]) -> Self {
        Uuid::Uuid128(bytes)
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uuid::Uuid16(v) => write!(f, "0x{v:04X}"),
            Uuid::Uuid128(b) => write!(
                f,
                "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
                b[15], b[14], b[13], b[12],
                b[11], b[10],
                b[9], b[8],
                b[7], b[6],
                b[5], b[4], b[3], b[2], b[1], b[0]
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UuidParseError {
    InvalidLength,
    InvalidHex,
}

impl fmt::Display for UuidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength => write!(f, "UUID must have 4 or 32 hex digits"),
            Self::InvalidHex => write!(f, "UUID contains non-hex characters"),
        }
    }
}

impl FromStr for Uuid {
    type Err = UuidParseError;

    /// Accepts `180A`, `0x180A` and the hyphenated 128-bit form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        let mut digits: heapless::Vec<u8, 32> = heapless::Vec::new();
        for c in s.bytes().filter(|&c| c != b'-') {
            if !c.is_ascii_hexdigit() {
                return Err(UuidParseError::InvalidHex);
            }
            digits.push(c).map_err(|_| UuidParseError::InvalidLength)?;
        }

        match digits.len() {
            4 => {
                let text = core::str::from_utf8(&digits).map_err(|_| UuidParseError::InvalidHex)?;
                let v = u16::from_str_radix(text, 16).map_err(|_| UuidParseError::InvalidHex)?;
                Ok(Uuid::Uuid16(v))
            }
            32 => {
                let mut bytes = [0u8; 16];
                for (i, pair) in digits.chunks(2).enumerate() {
                    let text = core::str::from_utf8(pair).map_err(|_| UuidParseError::InvalidHex)?;
                    // Text is big-endian; storage is wire order.
                    bytes[15 - i] =
                        u8::from_str_radix(text, 16).map_err(|_| UuidParseError::InvalidHex)?;
                }
                Ok(Uuid::Uuid128(bytes))
            }
            _ => Err(UuidParseError::InvalidLength),
        }
    }
}
