//! Characteristic permission flags.
//!
//! Bit values match the NimBLE `BLE_GATT_CHR_F_*` flags so a permission set
//! can be handed to the stack unchanged.

use bitflags::bitflags;

bitflags! {
    /// Set of operations a characteristic allows.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u16 {
        const READ = 0x0001;
        const WRITE = 0x0002;
        const NOTIFY = 0x0004;
    }
}

impl Permissions {
    /// Parse a single permission name, case-insensitively.
    pub fn parse_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("read") {
            Some(Self::READ)
        } else if name.eq_ignore_ascii_case("write") {
            Some(Self::WRITE)
        } else if name.eq_ignore_ascii_case("notify") {
            Some(Self::NOTIFY)
        } else {
            None
        }
    }
}
