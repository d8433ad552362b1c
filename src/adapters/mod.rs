//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements      | Connects to                       |
//! |--------------|-----------------|-----------------------------------|
//! | `radio`      | RadioPort       | Bluedroid GATT server / simulator |
//! | `status_pin` | StatusIndicator | any embedded-hal output pin       |
//! | `time`       | Clock           | ESP32 system timer / std::time    |

pub mod radio;
pub mod status_pin;
pub mod time;
pub(crate) mod utils;
