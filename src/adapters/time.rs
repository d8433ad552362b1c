//! System clock adapter.
//!
//! - **`target_os = "espidf"`**: `esp_timer_get_time()` for uptime and
//!   `gettimeofday()` for wall-clock time (valid once SNTP has synced).
//! - **`not(target_os = "espidf")`**: `std::time` for host-side tests.

use crate::app::ports::Clock;

/// Wall-clock readings before 2020-01-01 mean the RTC was never set.
const EPOCH_2020: u64 = 1_577_836_800;

pub struct SystemClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }
}

#[cfg(target_os = "espidf")]
impl Clock for SystemClock {
    fn uptime_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    fn unix_time_secs(&self) -> Option<u64> {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return None;
        }
        let secs = u64::try_from(tv.tv_sec).ok()?;
        (secs >= EPOCH_2020).then_some(secs)
    }
}

#[cfg(not(target_os = "espidf"))]
impl Clock for SystemClock {
    fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn unix_time_secs(&self) -> Option<u64> {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?
            .as_secs();
        (secs >= EPOCH_2020).then_some(secs)
    }
}
