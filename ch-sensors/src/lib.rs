//! Sysfs sensor access for Chassis
//!
//! Discovers and reads the handful of kernel-exposed values the panel
//! displays: CPU/GPU temperatures, fan speeds, APU power, display backlight
//! and battery state. Values arrive in fixed kernel scaling units
//! (millidegrees, microwatts, microvolts, microamps) and are converted here.
//!
//! Absence of a path means the feature is unsupported on this machine, not
//! an error: every read returns `Option`.
//!
//! All discovery is rooted at an injectable base directory (normally `/sys`)
//! so tests can run against temporary trees.

mod battery;
mod hwmon;
mod power;

pub use battery::{read_battery_status, BatteryPaths, BatteryStatus};
pub use hwmon::{discover, read_fan_rpm, read_power_w, read_temperature_c, BacklightPaths, SensorPaths};
pub use power::{estimate_display_power_w, estimate_system_power_w, MISC_POWER_ESTIMATE_W};

use std::path::Path;

/// Read a sysfs file and return its trimmed first line
pub(crate) fn read_sysfs_line(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    Some(content.lines().next().unwrap_or("").trim().to_string())
}

/// Read a sysfs file as an integer
pub(crate) fn read_sysfs_i64(path: &Path) -> Option<i64> {
    read_sysfs_line(path)?.parse().ok()
}
