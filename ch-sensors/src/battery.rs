//! Battery and AC adapter state
//!
//! Reads `<root>/class/power_supply/BAT0` and `AC0`. Power draw prefers the
//! kernel's `power_now` and falls back to `current_now * voltage_now`. Time
//! remaining is estimated from `energy_now / power_now`.

use std::path::{Path, PathBuf};

use crate::{read_sysfs_i64, read_sysfs_line};

const MICRO: f64 = 1_000_000.0;

/// Resolved battery/adapter directories
#[derive(Debug, Clone)]
pub struct BatteryPaths {
    pub battery_dir: PathBuf,
    pub ac_dir: PathBuf,
}

impl BatteryPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            battery_dir: root.join("class/power_supply/BAT0"),
            ac_dir: root.join("class/power_supply/AC0"),
        }
    }

    /// Whether a battery exists at all on this machine
    pub fn battery_present(&self) -> bool {
        self.battery_dir.exists()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatteryStatus {
    pub capacity_percent: Option<u32>,
    pub charging: bool,
    pub plugged_in: bool,
    pub power_draw_w: Option<f64>,
    pub time_remaining: Option<String>,
}

/// Read the full battery snapshot. Missing files leave their fields at the
/// unsupported default.
pub fn read_battery_status(paths: &BatteryPaths) -> BatteryStatus {
    let mut status = BatteryStatus::default();
    let battery = &paths.battery_dir;

    status.capacity_percent = read_sysfs_i64(&battery.join("capacity"))
        .and_then(|v| u32::try_from(v).ok())
        .map(|v| v.min(100));

    if let Some(state) = read_sysfs_line(&battery.join("status")) {
        status.charging = state == "Charging";
        status.plugged_in = matches!(state.as_str(), "Charging" | "Not charging" | "Full");
    }

    // The adapter's own online flag is authoritative when present
    if let Some(online) = read_sysfs_line(&paths.ac_dir.join("online")) {
        status.plugged_in = online == "1";
    }

    status.power_draw_w = read_power_draw(battery);
    status.time_remaining = estimate_time_remaining(battery, status.charging, status.plugged_in);
    status
}

fn read_power_draw(battery: &Path) -> Option<f64> {
    if let Some(power) = read_sysfs_i64(&battery.join("power_now")) {
        return Some(power as f64 / MICRO);
    }
    // Fallback: microamps * microvolts
    let current = read_sysfs_i64(&battery.join("current_now"))? as f64 / MICRO;
    let voltage = read_sysfs_i64(&battery.join("voltage_now"))? as f64 / MICRO;
    Some(current * voltage)
}

fn estimate_time_remaining(battery: &Path, charging: bool, plugged_in: bool) -> Option<String> {
    let energy_wh = read_sysfs_i64(&battery.join("energy_now"))? as f64 / MICRO;
    let power_w = read_sysfs_i64(&battery.join("power_now"))? as f64 / MICRO;

    if power_w <= 0.1 {
        return Some(if plugged_in {
            "Fully charged".to_string()
        } else {
            "Calculating...".to_string()
        });
    }

    let hours = energy_wh / power_w;
    let h = hours as u64;
    let m = ((hours - h as f64) * 60.0) as u64;
    Some(if charging {
        format!("{}h {}m until full", h, m)
    } else {
        format!("{}h {}m remaining", h, m)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write");
    }

    #[test]
    fn test_discharging_snapshot() {
        let root = tempfile::tempdir().expect("tempdir");
        let paths = BatteryPaths::new(root.path());
        let battery = &paths.battery_dir;

        write(&battery.join("capacity"), "73\n");
        write(&battery.join("status"), "Discharging\n");
        write(&battery.join("power_now"), "10000000\n");
        write(&battery.join("energy_now"), "35000000\n");
        write(&paths.ac_dir.join("online"), "0\n");

        let status = read_battery_status(&paths);
        assert_eq!(status.capacity_percent, Some(73));
        assert!(!status.charging);
        assert!(!status.plugged_in);
        assert_eq!(status.power_draw_w, Some(10.0));
        assert_eq!(status.time_remaining.as_deref(), Some("3h 30m remaining"));
    }

    #[test]
    fn test_charging_with_current_voltage_fallback() {
        let root = tempfile::tempdir().expect("tempdir");
        let paths = BatteryPaths::new(root.path());
        let battery = &paths.battery_dir;

        write(&battery.join("capacity"), "40\n");
        write(&battery.join("status"), "Charging\n");
        // No power_now: 2 A * 15 V = 30 W
        write(&battery.join("current_now"), "2000000\n");
        write(&battery.join("voltage_now"), "15000000\n");
        write(&paths.ac_dir.join("online"), "1\n");

        let status = read_battery_status(&paths);
        assert!(status.charging);
        assert!(status.plugged_in);
        assert_eq!(status.power_draw_w, Some(30.0));
        // No energy_now/power_now pair: estimate unsupported
        assert_eq!(status.time_remaining, None);
    }

    #[test]
    fn test_full_battery_message() {
        let root = tempfile::tempdir().expect("tempdir");
        let paths = BatteryPaths::new(root.path());
        let battery = &paths.battery_dir;

        write(&battery.join("status"), "Full\n");
        write(&battery.join("power_now"), "0\n");
        write(&battery.join("energy_now"), "50000000\n");

        let status = read_battery_status(&paths);
        assert!(status.plugged_in);
        assert_eq!(status.time_remaining.as_deref(), Some("Fully charged"));
    }

    #[test]
    fn test_missing_battery_is_unsupported() {
        let root = tempfile::tempdir().expect("tempdir");
        let paths = BatteryPaths::new(root.path());
        assert!(!paths.battery_present());

        let status = read_battery_status(&paths);
        assert_eq!(status, BatteryStatus::default());
    }
}
