//! Hwmon and backlight discovery
//!
//! Scans `<root>/class/hwmon` once, matching chips by driver name:
//! - CPU temperature: `k10temp` (AMD) or `coretemp` (Intel)
//! - GPU temperature and APU power: `amdgpu` or `nvidia`
//! - Fans: first chip exposing `fanN_input`, fan1 = CPU, fan2 = GPU
//!
//! Backlight comes from `<root>/class/backlight`, preferring the amdgpu
//! device when several are present.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::{read_sysfs_i64, read_sysfs_line};

/// Resolved sensor file paths for this machine. A `None` field means the
/// feature is unsupported here.
#[derive(Debug, Clone, Default)]
pub struct SensorPaths {
    pub cpu_temp: Option<PathBuf>,
    pub gpu_temp: Option<PathBuf>,
    pub cpu_fan: Option<PathBuf>,
    pub gpu_fan: Option<PathBuf>,
    pub apu_power: Option<PathBuf>,
    pub backlight: Option<BacklightPaths>,
}

#[derive(Debug, Clone)]
pub struct BacklightPaths {
    pub brightness: PathBuf,
    pub max_brightness: i64,
}

/// Scan the sysfs tree under `root` (normally `/sys`) for supported sensors
pub fn discover(root: &Path) -> SensorPaths {
    let mut paths = SensorPaths::default();

    let hwmon_dir = root.join("class/hwmon");
    if let Ok(entries) = fs::read_dir(&hwmon_dir) {
        for entry in entries.flatten() {
            let chip_path = entry.path();
            let Some(name) = read_sysfs_line(&chip_path.join("name")) else {
                continue;
            };
            trace!(chip = %name, path = ?chip_path, "Checking hwmon chip");

            match name.as_str() {
                "k10temp" | "coretemp" => {
                    if paths.cpu_temp.is_none() {
                        paths.cpu_temp = first_matching(&chip_path, "temp", "_input");
                        debug!(path = ?paths.cpu_temp, "Found CPU temperature");
                    }
                }
                "amdgpu" | "nvidia" => {
                    if paths.gpu_temp.is_none() {
                        paths.gpu_temp = first_matching(&chip_path, "temp", "_input");
                        debug!(path = ?paths.gpu_temp, "Found GPU temperature");
                    }
                    if paths.apu_power.is_none() {
                        let input = chip_path.join("power1_input");
                        let average = chip_path.join("power1_average");
                        if input.exists() {
                            paths.apu_power = Some(input);
                        } else if average.exists() {
                            paths.apu_power = Some(average);
                        }
                        debug!(path = ?paths.apu_power, "Found APU power");
                    }
                }
                _ => {}
            }

            // Fans: by convention fan1 is the CPU fan, fan2 the GPU fan
            if paths.cpu_fan.is_none() {
                let fan1 = chip_path.join("fan1_input");
                if fan1.exists() {
                    paths.cpu_fan = Some(fan1);
                    let fan2 = chip_path.join("fan2_input");
                    if fan2.exists() {
                        paths.gpu_fan = Some(fan2);
                    }
                    debug!(chip = %name, "Found fan sensors");
                }
            }
        }
    }

    paths.backlight = discover_backlight(root);
    paths
}

fn discover_backlight(root: &Path) -> Option<BacklightPaths> {
    let backlight_dir = root.join("class/backlight");
    let mut found: Option<(String, PathBuf)> = None;

    for entry in fs::read_dir(&backlight_dir).ok()?.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_preferred = name.starts_with("amdgpu");
        match &found {
            // Prefer the amdgpu backlight over others
            Some((existing, _)) if !is_preferred || existing.starts_with("amdgpu") => {}
            _ => found = Some((name, entry.path())),
        }
    }

    let (_, dir) = found?;
    let max_brightness = read_sysfs_i64(&dir.join("max_brightness"))?;
    if max_brightness <= 0 {
        return None;
    }
    Some(BacklightPaths {
        brightness: dir.join("brightness"),
        max_brightness,
    })
}

fn first_matching(chip_path: &Path, prefix: &str, suffix: &str) -> Option<PathBuf> {
    let mut names: Vec<String> = fs::read_dir(chip_path)
        .ok()?
        .flatten()
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            (name.starts_with(prefix) && name.ends_with(suffix)).then_some(name)
        })
        .collect();
    names.sort();
    names.first().map(|n| chip_path.join(n))
}

// ============================================================================
// Scaled Reads
// ============================================================================

/// Read a temperature file (millidegrees Celsius) as whole degrees
pub fn read_temperature_c(path: &Path) -> Option<i32> {
    let millidegrees = read_sysfs_i64(path)?;
    Some((millidegrees / 1000) as i32)
}

/// Read a fan speed file (RPM)
pub fn read_fan_rpm(path: &Path) -> Option<u32> {
    let rpm = read_sysfs_i64(path)?;
    u32::try_from(rpm).ok()
}

/// Read a power file (microwatts) as watts
pub fn read_power_w(path: &Path) -> Option<f64> {
    let microwatts = read_sysfs_i64(path)?;
    Some(microwatts as f64 / 1_000_000.0)
}

impl BacklightPaths {
    /// Current brightness as a percentage of the maximum
    pub fn read_percent(&self) -> Option<u32> {
        let brightness = read_sysfs_i64(&self.brightness)?;
        Some(((brightness * 100) / self.max_brightness).clamp(0, 100) as u32)
    }
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
    fn test_discover_and_read() {
        let root = tempfile::tempdir().expect("tempdir");
        let root = root.path();

        let cpu_chip = root.join("class/hwmon/hwmon0");
        write(&cpu_chip.join("name"), "k10temp\n");
        write(&cpu_chip.join("temp1_input"), "54250\n");

        let gpu_chip = root.join("class/hwmon/hwmon1");
        write(&gpu_chip.join("name"), "amdgpu\n");
        write(&gpu_chip.join("temp1_input"), "47000\n");
        write(&gpu_chip.join("power1_input"), "12500000\n");

        let fan_chip = root.join("class/hwmon/hwmon2");
        write(&fan_chip.join("name"), "platform_wmi\n");
        write(&fan_chip.join("fan1_input"), "3200\n");
        write(&fan_chip.join("fan2_input"), "2800\n");

        let paths = discover(root);

        assert_eq!(
            read_temperature_c(paths.cpu_temp.as_ref().expect("cpu temp")),
            Some(54)
        );
        assert_eq!(
            read_temperature_c(paths.gpu_temp.as_ref().expect("gpu temp")),
            Some(47)
        );
        assert_eq!(
            read_power_w(paths.apu_power.as_ref().expect("apu power")),
            Some(12.5)
        );
        assert_eq!(read_fan_rpm(paths.cpu_fan.as_ref().expect("cpu fan")), Some(3200));
        assert_eq!(read_fan_rpm(paths.gpu_fan.as_ref().expect("gpu fan")), Some(2800));
    }

    #[test]
    fn test_missing_paths_are_unsupported() {
        let root = tempfile::tempdir().expect("tempdir");
        let paths = discover(root.path());
        assert!(paths.cpu_temp.is_none());
        assert!(paths.gpu_temp.is_none());
        assert!(paths.backlight.is_none());

        // Reading a nonexistent file is None, never an error
        assert_eq!(read_temperature_c(Path::new("/nonexistent/temp1_input")), None);
    }

    #[test]
    fn test_backlight_percent() {
        let root = tempfile::tempdir().expect("tempdir");
        let root = root.path();
        let dir = root.join("class/backlight/amdgpu_bl0");
        write(&dir.join("max_brightness"), "255\n");
        write(&dir.join("brightness"), "128\n");

        let paths = discover(root);
        let backlight = paths.backlight.expect("backlight");
        assert_eq!(backlight.read_percent(), Some(50));
    }

    #[test]
    fn test_backlight_prefers_amdgpu() {
        let root = tempfile::tempdir().expect("tempdir");
        let root = root.path();
        let nvidia = root.join("class/backlight/nvidia_0");
        write(&nvidia.join("max_brightness"), "100\n");
        write(&nvidia.join("brightness"), "10\n");
        let amd = root.join("class/backlight/amdgpu_bl0");
        write(&amd.join("max_brightness"), "200\n");
        write(&amd.join("brightness"), "100\n");

        let paths = discover(root);
        let backlight = paths.backlight.expect("backlight");
        assert_eq!(backlight.max_brightness, 200);
    }
}
