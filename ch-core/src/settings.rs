//! Application Settings
//!
//! Persistent settings stored as JSON in ~/.config/chassis/settings.json.
//! Controllers read these at startup and write them on change; nothing here
//! talks to the daemons.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use ch_error::{PanelError, Result};

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppSettings {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub window: WindowSettings,

    /// Per-profile fan curves
    #[serde(default)]
    pub fan_curves: Vec<ProfileFanCurves>,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralSettings {
    /// Start the panel at session login
    #[serde(default)]
    pub start_at_login: bool,

    /// Start hidden in the tray
    #[serde(default)]
    pub start_minimized: bool,

    /// Platform profile applied at startup
    #[serde(default = "default_profile")]
    pub default_profile: u32,

    /// GPU mode code requested at startup, if any
    #[serde(default)]
    pub default_gpu_mode: Option<u32>,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            start_at_login: false,
            start_minimized: false,
            default_profile: default_profile(),
            default_gpu_mode: None,
        }
    }
}

/// Window geometry (saved on close)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WindowSettings {
    #[serde(default)]
    pub x: Option<i32>,
    #[serde(default)]
    pub y: Option<i32>,
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
    #[serde(default)]
    pub maximized: Option<bool>,
}

/// One point on a fan curve: fan duty percent at a temperature
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurvePoint {
    pub temp: u8,
    pub fan: u8,
}

/// Fan curves bound to one platform profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileFanCurves {
    pub profile: u32,
    #[serde(default)]
    pub cpu: Vec<CurvePoint>,
    #[serde(default = "default_true")]
    pub cpu_enabled: bool,
    #[serde(default)]
    pub gpu: Vec<CurvePoint>,
    #[serde(default = "default_true")]
    pub gpu_enabled: bool,
}

fn default_profile() -> u32 {
    1 // Balanced
}

fn default_true() -> bool {
    true
}

/// Get the settings file path: ~/.config/chassis/settings.json
pub fn settings_path() -> Result<PathBuf> {
    let config_dir = if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg)
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config")
    } else {
        dirs::config_dir()
            .ok_or_else(|| PanelError::config("Could not determine config directory"))?
    };

    let chassis_dir = config_dir.join("chassis");
    if !chassis_dir.exists() {
        fs::create_dir_all(&chassis_dir)
            .map_err(|e| PanelError::config(format!("Failed to create config directory: {}", e)))?;
    }
    Ok(chassis_dir.join("settings.json"))
}

/// Load settings, returning defaults when no file exists yet
pub fn load_settings() -> Result<AppSettings> {
    load_settings_from(&settings_path()?)
}

pub fn load_settings_from(path: &Path) -> Result<AppSettings> {
    if !path.exists() {
        return Ok(AppSettings::default());
    }
    let content = fs::read_to_string(path)
        .map_err(|e| PanelError::config(format!("Failed to read settings file: {}", e)))?;
    serde_json::from_str(&content)
        .map_err(|e| PanelError::config(format!("Failed to parse settings JSON: {}", e)))
}

/// Save settings with an atomic write (temp file + rename) so a crash
/// mid-write cannot corrupt the file
pub fn save_settings(settings: &AppSettings) -> Result<()> {
    save_settings_to(&settings_path()?, settings)
}

pub fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<()> {
    use std::io::Write;

    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| PanelError::config(format!("Failed to serialize settings: {}", e)))?;

    let temp_path = path.with_extension("json.tmp");
    let mut file = fs::File::create(&temp_path)
        .map_err(|e| PanelError::config(format!("Failed to create temp file: {}", e)))?;
    file.write_all(json.as_bytes())
        .map_err(|e| PanelError::config(format!("Failed to write temp file: {}", e)))?;
    file.sync_all()
        .map_err(|e| PanelError::config(format!("Failed to sync temp file: {}", e)))?;
    drop(file);

    fs::rename(&temp_path, path)
        .map_err(|e| PanelError::config(format!("Failed to rename temp file: {}", e)))?;
    Ok(())
}

/// Load, mutate and save in one step
pub fn update_settings<F>(updater: F) -> Result<AppSettings>
where
    F: FnOnce(&mut AppSettings),
{
    let mut settings = load_settings()?;
    updater(&mut settings);
    save_settings(&settings)?;
    Ok(settings)
}
