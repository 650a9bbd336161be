//! Chassis Core Library
//!
//! The device state synchronization layer of the Chassis control panel.
//! Mirrors and mutates hardware-control state owned by two independent,
//! possibly-absent daemons plus a handful of sysfs sensors.
//!
//! # Components
//!
//! - `monitor` - service availability tracking with a fallback retry poll
//! - `platform` - async property client for the platform/power daemon
//!   (profile, charge limit, lamp LEDs) with optimistic and confirmed
//!   write disciplines
//! - `gfx` - the GPU mode-switch coordinator, including the
//!   session-restart-gated pending branch
//! - `controllers/` - thin consumers translating cache values into
//!   user-facing fields and forwarding validated commands downward
//!
//! Reads flow daemon → cache → controller; writes flow controller →
//! client → daemon, with the cache updated speculatively on the optimistic
//! write path before confirmation arrives on the read path.

pub mod constants;
pub mod controllers;
pub mod gfx;
pub mod monitor;
pub mod platform;
pub mod property;
pub mod settings;

// Re-export primary types
pub use gfx::{
    requires_session_restart, GfxClient, GfxEvent, GfxState, GpuMode, GpuPower, ALL_MODES,
};
pub use monitor::{MonitorEvent, MonitorState, ServiceEndpoint, ServiceMonitor};
pub use platform::{LampEffect, PlatformClient, PlatformEvent, PlatformState};
pub use property::{RemoteProperty, SubResource, WritePolicy};

// Re-export controllers
pub use controllers::{
    default_curve, glyph_command_map, validate_curve, BatteryController, FanController, FanKind,
    GlyphController, GpuController, LampController, LampMode, PerformanceController, GLYPH_MODES,
};

// Re-export settings
pub use settings::{
    load_settings, save_settings, settings_path, update_settings, AppSettings, CurvePoint,
    GeneralSettings, ProfileFanCurves, WindowSettings,
};

// Re-export error types
pub use ch_error::{PanelError, Result};

#[cfg(test)]
mod testutil;

#[cfg(test)]
mod sync_tests;
