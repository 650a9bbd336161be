//! Controllers
//!
//! Thin consumers of the synchronization core: they translate cached daemon
//! state into user-facing fields, validate inputs, and forward commands
//! downward. Each holds a constructor-injected client handle; none reach
//! into process-wide state.

pub mod battery;
pub mod fan;
pub mod glyph;
pub mod gpu;
pub mod lamp;
pub mod performance;

pub use battery::BatteryController;
pub use fan::{default_curve, validate_curve, FanController, FanKind};
pub use glyph::{glyph_command_map, GlyphController, GLYPH_MODES};
pub use gpu::GpuController;
pub use lamp::{LampController, LampMode};
pub use performance::PerformanceController;
