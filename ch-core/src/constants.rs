//! Central constants for Chassis
//!
//! Service identities, object paths and timing knobs in one place.

/// Named services watched on the bus
pub mod services {
    /// Platform/power daemon (profiles, battery charge limit, lamp LEDs)
    pub const PLATFORM: &str = "io.chassis.Powerd";

    /// Graphics-mode daemon (GPU mode switching, dGPU power state)
    pub const GFX: &str = "io.chassis.Gfxd";

    /// Every service whose reachability the monitor tracks
    pub const WATCHED: &[&str] = &[PLATFORM, GFX];
}

/// Object paths exposed by the daemons
pub mod paths {
    /// Platform control object
    pub const PLATFORM: &str = "/io/chassis/platform";

    /// Parent of the lamp device object. The concrete child path depends on
    /// the attached hardware and is discovered through introspection.
    pub const LAMP_PARENT: &str = "/io/chassis/lamp";

    /// Graphics control object
    pub const GFX: &str = "/io/chassis/gfx";
}

/// Interface names used for property access and method calls
pub mod interfaces {
    pub const PLATFORM: &str = "io.chassis.Platform";
    pub const LAMP: &str = "io.chassis.Lamp";
    pub const GFX: &str = "io.chassis.Gfx";
}

/// Timing knobs
pub mod timing {
    use std::time::Duration;

    /// Fallback re-probe interval while any watched service is unreachable
    pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

    /// Battery status poll interval
    pub const BATTERY_POLL_INTERVAL: Duration = Duration::from_secs(5);
}

/// Auxiliary lighting display tool (no daemon property exists for it)
pub mod glyph {
    /// External CLI tool driving the lid lighting matrix
    pub const PROGRAM: &str = "glyphctl";

    /// Pseudo service name used when routing through the exec transport
    pub const SERVICE: &str = "glyphctl";
}
