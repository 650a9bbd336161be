//! Whole-system power estimation
//!
//! There is no single sensor for total draw, so the panel estimates it. On
//! battery the discharge rate already covers everything except the display
//! backlight; on AC the estimate is built from the APU sensor plus fixed
//! allowances.

/// Display power at 0% brightness (watts)
const MIN_DISPLAY_POWER_W: f64 = 2.0;

/// Display power at 100% brightness (watts)
const MAX_DISPLAY_POWER_W: f64 = 15.0;

/// Fixed allowance for SSD, WiFi, RAM, fans and the rest (watts)
pub const MISC_POWER_ESTIMATE_W: f64 = 5.0;

/// Linear display power estimate from backlight brightness
pub fn estimate_display_power_w(brightness_percent: u32) -> f64 {
    let fraction = f64::from(brightness_percent.min(100)) / 100.0;
    MIN_DISPLAY_POWER_W + (MAX_DISPLAY_POWER_W - MIN_DISPLAY_POWER_W) * fraction
}

/// Estimate total system draw in watts
pub fn estimate_system_power_w(
    on_battery: bool,
    battery_draw_w: Option<f64>,
    apu_power_w: Option<f64>,
    display_power_w: f64,
) -> f64 {
    match battery_draw_w {
        Some(draw) if on_battery && draw > 0.1 => draw + display_power_w,
        _ => apu_power_w.unwrap_or(0.0) + display_power_w + MISC_POWER_ESTIMATE_W,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_power_endpoints() {
        assert_eq!(estimate_display_power_w(0), 2.0);
        assert_eq!(estimate_display_power_w(100), 15.0);
        assert_eq!(estimate_display_power_w(150), 15.0, "clamped above 100%");
        let mid = estimate_display_power_w(50);
        assert!((mid - 8.5).abs() < 1e-9);
    }

    #[test]
    fn test_system_power_on_battery() {
        let power = estimate_system_power_w(true, Some(12.0), Some(20.0), 5.0);
        assert!((power - 17.0).abs() < 1e-9, "battery draw + display, APU ignored");
    }

    #[test]
    fn test_system_power_on_ac() {
        let power = estimate_system_power_w(false, None, Some(20.0), 5.0);
        assert!((power - 30.0).abs() < 1e-9, "APU + display + misc");
    }

    #[test]
    fn test_negligible_battery_draw_falls_back() {
        let power = estimate_system_power_w(true, Some(0.05), Some(10.0), 5.0);
        assert!((power - 20.0).abs() < 1e-9);
    }
}
