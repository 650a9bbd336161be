//! Fan curve controller
//!
//! Holds the per-profile fan curves, validates edits, persists them through
//! the settings store and forwards them to the platform daemon.

use std::sync::Arc;

use ch_error::{PanelError, Result};
use tokio::sync::broadcast;
use tracing::debug;

use crate::platform::{PlatformClient, PlatformEvent};
use crate::settings::{AppSettings, CurvePoint, ProfileFanCurves};

/// Which fan a curve drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanKind {
    Cpu,
    Gpu,
}

impl FanKind {
    pub fn code(self) -> u32 {
        match self {
            Self::Cpu => 0,
            Self::Gpu => 1,
        }
    }
}

/// Highest profile index with a dedicated default table
const MAX_PROFILE: u32 = 2;

/// Built-in curve for a profile: Quiet ramps late, Performance ramps early
pub fn default_curve(profile: u32) -> Vec<CurvePoint> {
    let table: &[(u8, u8)] = match profile {
        0 => &[
            (30, 0),
            (45, 10),
            (55, 25),
            (65, 40),
            (75, 55),
            (85, 70),
            (95, 85),
            (100, 100),
        ],
        2 => &[
            (30, 10),
            (40, 25),
            (50, 40),
            (60, 55),
            (70, 70),
            (80, 85),
            (90, 95),
            (100, 100),
        ],
        // Balanced, also the fallback for unknown profiles
        _ => &[
            (30, 0),
            (40, 15),
            (50, 30),
            (60, 45),
            (70, 60),
            (80, 75),
            (90, 90),
            (100, 100),
        ],
    };
    table
        .iter()
        .map(|&(temp, fan)| CurvePoint { temp, fan })
        .collect()
}

/// A usable curve has at least two points, strictly ascending temperatures
/// and duty values within 0-100%
pub fn validate_curve(points: &[CurvePoint]) -> Result<()> {
    if points.len() < 2 {
        return Err(PanelError::invalid_argument(
            "Fan curve needs at least two points",
        ));
    }
    for pair in points.windows(2) {
        if pair[1].temp <= pair[0].temp {
            return Err(PanelError::invalid_argument(format!(
                "Curve temperatures must be strictly ascending ({} after {})",
                pair[1].temp, pair[0].temp
            )));
        }
    }
    if let Some(point) = points.iter().find(|p| p.fan > 100 || p.temp > 100) {
        return Err(PanelError::invalid_argument(format!(
            "Curve point out of range: {}°C / {}%",
            point.temp, point.fan
        )));
    }
    Ok(())
}

pub struct FanController {
    client: Arc<PlatformClient>,
    curves: Vec<ProfileFanCurves>,
}

impl FanController {
    /// Build from persisted settings; profiles without a saved curve fall
    /// back to the built-in tables.
    pub fn new(client: Arc<PlatformClient>, settings: &AppSettings) -> Self {
        Self {
            client,
            curves: settings.fan_curves.clone(),
        }
    }

    pub async fn available(&self) -> bool {
        self.client.available().await
    }

    /// The active curve for a profile and fan
    pub fn curve(&self, profile: u32, kind: FanKind) -> Vec<CurvePoint> {
        self.curves
            .iter()
            .find(|c| c.profile == profile)
            .map(|c| match kind {
                FanKind::Cpu => c.cpu.clone(),
                FanKind::Gpu => c.gpu.clone(),
            })
            .filter(|points| !points.is_empty())
            .unwrap_or_else(|| default_curve(profile))
    }

    /// Validate, remember and forward a curve for one profile/fan
    pub async fn set_curve(
        &mut self,
        profile: u32,
        kind: FanKind,
        points: Vec<CurvePoint>,
        enabled: bool,
    ) -> Result<()> {
        if !self.client.available().await {
            return Err(PanelError::generic("Fan control is not available"));
        }
        if profile > MAX_PROFILE {
            return Err(PanelError::invalid_argument(format!(
                "Invalid profile: {}",
                profile
            )));
        }
        validate_curve(&points)?;

        let index = match self.curves.iter().position(|c| c.profile == profile) {
            Some(index) => index,
            None => {
                self.curves.push(ProfileFanCurves {
                    profile,
                    cpu: Vec::new(),
                    cpu_enabled: true,
                    gpu: Vec::new(),
                    gpu_enabled: true,
                });
                self.curves.len() - 1
            }
        };
        let entry = &mut self.curves[index];
        match kind {
            FanKind::Cpu => {
                entry.cpu = points.clone();
                entry.cpu_enabled = enabled;
            }
            FanKind::Gpu => {
                entry.gpu = points.clone();
                entry.gpu_enabled = enabled;
            }
        }

        debug!(profile, ?kind, points = points.len(), enabled, "Setting fan curve");
        let pairs = points.iter().map(|p| (p.temp, p.fan)).collect();
        self.client.set_fan_curve(profile, kind.code(), pairs, enabled);
        Ok(())
    }

    /// Drop a profile's curves back to the built-in tables
    pub async fn reset_to_defaults(&mut self, profile: u32) -> Result<()> {
        if !self.client.available().await {
            return Err(PanelError::generic("Fan control is not available"));
        }
        self.curves.retain(|c| c.profile != profile);
        for kind in [FanKind::Cpu, FanKind::Gpu] {
            let points = default_curve(profile);
            let pairs = points.iter().map(|p| (p.temp, p.fan)).collect();
            self.client.set_fan_curve(profile, kind.code(), pairs, true);
        }
        Ok(())
    }

    /// Current curve set, for persisting into settings
    pub fn to_settings(&self) -> Vec<ProfileFanCurves> {
        self.curves.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.client.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_curves_are_valid() {
        for profile in 0..=3 {
            let curve = default_curve(profile);
            validate_curve(&curve).expect("default curve must validate");
            assert_eq!(curve.len(), 8);
            assert_eq!(curve.last().map(|p| p.fan), Some(100));
        }
    }

    #[test]
    fn test_quiet_ramps_later_than_performance() {
        let quiet = default_curve(0);
        let performance = default_curve(2);
        for (q, p) in quiet.iter().zip(performance.iter()) {
            assert!(q.fan <= p.fan, "quiet must never exceed performance duty");
        }
    }

    #[test]
    fn test_validate_rejects_bad_curves() {
        assert!(validate_curve(&[]).is_err());
        assert!(validate_curve(&[CurvePoint { temp: 50, fan: 50 }]).is_err());

        let unordered = [
            CurvePoint { temp: 50, fan: 40 },
            CurvePoint { temp: 50, fan: 60 },
        ];
        assert!(validate_curve(&unordered).is_err());

        let out_of_range = [
            CurvePoint { temp: 40, fan: 20 },
            CurvePoint { temp: 80, fan: 101 },
        ];
        assert!(validate_curve(&out_of_range).is_err());
    }
}
