//! Performance profile controller

use std::sync::Arc;

use ch_error::{PanelError, Result};
use tokio::sync::broadcast;

use crate::platform::{PlatformClient, PlatformEvent};

/// Quiet / Balanced / Performance, as enumerated by the platform daemon
pub const PROFILE_QUIET: u32 = 0;
pub const PROFILE_BALANCED: u32 = 1;
pub const PROFILE_PERFORMANCE: u32 = 2;

pub struct PerformanceController {
    client: Arc<PlatformClient>,
}

impl PerformanceController {
    pub fn new(client: Arc<PlatformClient>) -> Self {
        Self { client }
    }

    pub async fn available(&self) -> bool {
        self.client.available().await
    }

    pub async fn current_profile(&self) -> Option<u32> {
        self.client.snapshot().await.profile()
    }

    pub async fn current_profile_name(&self) -> &'static str {
        match self.current_profile().await {
            Some(profile) => Self::profile_name(profile),
            None => "Unknown",
        }
    }

    /// Request a profile change. Out-of-range profiles are rejected here,
    /// before any cache mutation or command.
    pub async fn set_profile(&self, profile: u32) -> Result<()> {
        if !self.client.available().await {
            return Err(PanelError::generic("Performance control is not available"));
        }
        if profile > PROFILE_PERFORMANCE {
            return Err(PanelError::invalid_argument(format!(
                "Invalid profile: {}",
                profile
            )));
        }
        self.client.set_profile(profile);
        Ok(())
    }

    pub fn refresh(&self) {
        self.client.refresh();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.client.subscribe()
    }

    pub fn profile_name(profile: u32) -> &'static str {
        match profile {
            PROFILE_QUIET => "Silent",
            PROFILE_BALANCED => "Balanced",
            PROFILE_PERFORMANCE => "Turbo",
            _ => "Unknown",
        }
    }

    pub fn profile_description(profile: u32) -> &'static str {
        match profile {
            PROFILE_QUIET => "Minimal fan noise, reduced performance. Best for quiet environments.",
            PROFILE_BALANCED => "Balanced performance and cooling. Recommended for daily use.",
            PROFILE_PERFORMANCE => "Maximum performance with aggressive cooling. Best for demanding tasks.",
            _ => "Unknown profile.",
        }
    }
}
