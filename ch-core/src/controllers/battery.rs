//! Battery controller
//!
//! Charge-limit control goes through the platform daemon; charge state and
//! power draw are read from sysfs directly.

use std::path::Path;
use std::sync::Arc;

use ch_error::{PanelError, Result};
use ch_sensors::{read_battery_status, BatteryPaths, BatteryStatus};
use tokio::sync::broadcast;

use crate::platform::{PlatformClient, PlatformEvent};

/// Accepted charge-limit range in percent
pub const CHARGE_LIMIT_MIN: u8 = 20;
pub const CHARGE_LIMIT_MAX: u8 = 100;

pub struct BatteryController {
    client: Arc<PlatformClient>,
    paths: BatteryPaths,
}

impl BatteryController {
    pub fn new(client: Arc<PlatformClient>, sys_root: &Path) -> Self {
        Self {
            client,
            paths: BatteryPaths::new(sys_root),
        }
    }

    pub async fn available(&self) -> bool {
        self.client.available().await
    }

    pub fn battery_present(&self) -> bool {
        self.paths.battery_present()
    }

    pub async fn charge_limit(&self) -> Option<u8> {
        self.client.snapshot().await.charge_limit()
    }

    /// Request a charge-limit change. Values outside 20-100 are rejected
    /// here, before any cache mutation or command.
    pub async fn set_charge_limit(&self, limit: u8) -> Result<()> {
        if !self.client.available().await {
            return Err(PanelError::generic("Battery control is not available"));
        }
        if !(CHARGE_LIMIT_MIN..=CHARGE_LIMIT_MAX).contains(&limit) {
            return Err(PanelError::invalid_argument(format!(
                "Charge limit must be between {} and {}",
                CHARGE_LIMIT_MIN, CHARGE_LIMIT_MAX
            )));
        }
        self.client.set_charge_limit(limit);
        Ok(())
    }

    /// Current battery snapshot from sysfs
    pub fn status(&self) -> BatteryStatus {
        read_battery_status(&self.paths)
    }

    pub fn refresh(&self) {
        self.client.refresh();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.client.subscribe()
    }
}
