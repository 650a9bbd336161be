//! GPU mode controller

use std::sync::Arc;

use ch_error::{PanelError, Result};
use tokio::sync::broadcast;

use crate::gfx::{requires_session_restart, GfxClient, GfxEvent, GpuMode, GpuPower};

pub struct GpuController {
    client: Arc<GfxClient>,
}

impl GpuController {
    pub fn new(client: Arc<GfxClient>) -> Self {
        Self { client }
    }

    pub async fn available(&self) -> bool {
        self.client.available().await
    }

    pub async fn current_mode(&self) -> GpuMode {
        self.client.snapshot().await.current_mode()
    }

    pub async fn pending_mode(&self) -> Option<GpuMode> {
        self.client.snapshot().await.pending_mode()
    }

    pub async fn switch_pending(&self) -> bool {
        self.client.snapshot().await.switch_pending()
    }

    pub async fn power(&self) -> GpuPower {
        self.client.snapshot().await.power()
    }

    pub async fn supported_modes(&self) -> Vec<GpuMode> {
        self.client.snapshot().await.supported_modes().to_vec()
    }

    /// Whether switching from the current mode to `target` will require a
    /// session restart before it takes effect
    pub async fn requires_restart(&self, target: GpuMode) -> bool {
        requires_session_restart(self.current_mode().await, target)
    }

    /// Request a mode switch. The outcome (immediate, pending-with-restart,
    /// or failure) arrives through the event stream.
    pub async fn set_mode(&self, target: GpuMode) -> Result<()> {
        if !self.client.available().await {
            return Err(PanelError::generic("GPU control is not available"));
        }
        self.client.set_mode(target);
        Ok(())
    }

    pub fn refresh(&self) {
        self.client.refresh();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GfxEvent> {
        self.client.subscribe()
    }

    /// Parse a user-supplied mode name (display name or enum-ish spelling)
    pub fn parse_mode(name: &str) -> Option<GpuMode> {
        match name.to_ascii_lowercase().as_str() {
            "eco" | "integrated" => Some(GpuMode::Integrated),
            "hybrid" | "standard" => Some(GpuMode::Hybrid),
            "dedicated" | "discrete" | "ultimate" => Some(GpuMode::Discrete),
            "vfio" => Some(GpuMode::Vfio),
            "egpu" => Some(GpuMode::Egpu),
            _ => None,
        }
    }
}
