//! Lamp LED controller
//!
//! Brightness goes through the daemon with the confirm-then-cache
//! discipline. Effect parameters (mode, colors, speed) are the optimistic
//! side of the system: the local fields move first, then the effect command
//! is sent, and a later failure raises an error without rolling them back.

use std::sync::Arc;

use ch_error::{PanelError, Result};
use tokio::sync::broadcast;

use crate::platform::{LampEffect, PlatformClient, PlatformEvent};

/// Brightness levels accepted by the daemon
pub const BRIGHTNESS_OFF: u32 = 0;
pub const BRIGHTNESS_HIGH: u32 = 3;

/// Lamp effect modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LampMode {
    Off,
    Static,
    Breathe,
    Strobe,
    Rainbow,
    Pulse,
    Comet,
}

pub const ALL_LAMP_MODES: [LampMode; 7] = [
    LampMode::Off,
    LampMode::Static,
    LampMode::Breathe,
    LampMode::Strobe,
    LampMode::Rainbow,
    LampMode::Pulse,
    LampMode::Comet,
];

impl LampMode {
    pub fn code(self) -> u32 {
        match self {
            Self::Off => 0,
            Self::Static => 1,
            Self::Breathe => 2,
            Self::Strobe => 3,
            Self::Rainbow => 4,
            Self::Pulse => 5,
            Self::Comet => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Static => "Static",
            Self::Breathe => "Breathe",
            Self::Strobe => "Strobe",
            Self::Rainbow => "Rainbow",
            Self::Pulse => "Pulse",
            Self::Comet => "Comet",
        }
    }

    /// Rainbow cycles on its own; Off has nothing to color
    pub fn uses_color(self) -> bool {
        !matches!(self, Self::Rainbow | Self::Off)
    }

    pub fn uses_two_colors(self) -> bool {
        matches!(self, Self::Breathe | Self::Strobe | Self::Pulse | Self::Comet)
    }

    pub fn uses_speed(self) -> bool {
        !matches!(self, Self::Static | Self::Off)
    }
}

pub struct LampController {
    client: Arc<PlatformClient>,
    mode: LampMode,
    color1: (u8, u8, u8),
    color2: Option<(u8, u8, u8)>,
    speed: u8,
}

impl LampController {
    pub fn new(client: Arc<PlatformClient>) -> Self {
        Self {
            client,
            mode: LampMode::Static,
            color1: (255, 0, 0),
            color2: None,
            speed: 1,
        }
    }

    pub async fn available(&self) -> bool {
        let snapshot = self.client.snapshot().await;
        snapshot.available() && snapshot.lamp_available()
    }

    pub async fn brightness(&self) -> Option<u32> {
        self.client.snapshot().await.lamp_brightness()
    }

    pub fn mode(&self) -> LampMode {
        self.mode
    }

    pub fn color1(&self) -> (u8, u8, u8) {
        self.color1
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    /// Request a brightness change (confirm-then-cache via the client)
    pub async fn set_brightness(&self, level: u32) -> Result<()> {
        if !self.available().await {
            return Err(PanelError::generic("Lamp control is not available"));
        }
        if level > BRIGHTNESS_HIGH {
            return Err(PanelError::invalid_argument("Invalid brightness level"));
        }
        self.client.set_lamp_brightness(level);
        Ok(())
    }

    /// Select an effect mode locally; takes effect on the next apply
    pub fn set_mode(&mut self, mode: LampMode) {
        self.mode = mode;
    }

    /// Change the primary color and apply the effect immediately
    pub async fn set_color1(&mut self, color: (u8, u8, u8)) -> Result<()> {
        if self.color1 != color {
            self.color1 = color;
            return self.apply_effect().await;
        }
        Ok(())
    }

    pub fn set_color2(&mut self, color: Option<(u8, u8, u8)>) {
        self.color2 = color;
    }

    /// Speed 0-2; anything else falls back to medium
    pub fn set_speed(&mut self, speed: u8) {
        self.speed = clamp_speed(speed);
    }

    /// Send the current effect parameters to the daemon. The local fields
    /// already hold the new values (optimistic); a failure surfaces through
    /// the client's error event without rolling them back.
    pub async fn apply_effect(&self) -> Result<()> {
        if !self.available().await {
            return Err(PanelError::generic("Lamp control is not available"));
        }
        self.client.set_lamp_effect(LampEffect {
            mode: self.mode.code(),
            color1: self.color1,
            color2: self.color2,
            speed: self.speed,
        });
        Ok(())
    }

    pub fn refresh(&self) {
        self.client.refresh();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.client.subscribe()
    }
}

fn clamp_speed(speed: u8) -> u8 {
    if speed <= 2 {
        speed
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_capabilities() {
        assert!(!LampMode::Rainbow.uses_color());
        assert!(!LampMode::Off.uses_color());
        assert!(LampMode::Static.uses_color());
        assert!(!LampMode::Static.uses_speed());
        assert!(LampMode::Breathe.uses_two_colors());
        assert!(!LampMode::Rainbow.uses_two_colors());
    }

    #[test]
    fn test_speed_fallback() {
        assert_eq!(clamp_speed(0), 0);
        assert_eq!(clamp_speed(2), 2);
        assert_eq!(clamp_speed(3), 1);
        assert_eq!(clamp_speed(200), 1);
    }
}
