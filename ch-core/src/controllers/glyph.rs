//! Glyph lighting display controller
//!
//! The lid glyph matrix has no daemon property; the only way in is the
//! external `glyphctl` tool, reached through the same property-client shape
//! as the daemon-backed surfaces via [`ExecTransport`]. Writes use the
//! optimistic discipline: the cache and any observer move first, the
//! command follows, and a failure raises an error without a rollback.

use std::sync::Arc;

use ch_bus::{BusRequest, BusResponse, Transport, Value};
use ch_error::{PanelError, Result};
use tracing::debug;

use crate::constants::glyph;
use crate::property::{RemoteProperty, WritePolicy};

/// Effect modes the glyph matrix supports
pub const GLYPH_MODES: &[&str] = &[
    "Static", "Pulse", "Scan", "Loading", "Stream", "Flow", "Comet", "Spectrum", "Ramp", "Buzzer",
];

const GLYPH_PATH: &str = "/glyph";
const GLYPH_INTERFACE: &str = "io.chassis.Glyph";

const PROP_ENABLED: &str = "Enabled";
const PROP_BRIGHTNESS: &str = "Brightness";
const PROP_MODE: &str = "Mode";

/// Map property writes onto `glyphctl` argument vectors. Anything else is
/// unsupported by this surface.
pub fn glyph_command_map(req: &BusRequest) -> Option<Vec<String>> {
    let BusRequest::SetProperty { name, value, .. } = req else {
        return None;
    };
    match (name.as_str(), value) {
        (PROP_ENABLED, Value::Bool(true)) => Some(vec!["--enable".to_string()]),
        (PROP_ENABLED, Value::Bool(false)) => Some(vec!["--disable".to_string()]),
        (PROP_BRIGHTNESS, Value::U8(level)) => {
            Some(vec!["-l".to_string(), level.to_string()])
        }
        (PROP_MODE, Value::Str(mode)) => Some(vec!["--mode".to_string(), mode.clone()]),
        _ => None,
    }
}

pub struct GlyphController {
    transport: Arc<dyn Transport>,
    available: bool,
    enabled: RemoteProperty<bool>,
    brightness: RemoteProperty<u8>,
    mode: RemoteProperty<String>,
}

impl GlyphController {
    /// Probe the external tool and build the controller
    pub async fn new(transport: Arc<dyn Transport>) -> Self {
        let available = transport.service_registered(glyph::SERVICE).await;
        debug!(available, "Glyph display availability");
        Self {
            transport,
            available,
            enabled: RemoteProperty::new(PROP_ENABLED, WritePolicy::OptimisticThenSend),
            brightness: RemoteProperty::new(PROP_BRIGHTNESS, WritePolicy::OptimisticThenSend),
            mode: RemoteProperty::new(PROP_MODE, WritePolicy::OptimisticThenSend),
        }
    }

    pub fn available(&self) -> bool {
        self.available
    }

    pub async fn check_availability(&mut self) -> bool {
        self.available = self.transport.service_registered(glyph::SERVICE).await;
        self.available
    }

    pub fn enabled(&self) -> Option<bool> {
        self.enabled.get().copied()
    }

    pub fn brightness(&self) -> Option<u8> {
        self.brightness.get().copied()
    }

    pub fn mode(&self) -> Option<&str> {
        self.mode.get().map(String::as_str)
    }

    pub async fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if !self.available {
            return Err(PanelError::generic("Glyph display is not available"));
        }
        self.enabled.begin_write(&enabled);
        self.send(PROP_ENABLED, Value::Bool(enabled)).await
    }

    /// Brightness is clamped to the tool's 0-255 range by the type itself
    pub async fn set_brightness(&mut self, brightness: u8) -> Result<()> {
        if !self.available {
            return Err(PanelError::generic("Glyph display is not available"));
        }
        self.brightness.begin_write(&brightness);
        self.send(PROP_BRIGHTNESS, Value::U8(brightness)).await
    }

    pub async fn set_mode(&mut self, mode: &str) -> Result<()> {
        if !self.available {
            return Err(PanelError::generic("Glyph display is not available"));
        }
        if !GLYPH_MODES.contains(&mode) {
            return Err(PanelError::invalid_argument(format!(
                "Unknown glyph mode: {}",
                mode
            )));
        }
        self.mode.begin_write(&mode.to_string());
        self.send(PROP_MODE, Value::Str(mode.to_string())).await
    }

    async fn send(&self, name: &str, value: Value) -> Result<()> {
        let response = self
            .transport
            .call(
                glyph::SERVICE,
                BusRequest::SetProperty {
                    path: GLYPH_PATH.to_string(),
                    interface: GLYPH_INTERFACE.to_string(),
                    name: name.to_string(),
                    value,
                },
            )
            .await?;
        match response {
            BusResponse::Ok(_) => Ok(()),
            BusResponse::Error { message } => Err(PanelError::CallFailed(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ch_bus::ExecTransport;

    fn set_request(name: &str, value: Value) -> BusRequest {
        BusRequest::SetProperty {
            path: GLYPH_PATH.to_string(),
            interface: GLYPH_INTERFACE.to_string(),
            name: name.to_string(),
            value,
        }
    }

    #[test]
    fn test_command_map() {
        assert_eq!(
            glyph_command_map(&set_request(PROP_ENABLED, Value::Bool(true))),
            Some(vec!["--enable".to_string()])
        );
        assert_eq!(
            glyph_command_map(&set_request(PROP_BRIGHTNESS, Value::U8(128))),
            Some(vec!["-l".to_string(), "128".to_string()])
        );
        assert_eq!(
            glyph_command_map(&set_request(PROP_MODE, Value::Str("Comet".to_string()))),
            Some(vec!["--mode".to_string(), "Comet".to_string()])
        );
        assert_eq!(glyph_command_map(&BusRequest::Ping), None);
    }

    #[tokio::test]
    async fn test_unknown_mode_rejected_before_send() {
        let transport = Arc::new(ExecTransport::new("true", &[], glyph_command_map));
        let mut controller = GlyphController::new(transport).await;
        assert!(controller.available());

        let err = controller.set_mode("Nonsense").await.expect_err("must reject");
        assert!(matches!(err, PanelError::InvalidArgument(_)));
        assert_eq!(controller.mode(), None, "no cache mutation for rejected input");
    }

    #[tokio::test]
    async fn test_optimistic_cache_survives_failure() {
        // sh -c 'exit 2' fails every command
        fn failing_map(_req: &BusRequest) -> Option<Vec<String>> {
            Some(vec!["-c".to_string(), "echo nope >&2; exit 2".to_string()])
        }
        let transport = Arc::new(ExecTransport::new("sh", &["-c", "true"], failing_map));
        let mut controller = GlyphController::new(transport).await;
        // The probe goes through failing_map-independent args, so the tool
        // reports available while every write fails
        controller.available = true;

        let err = controller.set_brightness(200).await.expect_err("command fails");
        assert!(matches!(err, PanelError::CallFailed(_)));
        // Optimistic discipline: the failed write is not rolled back
        assert_eq!(controller.brightness(), Some(200));
    }

    #[tokio::test]
    async fn test_successful_set_updates_cache() {
        let transport = Arc::new(ExecTransport::new("true", &[], glyph_command_map));
        let mut controller = GlyphController::new(transport).await;
        assert!(controller.available());

        controller.set_enabled(true).await.expect("set");
        assert_eq!(controller.enabled(), Some(true));

        controller.set_mode("Pulse").await.expect("set");
        assert_eq!(controller.mode(), Some("Pulse"));
    }

    #[tokio::test]
    async fn test_unavailable_is_noop_with_error() {
        let transport = Arc::new(ExecTransport::new(
            "/nonexistent/glyphctl",
            &["--help"],
            glyph_command_map,
        ));
        let mut controller = GlyphController::new(transport).await;
        assert!(!controller.available());

        let err = controller.set_enabled(true).await.expect_err("unavailable");
        assert!(matches!(err, PanelError::Generic(_)));
        assert_eq!(controller.enabled(), None);
    }
}
