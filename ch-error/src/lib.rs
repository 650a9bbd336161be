//! Unified error handling for Chassis
//!
//! This crate provides a single error type used across all Chassis components.
//! It uses thiserror for ergonomic error definitions with proper Display and
//! Error trait impls.
//!
//! Errors here are never fatal to the process: every component recovers them
//! at its boundary and surfaces them as an error event carrying the message.

use std::io;

/// Result type alias using PanelError
pub type Result<T> = std::result::Result<T, PanelError>;

/// Unified error type for all Chassis operations
#[derive(thiserror::Error, Debug)]
pub enum PanelError {
    // ============================================================================
    // Daemon Availability
    // ============================================================================
    #[error("Service unreachable: {0}")]
    ServiceUnreachable(String),

    // ============================================================================
    // Transport and Call Failures
    // ============================================================================
    #[error("Call failed: {0}")]
    CallFailed(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Message too large: {size} bytes (max {max_size} bytes)")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Protocol error: {0}")]
    Protocol(String),

    // ============================================================================
    // Discovery and Validation
    // ============================================================================
    #[error("Discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ============================================================================
    // Ambient Carriers
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Generic(String),
}

impl PanelError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a call-failure error from a string
    pub fn call_failed(msg: impl Into<String>) -> Self {
        Self::CallFailed(msg.into())
    }

    /// Create an unreachable-service error naming the service
    pub fn unreachable(service: impl Into<String>) -> Self {
        Self::ServiceUnreachable(service.into())
    }

    /// Create an invalid-argument error from a string
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Whether this error means the remote object was not found
    /// (drives sub-resource path re-discovery)
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::CallFailed(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("not found") || msg.contains("no such object") || msg.contains("unknown path")
            }
            _ => false,
        }
    }
}

// Allow converting from String to PanelError
impl From<String> for PanelError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

// Allow converting from &str to PanelError
impl From<&str> for PanelError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = PanelError::ServiceUnreachable("io.chassis.Powerd".to_string());
        assert_eq!(err.to_string(), "Service unreachable: io.chassis.Powerd");

        let err = PanelError::InvalidArgument("profile 5 out of range".to_string());
        assert!(err.to_string().contains("profile 5"));
    }

    #[test]
    fn test_not_found_classification() {
        assert!(PanelError::CallFailed("Object not found at /io/chassis/lamp/19b6".to_string()).is_not_found());
        assert!(PanelError::CallFailed("No such object".to_string()).is_not_found());
        assert!(!PanelError::CallFailed("permission denied".to_string()).is_not_found());
        assert!(!PanelError::DiscoveryFailed("not found".to_string()).is_not_found());
    }
}
