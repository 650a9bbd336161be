//! IPC bus abstraction for Chassis
//!
//! Defines the wire types shared by every transport: named services are
//! identified by reverse-DNS strings, objects by hierarchical paths, and
//! properties are read/written through generic get/set requests taking an
//! interface name and a property name. Change notifications arrive as
//! broadcast [`BusEvent`]s.
//!
//! Two transports implement the [`Transport`] trait:
//! - [`SocketTransport`]: JSON-lines over per-service Unix sockets
//! - [`ExecTransport`]: a bounded synchronous call into an external CLI tool,
//!   for control surfaces no daemon exposes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

mod exec;
mod socket;
mod transport;

pub use exec::{ExecCommandMap, ExecTransport};
pub use socket::{default_socket_dir, SocketTransport};
pub use transport::Transport;

/// Global request ID counter for correlation
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Maximum message size for IPC (8KB)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024;

/// Maximum object path length accepted on the wire
const MAX_PATH_LENGTH: usize = 256;

/// Generate a unique request ID for correlation
pub fn generate_request_id() -> u64 {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

// ============================================================================
// Values
// ============================================================================

/// A typed property value as carried on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    U8(u8),
    U32(u32),
    Bool(bool),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    pub fn as_u8(&self) -> Option<u8> {
        match self {
            Value::U8(v) => Some(*v),
            Value::U32(v) => u8::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(v) => Some(*v),
            Value::U8(v) => Some(u32::from(*v)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }
}

// ============================================================================
// Requests and Responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data")]
pub enum BusRequest {
    Ping,
    /// Read a named property from an interface on an object
    GetProperty {
        path: String,
        interface: String,
        name: String,
    },
    /// Write a named property on an interface on an object
    SetProperty {
        path: String,
        interface: String,
        name: String,
        value: Value,
    },
    /// Invoke a method on an interface on an object
    Call {
        path: String,
        interface: String,
        method: String,
        args: Vec<Value>,
    },
    /// Describe the child nodes of an object path
    Introspect { path: String },
    /// Switch this connection into push-event delivery mode
    Subscribe,
}

impl BusRequest {
    /// Validate request parameters before sending
    pub fn validate(&self) -> Result<(), String> {
        match self {
            BusRequest::Ping | BusRequest::Subscribe => Ok(()),
            BusRequest::GetProperty { path, interface, name }
            | BusRequest::SetProperty { path, interface, name, .. } => {
                validate_object_path(path)?;
                validate_member_name(interface)?;
                validate_member_name(name)
            }
            BusRequest::Call { path, interface, method, .. } => {
                validate_object_path(path)?;
                validate_member_name(interface)?;
                validate_member_name(method)
            }
            BusRequest::Introspect { path } => validate_object_path(path),
        }
    }

    /// Short name of the request kind, for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            BusRequest::Ping => "Ping",
            BusRequest::GetProperty { .. } => "GetProperty",
            BusRequest::SetProperty { .. } => "SetProperty",
            BusRequest::Call { .. } => "Call",
            BusRequest::Introspect { .. } => "Introspect",
            BusRequest::Subscribe => "Subscribe",
        }
    }
}

/// Flat response payload - exactly one field is set for a successful
/// data-bearing reply, none for a bare acknowledgement
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseData {
    /// Single property value (GetProperty)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// List result (method calls returning collections)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<Vec<Value>>,
    /// Introspection description of child nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_xml: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", content = "data")]
pub enum BusResponse {
    Ok(ResponseData),
    Error { message: String },
}

// ============================================================================
// Envelopes
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Unique request ID for correlation and debugging
    pub id: u64,
    #[serde(flatten)]
    pub request: BusRequest,
}

impl RequestEnvelope {
    pub fn new(request: BusRequest) -> Self {
        Self {
            id: generate_request_id(),
            request,
        }
    }

    pub fn with_id(request: BusRequest, id: u64) -> Self {
        Self { id, request }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: u64,
    #[serde(flatten)]
    pub response: BusResponse,
}

// ============================================================================
// Push Events
// ============================================================================

/// Unsolicited notifications delivered by a transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum BusEvent {
    /// A watched service appeared on the bus
    ServiceRegistered { service: String },
    /// A watched service disappeared from the bus
    ServiceUnregistered { service: String },
    /// One or more properties changed on a remote object
    PropertiesChanged {
        service: String,
        path: String,
        interface: String,
        changed: BTreeMap<String, Value>,
        invalidated: Vec<String>,
    },
    /// Service-specific status broadcast carrying an opaque code
    StatusChanged { service: String, code: u32 },
}

// ============================================================================
// Wire Validation
// ============================================================================

fn validate_object_path(path: &str) -> Result<(), String> {
    if path.is_empty() || !path.starts_with('/') {
        return Err(format!("Invalid object path: {:?}", path));
    }
    if path.len() > MAX_PATH_LENGTH {
        return Err(format!("Object path too long ({} chars)", path.len()));
    }
    if path.contains("..") || path.contains("//") || path.contains('\0') || path.contains('\n') {
        return Err(format!("Forbidden component in object path: {:?}", path));
    }
    Ok(())
}

fn validate_member_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Empty member name".to_string());
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_') {
        return Err(format!("Invalid member name: {:?}", name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_increase() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert!(b > a);
    }

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = RequestEnvelope::new(BusRequest::GetProperty {
            path: "/io/chassis/platform".to_string(),
            interface: "io.chassis.Platform".to_string(),
            name: "PlatformProfile".to_string(),
        });
        let json = serde_json::to_string(&envelope).expect("serialize");
        let parsed: RequestEnvelope = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed.id, envelope.id);
        assert_eq!(parsed.request.type_name(), "GetProperty");
    }

    #[test]
    fn test_path_validation() {
        let good = BusRequest::Introspect {
            path: "/io/chassis/lamp".to_string(),
        };
        assert!(good.validate().is_ok());

        for bad in ["", "io/chassis", "/io/../etc", "/io//chassis"] {
            let req = BusRequest::Introspect { path: bad.to_string() };
            assert!(req.validate().is_err(), "path {:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_member_name_validation() {
        let req = BusRequest::GetProperty {
            path: "/io/chassis/platform".to_string(),
            interface: "io.chassis.Platform".to_string(),
            name: "Charge Limit".to_string(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::U8(80).as_u32(), Some(80));
        assert_eq!(Value::U32(80).as_u8(), Some(80));
        assert_eq!(Value::U32(300).as_u8(), None);
        assert_eq!(Value::Str("x".to_string()).as_u32(), None);
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
    }

    #[test]
    fn test_properties_changed_roundtrip() {
        let mut changed = BTreeMap::new();
        changed.insert("PlatformProfile".to_string(), Value::U32(2));
        let event = BusEvent::PropertiesChanged {
            service: "io.chassis.Powerd".to_string(),
            path: "/io/chassis/platform".to_string(),
            interface: "io.chassis.Platform".to_string(),
            changed,
            invalidated: Vec::new(),
        };
        let json = serde_json::to_string(&event).expect("serialize");
        let parsed: BusEvent = serde_json::from_str(&json).expect("parse");
        match parsed {
            BusEvent::PropertiesChanged { changed, .. } => {
                assert_eq!(changed.get("PlatformProfile"), Some(&Value::U32(2)));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
