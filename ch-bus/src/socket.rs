//! Unix Socket Transport
//!
//! JSON-lines over per-service Unix sockets. Each daemon listens on
//! `<runtime_dir>/<service>.sock`; a request is one line out, a response one
//! line back, correlated by envelope ID. Push events are delivered over a
//! dedicated subscription connection per service.
//!
//! Every call opens a fresh connection. The control surfaces behind this
//! transport change a few times a minute at most, so connection reuse buys
//! nothing and a fresh connect keeps failure handling trivial.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ch_error::{PanelError, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::transport::Transport;
use crate::{BusEvent, BusRequest, BusResponse, RequestEnvelope, ResponseEnvelope, MAX_MESSAGE_SIZE};

/// Per-call read/write timeout
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// How often the presence watcher re-checks socket files
const PRESENCE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Capacity of the push-event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Resolve the default runtime directory holding daemon sockets
pub fn default_socket_dir() -> PathBuf {
    if let Ok(runtime) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime).join("chassis");
    }
    PathBuf::from("/run/chassis")
}

/// Transport speaking JSON-lines to per-service Unix sockets
pub struct SocketTransport {
    socket_dir: PathBuf,
    events_tx: broadcast::Sender<BusEvent>,
}

impl SocketTransport {
    /// Create a transport and start watching the given services.
    ///
    /// One background task polls socket presence and emits
    /// `ServiceRegistered`/`ServiceUnregistered` edges; one task per service
    /// maintains a subscription connection and forwards push events.
    pub fn new(socket_dir: impl Into<PathBuf>, watched: &[&str]) -> Self {
        let socket_dir = socket_dir.into();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let this = Self {
            socket_dir: socket_dir.clone(),
            events_tx: events_tx.clone(),
        };

        let names: Vec<String> = watched.iter().map(|s| s.to_string()).collect();
        tokio::spawn(watch_presence(socket_dir.clone(), names.clone(), events_tx.clone()));
        for name in names {
            tokio::spawn(pump_subscription(socket_dir.clone(), name, events_tx.clone()));
        }

        this
    }

    fn socket_path(&self, service: &str) -> PathBuf {
        socket_path_in(&self.socket_dir, service)
    }
}

fn socket_path_in(dir: &Path, service: &str) -> PathBuf {
    dir.join(format!("{}.sock", service))
}

#[async_trait::async_trait]
impl Transport for SocketTransport {
    async fn call(&self, service: &str, req: BusRequest) -> Result<BusResponse> {
        req.validate().map_err(PanelError::Protocol)?;

        let path = self.socket_path(service);
        let stream = timeout(CALL_TIMEOUT, UnixStream::connect(&path))
            .await
            .map_err(|_| PanelError::Timeout(format!("connect to {}", service)))?
            .map_err(|e| PanelError::CallFailed(format!("Failed to connect to {}: {}", service, e)))?;

        let request_id = crate::generate_request_id();
        let envelope = RequestEnvelope::with_id(req, request_id);
        let mut json = serde_json::to_vec(&envelope)?;
        json.push(b'\n');

        if json.len() > MAX_MESSAGE_SIZE {
            return Err(PanelError::MessageTooLarge {
                size: json.len(),
                max_size: MAX_MESSAGE_SIZE,
            });
        }

        let (read_half, mut write_half) = stream.into_split();
        timeout(CALL_TIMEOUT, write_half.write_all(&json))
            .await
            .map_err(|_| PanelError::Timeout(format!("send to {}", service)))?
            .map_err(|e| PanelError::CallFailed(format!("Failed to send request: {}", e)))?;

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        let read = timeout(CALL_TIMEOUT, reader.read_line(&mut line))
            .await
            .map_err(|_| PanelError::Timeout(format!("response from {}", service)))?
            .map_err(|e| PanelError::CallFailed(format!("Failed to read response: {}", e)))?;

        if read == 0 {
            return Err(PanelError::CallFailed(format!("{} closed connection", service)));
        }
        if line.len() > MAX_MESSAGE_SIZE {
            return Err(PanelError::MessageTooLarge {
                size: line.len(),
                max_size: MAX_MESSAGE_SIZE,
            });
        }

        let response: ResponseEnvelope = serde_json::from_str(line.trim_end())
            .map_err(|e| PanelError::Protocol(format!("Failed to parse response: {}", e)))?;

        if response.id != request_id {
            return Err(PanelError::Protocol(format!(
                "Response ID mismatch: expected {}, got {}",
                request_id, response.id
            )));
        }

        Ok(response.response)
    }

    async fn service_registered(&self, service: &str) -> bool {
        self.socket_path(service).exists()
    }

    fn events(&self) -> broadcast::Receiver<BusEvent> {
        self.events_tx.subscribe()
    }
}

// ============================================================================
// Background Tasks
// ============================================================================

/// Poll socket files and announce appearance/disappearance edges
async fn watch_presence(dir: PathBuf, services: Vec<String>, events_tx: broadcast::Sender<BusEvent>) {
    let mut known: HashMap<String, bool> = services.iter().map(|s| (s.clone(), false)).collect();
    let mut interval = tokio::time::interval(PRESENCE_POLL_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    // First tick fires immediately; skip it so construction-time probes via
    // service_registered() see the same state the watcher reports.
    interval.tick().await;

    loop {
        interval.tick().await;
        for service in &services {
            let present = socket_path_in(&dir, service).exists();
            let was_present = known.get(service).copied().unwrap_or(false);
            if present != was_present {
                known.insert(service.clone(), present);
                debug!(service = %service, present, "Service presence changed");
                let event = if present {
                    BusEvent::ServiceRegistered { service: service.clone() }
                } else {
                    BusEvent::ServiceUnregistered { service: service.clone() }
                };
                let _ = events_tx.send(event);
            }
        }
    }
}

/// Keep a subscription connection open to one service, forwarding its push
/// events. Reconnects with a short backoff whenever the connection drops.
async fn pump_subscription(dir: PathBuf, service: String, events_tx: broadcast::Sender<BusEvent>) {
    loop {
        let path = socket_path_in(&dir, &service);
        if path.exists() {
            match subscribe_once(&path, &service, &events_tx).await {
                Ok(()) => debug!(service = %service, "Subscription connection closed"),
                Err(e) => trace!(service = %service, "Subscription attempt failed: {}", e),
            }
        }
        tokio::time::sleep(PRESENCE_POLL_INTERVAL).await;
    }
}

async fn subscribe_once(
    path: &Path,
    service: &str,
    events_tx: &broadcast::Sender<BusEvent>,
) -> Result<()> {
    let stream = UnixStream::connect(path)
        .await
        .map_err(|e| PanelError::CallFailed(format!("subscribe connect: {}", e)))?;
    let (read_half, mut write_half) = stream.into_split();

    let envelope = RequestEnvelope::new(BusRequest::Subscribe);
    let mut json = serde_json::to_vec(&envelope)?;
    json.push(b'\n');
    write_half
        .write_all(&json)
        .await
        .map_err(|e| PanelError::CallFailed(format!("subscribe send: {}", e)))?;

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    // First line acknowledges the subscription
    let read = reader
        .read_line(&mut line)
        .await
        .map_err(|e| PanelError::CallFailed(format!("subscribe ack: {}", e)))?;
    if read == 0 {
        return Err(PanelError::CallFailed("subscription refused".to_string()));
    }

    debug!(service = %service, "Subscribed to push events");

    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| PanelError::CallFailed(format!("subscription read: {}", e)))?;
        if read == 0 {
            return Ok(());
        }
        if line.len() > MAX_MESSAGE_SIZE {
            warn!(service = %service, "Oversized push event dropped");
            continue;
        }
        match serde_json::from_str::<BusEvent>(line.trim_end()) {
            Ok(event) => {
                trace!(service = %service, ?event, "Push event");
                let _ = events_tx.send(event);
            }
            Err(e) => warn!(service = %service, "Unparseable push event: {}", e),
        }
    }
}
