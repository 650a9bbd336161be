//! Transport trait
//!
//! The seam between the synchronization core and whatever actually moves
//! bytes. Completions resolve in whatever order the transport finishes
//! them; callers must not assume issuance order.

use async_trait::async_trait;
use ch_error::Result;
use tokio::sync::broadcast;

use crate::{BusEvent, BusRequest, BusResponse};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a request against a named service and await its completion.
    ///
    /// Failures map to `PanelError::CallFailed` (the service answered with an
    /// error or the connection broke) or `PanelError::Timeout`.
    async fn call(&self, service: &str, req: BusRequest) -> Result<BusResponse>;

    /// Probe whether a named service is currently reachable
    async fn service_registered(&self, service: &str) -> bool;

    /// Subscribe to unsolicited push events from this transport
    fn events(&self) -> broadcast::Receiver<BusEvent>;
}
