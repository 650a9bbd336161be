//! Process-Exec Transport
//!
//! Some control surfaces have no daemon behind them; the only way in is an
//! external command-line tool. This transport hides that behind the same
//! [`Transport`] trait so property clients cannot tell a command-backed
//! property from a daemon-backed one.
//!
//! Contract: a bounded synchronous call (3 s), textual stdout/stderr parse,
//! and a non-zero exit surfaces the captured stderr as the error message.

use std::process::Stdio;
use std::time::Duration;

use ch_error::{PanelError, Result};
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::transport::Transport;
use crate::{BusEvent, BusRequest, BusResponse, ResponseData, Value};

/// Bounded wait for the external tool
const EXEC_TIMEOUT: Duration = Duration::from_secs(3);

/// Maps a bus request to the argument vector for the external tool.
/// Returning `None` marks the request as unsupported by this surface.
pub type ExecCommandMap = fn(&BusRequest) -> Option<Vec<String>>;

/// Transport backed by an external command-line tool
pub struct ExecTransport {
    program: String,
    map: ExecCommandMap,
    /// Arguments whose exit status proves the tool is present and usable
    probe_args: Vec<String>,
    events_tx: broadcast::Sender<BusEvent>,
}

impl ExecTransport {
    pub fn new(program: impl Into<String>, probe_args: &[&str], map: ExecCommandMap) -> Self {
        let (events_tx, _) = broadcast::channel(1);
        Self {
            program: program.into(),
            map,
            probe_args: probe_args.iter().map(|s| s.to_string()).collect(),
            events_tx,
        }
    }

    async fn run(&self, args: &[String]) -> Result<String> {
        debug!(program = %self.program, ?args, "Running external tool");
        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PanelError::CallFailed(format!("Failed to run {}: {}", self.program, e)))?;

        let output = timeout(EXEC_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| PanelError::Timeout(format!("{} did not finish in time", self.program)))?
            .map_err(|e| PanelError::CallFailed(format!("{} failed: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(program = %self.program, ?args, %stderr, "External tool failed");
            let message = if stderr.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                stderr
            };
            return Err(PanelError::CallFailed(message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait::async_trait]
impl Transport for ExecTransport {
    async fn call(&self, _service: &str, req: BusRequest) -> Result<BusResponse> {
        let args = (self.map)(&req).ok_or_else(|| {
            PanelError::CallFailed(format!("{} does not support {}", self.program, req.type_name()))
        })?;

        let stdout = self.run(&args).await?;
        let value = if stdout.is_empty() {
            None
        } else {
            Some(Value::Str(stdout))
        };
        Ok(BusResponse::Ok(ResponseData {
            value,
            ..Default::default()
        }))
    }

    async fn service_registered(&self, _service: &str) -> bool {
        self.run(&self.probe_args).await.is_ok()
    }

    fn events(&self) -> broadcast::Receiver<BusEvent> {
        // Command-backed surfaces have no push channel
        self.events_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_map(req: &BusRequest) -> Option<Vec<String>> {
        match req {
            BusRequest::Ping => Some(vec!["pong".to_string()]),
            _ => None,
        }
    }

    fn fail_map(req: &BusRequest) -> Option<Vec<String>> {
        match req {
            BusRequest::Ping => Some(vec!["-c".to_string(), "echo broken >&2; exit 2".to_string()]),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_stdout_captured() {
        let transport = ExecTransport::new("echo", &["probe"], echo_map);
        let response = transport.call("aux", BusRequest::Ping).await.expect("call");
        match response {
            BusResponse::Ok(data) => {
                assert_eq!(data.value.and_then(|v| v.as_str().map(String::from)), Some("pong".to_string()));
            }
            BusResponse::Error { message } => panic!("unexpected error: {}", message),
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit_surfaces_stderr() {
        let transport = ExecTransport::new("sh", &["-c", "true"], fail_map);
        let err = transport.call("aux", BusRequest::Ping).await.expect_err("must fail");
        match err {
            PanelError::CallFailed(message) => assert_eq!(message, "broken"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsupported_request() {
        let transport = ExecTransport::new("echo", &["probe"], echo_map);
        let err = transport
            .call("aux", BusRequest::Introspect { path: "/x".to_string() })
            .await
            .expect_err("unmapped request");
        assert!(matches!(err, PanelError::CallFailed(_)));
    }

    #[tokio::test]
    async fn test_probe_missing_binary() {
        let transport = ExecTransport::new("/nonexistent/ch-test-tool", &["--help"], echo_map);
        assert!(!transport.service_registered("aux").await);
    }
}
