//! In-memory transport double for exercising the client actors

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use ch_bus::{BusEvent, BusRequest, BusResponse, ResponseData, Transport, Value};
use ch_error::{PanelError, Result};
use tokio::sync::broadcast;

/// Scripted transport: responses are queued per request key, push events
/// are injected by the test.
pub struct FakeTransport {
    registered: Mutex<HashSet<String>>,
    responses: Mutex<HashMap<String, VecDeque<Result<BusResponse>>>>,
    calls: Mutex<Vec<(String, BusRequest)>>,
    events_tx: broadcast::Sender<BusEvent>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            registered: Mutex::new(HashSet::new()),
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            events_tx,
        })
    }

    pub fn register(&self, service: &str) {
        self.registered.lock().expect("lock").insert(service.to_string());
    }

    pub fn unregister(&self, service: &str) {
        self.registered.lock().expect("lock").remove(service);
    }

    pub fn push_event(&self, event: BusEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Queue a response for a request key ("GetProperty:Name",
    /// "SetProperty:Name", "Call:Method" or "Introspect")
    pub fn script(&self, key: &str, response: Result<BusResponse>) {
        self.responses
            .lock()
            .expect("lock")
            .entry(key.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn script_value(&self, key: &str, value: Value) {
        self.script(
            key,
            Ok(BusResponse::Ok(ResponseData {
                value: Some(value),
                ..Default::default()
            })),
        );
    }

    pub fn script_list(&self, key: &str, list: Vec<Value>) {
        self.script(
            key,
            Ok(BusResponse::Ok(ResponseData {
                list: Some(list),
                ..Default::default()
            })),
        );
    }

    pub fn script_node_xml(&self, xml: &str) {
        self.script(
            "Introspect",
            Ok(BusResponse::Ok(ResponseData {
                node_xml: Some(xml.to_string()),
                ..Default::default()
            })),
        );
    }

    pub fn script_ack(&self, key: &str) {
        self.script(key, Ok(BusResponse::Ok(ResponseData::default())));
    }

    pub fn script_call_failed(&self, key: &str, message: &str) {
        self.script(key, Err(PanelError::CallFailed(message.to_string())));
    }

    pub fn calls(&self) -> Vec<(String, BusRequest)> {
        self.calls.lock().expect("lock").clone()
    }

    fn key_of(req: &BusRequest) -> String {
        match req {
            BusRequest::GetProperty { name, .. } => format!("GetProperty:{}", name),
            BusRequest::SetProperty { name, .. } => format!("SetProperty:{}", name),
            BusRequest::Call { method, .. } => format!("Call:{}", method),
            BusRequest::Introspect { .. } => "Introspect".to_string(),
            BusRequest::Ping => "Ping".to_string(),
            BusRequest::Subscribe => "Subscribe".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn call(&self, service: &str, req: BusRequest) -> Result<BusResponse> {
        let key = Self::key_of(&req);
        self.calls
            .lock()
            .expect("lock")
            .push((service.to_string(), req));

        let scripted = self
            .responses
            .lock()
            .expect("lock")
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(response) => response,
            None => Ok(BusResponse::Ok(ResponseData::default())),
        }
    }

    async fn service_registered(&self, service: &str) -> bool {
        self.registered.lock().expect("lock").contains(service)
    }

    fn events(&self) -> broadcast::Receiver<BusEvent> {
        self.events_tx.subscribe()
    }
}

/// Poll an async condition until it holds or the timeout expires
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    loop {
        if condition().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached within timeout");
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}
