//! Platform Daemon Client
//!
//! Mirrors the platform/power daemon's control properties: the platform
//! profile, the battery charge limit, and the lamp LED brightness. Reads and
//! writes are non-blocking; completions come back through the client task
//! and are applied in arrival order.
//!
//! The lamp device registers under a hardware-specific child of a
//! well-known parent path, resolved once through introspection. If a call
//! against the cached path later fails with a not-found-class error, the
//! path is invalidated, discovery re-runs and the call is retried once.

use std::sync::Arc;

use ch_bus::{BusEvent, BusRequest, BusResponse, Transport, Value};
use ch_error::{PanelError, Result};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, warn};

use crate::constants::{interfaces, paths, services};
use crate::property::{RemoteProperty, SubResource, WritePolicy};

// ============================================================================
// Property Names
// ============================================================================

pub const PROP_PROFILE: &str = "PlatformProfile";
pub const PROP_CHARGE_LIMIT: &str = "ChargeLimit";
pub const PROP_BRIGHTNESS: &str = "Brightness";

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone)]
pub enum PlatformEvent {
    AvailableChanged(bool),
    ProfileChanged(u32),
    ChargeLimitChanged(u8),
    LampBrightnessChanged(u32),
    Error(String),
}

/// Lamp effect parameters forwarded to the daemon as one method call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LampEffect {
    pub mode: u32,
    pub color1: (u8, u8, u8),
    pub color2: Option<(u8, u8, u8)>,
    pub speed: u8,
}

// ============================================================================
// State
// ============================================================================

/// Cached platform state, mutated only by the owning task. Transition
/// methods return the events the owner must publish.
#[derive(Debug, Clone)]
pub struct PlatformState {
    available: bool,
    profile: RemoteProperty<u32>,
    charge_limit: RemoteProperty<u8>,
    lamp_brightness: RemoteProperty<u32>,
    lamp: SubResource,
}

impl PlatformState {
    pub fn new(available: bool) -> Self {
        Self {
            available,
            profile: RemoteProperty::new(PROP_PROFILE, WritePolicy::ConfirmThenCache),
            charge_limit: RemoteProperty::new(PROP_CHARGE_LIMIT, WritePolicy::ConfirmThenCache),
            lamp_brightness: RemoteProperty::new(PROP_BRIGHTNESS, WritePolicy::ConfirmThenCache),
            lamp: SubResource::new(paths::LAMP_PARENT),
        }
    }

    pub fn available(&self) -> bool {
        self.available
    }

    pub fn profile(&self) -> Option<u32> {
        self.profile.get().copied()
    }

    pub fn charge_limit(&self) -> Option<u8> {
        self.charge_limit.get().copied()
    }

    pub fn lamp_brightness(&self) -> Option<u32> {
        self.lamp_brightness.get().copied()
    }

    /// Whether the lamp property group is usable (path resolved or still
    /// discoverable). False once discovery has failed.
    pub fn lamp_available(&self) -> bool {
        !self.lamp.is_failed()
    }

    pub fn lamp_path(&self) -> Option<&str> {
        self.lamp.path()
    }

    pub fn set_available(&mut self, available: bool) -> Vec<PlatformEvent> {
        if self.available == available {
            return Vec::new();
        }
        self.available = available;
        vec![PlatformEvent::AvailableChanged(available)]
    }

    pub fn apply_profile_fetch(&mut self, result: Result<u32>) -> Vec<PlatformEvent> {
        match result {
            Ok(value) if self.profile.apply(value) => vec![PlatformEvent::ProfileChanged(value)],
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!("Failed to get platform profile: {}", e);
                Vec::new()
            }
        }
    }

    pub fn apply_charge_fetch(&mut self, result: Result<u8>) -> Vec<PlatformEvent> {
        match result {
            Ok(value) if self.charge_limit.apply(value) => {
                vec![PlatformEvent::ChargeLimitChanged(value)]
            }
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!("Failed to get charge limit: {}", e);
                Vec::new()
            }
        }
    }

    pub fn apply_lamp_brightness_fetch(&mut self, result: Result<u32>) -> Vec<PlatformEvent> {
        match result {
            Ok(value) if self.lamp_brightness.apply(value) => {
                vec![PlatformEvent::LampBrightnessChanged(value)]
            }
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!("Failed to get lamp brightness: {}", e);
                Vec::new()
            }
        }
    }

    /// Start a write; under an optimistic policy the cache (and the changed
    /// event) move before the command is issued.
    pub fn begin_profile_set(&mut self, value: u32) -> Vec<PlatformEvent> {
        if self.profile.begin_write(&value) {
            vec![PlatformEvent::ProfileChanged(value)]
        } else {
            Vec::new()
        }
    }

    pub fn begin_charge_set(&mut self, value: u8) -> Vec<PlatformEvent> {
        if self.charge_limit.begin_write(&value) {
            vec![PlatformEvent::ChargeLimitChanged(value)]
        } else {
            Vec::new()
        }
    }

    pub fn begin_lamp_brightness_set(&mut self, value: u32) -> Vec<PlatformEvent> {
        if self.lamp_brightness.begin_write(&value) {
            vec![PlatformEvent::LampBrightnessChanged(value)]
        } else {
            Vec::new()
        }
    }

    pub fn finish_profile_set(&mut self, value: u32, result: Result<()>) -> Vec<PlatformEvent> {
        match result {
            Ok(()) if self.profile.finish_write(value) => {
                vec![PlatformEvent::ProfileChanged(value)]
            }
            Ok(()) => Vec::new(),
            Err(e) => vec![PlatformEvent::Error(format!(
                "Failed to set performance profile: {}",
                e
            ))],
        }
    }

    pub fn finish_charge_set(&mut self, value: u8, result: Result<()>) -> Vec<PlatformEvent> {
        match result {
            Ok(()) if self.charge_limit.finish_write(value) => {
                vec![PlatformEvent::ChargeLimitChanged(value)]
            }
            Ok(()) => Vec::new(),
            Err(e) => vec![PlatformEvent::Error(format!(
                "Failed to set charge limit: {}",
                e
            ))],
        }
    }

    pub fn finish_lamp_brightness_set(&mut self, value: u32, result: Result<()>) -> Vec<PlatformEvent> {
        match result {
            Ok(()) if self.lamp_brightness.finish_write(value) => {
                vec![PlatformEvent::LampBrightnessChanged(value)]
            }
            Ok(()) => Vec::new(),
            Err(e) => vec![PlatformEvent::Error(format!(
                "Failed to set lamp brightness: {}",
                e
            ))],
        }
    }

    /// Route an unsolicited property-changed broadcast through the same
    /// de-duplication rule as fetches, keyed by interface + property name.
    pub fn apply_properties_changed(
        &mut self,
        interface: &str,
        changed: &std::collections::BTreeMap<String, Value>,
    ) -> Vec<PlatformEvent> {
        let mut events = Vec::new();
        if interface == interfaces::PLATFORM {
            if let Some(value) = changed.get(PROP_PROFILE).and_then(Value::as_u32) {
                if self.profile.apply(value) {
                    events.push(PlatformEvent::ProfileChanged(value));
                }
            }
            if let Some(value) = changed.get(PROP_CHARGE_LIMIT).and_then(Value::as_u8) {
                if self.charge_limit.apply(value) {
                    events.push(PlatformEvent::ChargeLimitChanged(value));
                }
            }
        } else if interface == interfaces::LAMP {
            if let Some(value) = changed.get(PROP_BRIGHTNESS).and_then(Value::as_u32) {
                if self.lamp_brightness.apply(value) {
                    events.push(PlatformEvent::LampBrightnessChanged(value));
                }
            }
        }
        events
    }

    pub fn lamp_needs_discovery(&self) -> bool {
        self.lamp.needs_discovery()
    }

    pub fn lamp_mut(&mut self) -> &mut SubResource {
        &mut self.lamp
    }
}

// ============================================================================
// Client Actor
// ============================================================================

enum PlatformCmd {
    Refresh,
    SetProfile(u32),
    SetChargeLimit(u8),
    SetLampBrightness(u32),
    SetLampEffect(LampEffect),
    SetFanCurve {
        profile: u32,
        fan: u32,
        points: Vec<(u8, u8)>,
        enabled: bool,
    },
}

/// One operation against the lamp sub-resource, tracking whether it has
/// already been retried after a re-discovery
#[derive(Debug, Clone)]
struct LampOp {
    kind: LampOpKind,
    retried: bool,
}

#[derive(Debug, Clone)]
enum LampOpKind {
    FetchBrightness,
    SetBrightness(u32),
    SetEffect(LampEffect),
}

enum PlatformDone {
    ProfileFetched(Result<u32>),
    ChargeFetched(Result<u8>),
    LampResolved(Result<String>),
    LampBrightnessFetched { op: LampOp, result: Result<u32> },
    ProfileSet { value: u32, result: Result<()> },
    ChargeSet { value: u8, result: Result<()> },
    LampBrightnessSet { op: LampOp, result: Result<()> },
    LampEffectSet { op: LampOp, result: Result<()> },
    FanCurveSet { result: Result<()> },
}

/// Handle to the platform client task
pub struct PlatformClient {
    cmd_tx: mpsc::UnboundedSender<PlatformCmd>,
    events_tx: broadcast::Sender<PlatformEvent>,
    state: Arc<RwLock<PlatformState>>,
}

impl PlatformClient {
    pub async fn spawn(transport: Arc<dyn Transport>) -> Self {
        let available = transport.service_registered(services::PLATFORM).await;
        let state = Arc::new(RwLock::new(PlatformState::new(available)));

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(64);

        // Subscribe before the task starts so push notifications racing the
        // construction are not lost
        let bus_events = transport.events();
        tokio::spawn(run_platform(
            transport,
            bus_events,
            state.clone(),
            events_tx.clone(),
            cmd_rx,
        ));

        let client = Self {
            cmd_tx,
            events_tx,
            state,
        };
        if available {
            client.refresh();
        }
        client
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.events_tx.subscribe()
    }

    pub async fn snapshot(&self) -> PlatformState {
        self.state.read().await.clone()
    }

    pub async fn available(&self) -> bool {
        self.state.read().await.available()
    }

    /// Re-fetch every mirrored property (non-blocking)
    pub fn refresh(&self) {
        let _ = self.cmd_tx.send(PlatformCmd::Refresh);
    }

    pub fn set_profile(&self, profile: u32) {
        let _ = self.cmd_tx.send(PlatformCmd::SetProfile(profile));
    }

    pub fn set_charge_limit(&self, limit: u8) {
        let _ = self.cmd_tx.send(PlatformCmd::SetChargeLimit(limit));
    }

    pub fn set_lamp_brightness(&self, level: u32) {
        let _ = self.cmd_tx.send(PlatformCmd::SetLampBrightness(level));
    }

    pub fn set_lamp_effect(&self, effect: LampEffect) {
        let _ = self.cmd_tx.send(PlatformCmd::SetLampEffect(effect));
    }

    /// Forward a fan curve to the daemon as `(temp, fan-percent)` pairs
    pub fn set_fan_curve(&self, profile: u32, fan: u32, points: Vec<(u8, u8)>, enabled: bool) {
        let _ = self.cmd_tx.send(PlatformCmd::SetFanCurve {
            profile,
            fan,
            points,
            enabled,
        });
    }
}

struct PlatformActor {
    transport: Arc<dyn Transport>,
    state: Arc<RwLock<PlatformState>>,
    events_tx: broadcast::Sender<PlatformEvent>,
    done_tx: mpsc::UnboundedSender<PlatformDone>,
    /// Lamp operations parked while discovery is in flight
    queued_lamp_ops: Vec<LampOp>,
    discovery_in_flight: bool,
}

async fn run_platform(
    transport: Arc<dyn Transport>,
    mut bus_events: broadcast::Receiver<BusEvent>,
    state: Arc<RwLock<PlatformState>>,
    events_tx: broadcast::Sender<PlatformEvent>,
    mut cmd_rx: mpsc::UnboundedReceiver<PlatformCmd>,
) {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let mut actor = PlatformActor {
        transport,
        state,
        events_tx,
        done_tx,
        queued_lamp_ops: Vec::new(),
        discovery_in_flight: false,
    };

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => actor.handle_cmd(cmd).await,
                None => break,
            },
            Some(done) = done_rx.recv() => actor.handle_done(done).await,
            event = bus_events.recv() => match event {
                Ok(event) => actor.handle_bus_event(event).await,
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    // Missed broadcasts: reconcile by re-fetching everything
                    actor.handle_cmd(PlatformCmd::Refresh).await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

impl PlatformActor {
    async fn handle_cmd(&mut self, cmd: PlatformCmd) {
        let available = self.state.read().await.available();
        match cmd {
            PlatformCmd::Refresh => {
                if !available {
                    return;
                }
                self.fetch_profile();
                self.fetch_charge_limit();
                self.lamp_op(LampOp { kind: LampOpKind::FetchBrightness, retried: false })
                    .await;
            }
            PlatformCmd::SetProfile(value) => {
                if !available {
                    self.publish_unreachable();
                    return;
                }
                let events = self.state.write().await.begin_profile_set(value);
                self.publish(events);
                let transport = self.transport.clone();
                let done_tx = self.done_tx.clone();
                tokio::spawn(async move {
                    let result = transport
                        .call(
                            services::PLATFORM,
                            set_property(paths::PLATFORM, interfaces::PLATFORM, PROP_PROFILE, Value::U32(value)),
                        )
                        .await
                        .and_then(expect_ack);
                    let _ = done_tx.send(PlatformDone::ProfileSet { value, result });
                });
            }
            PlatformCmd::SetChargeLimit(value) => {
                if !available {
                    self.publish_unreachable();
                    return;
                }
                let events = self.state.write().await.begin_charge_set(value);
                self.publish(events);
                let transport = self.transport.clone();
                let done_tx = self.done_tx.clone();
                tokio::spawn(async move {
                    let result = transport
                        .call(
                            services::PLATFORM,
                            set_property(paths::PLATFORM, interfaces::PLATFORM, PROP_CHARGE_LIMIT, Value::U8(value)),
                        )
                        .await
                        .and_then(expect_ack);
                    let _ = done_tx.send(PlatformDone::ChargeSet { value, result });
                });
            }
            PlatformCmd::SetLampBrightness(value) => {
                if !available {
                    self.publish_unreachable();
                    return;
                }
                let events = self.state.write().await.begin_lamp_brightness_set(value);
                self.publish(events);
                self.lamp_op(LampOp { kind: LampOpKind::SetBrightness(value), retried: false })
                    .await;
            }
            PlatformCmd::SetLampEffect(effect) => {
                if !available {
                    self.publish_unreachable();
                    return;
                }
                self.lamp_op(LampOp { kind: LampOpKind::SetEffect(effect), retried: false })
                    .await;
            }
            PlatformCmd::SetFanCurve { profile, fan, points, enabled } => {
                if !available {
                    self.publish_unreachable();
                    return;
                }
                let transport = self.transport.clone();
                let done_tx = self.done_tx.clone();
                tokio::spawn(async move {
                    let point_values = points
                        .iter()
                        .map(|(temp, duty)| {
                            Value::List(vec![Value::U8(*temp), Value::U8(*duty)])
                        })
                        .collect();
                    let result = transport
                        .call(
                            services::PLATFORM,
                            BusRequest::Call {
                                path: paths::PLATFORM.to_string(),
                                interface: interfaces::PLATFORM.to_string(),
                                method: "SetFanCurve".to_string(),
                                args: vec![
                                    Value::U32(profile),
                                    Value::U32(fan),
                                    Value::List(point_values),
                                    Value::Bool(enabled),
                                ],
                            },
                        )
                        .await
                        .and_then(expect_ack);
                    let _ = done_tx.send(PlatformDone::FanCurveSet { result });
                });
            }
        }
    }

    async fn handle_done(&mut self, done: PlatformDone) {
        match done {
            PlatformDone::ProfileFetched(result) => {
                let events = self.state.write().await.apply_profile_fetch(result);
                self.publish(events);
            }
            PlatformDone::ChargeFetched(result) => {
                let events = self.state.write().await.apply_charge_fetch(result);
                self.publish(events);
            }
            PlatformDone::LampResolved(result) => {
                self.discovery_in_flight = false;
                let resolved = self
                    .state
                    .write()
                    .await
                    .lamp_mut()
                    .resolve(result)
                    .map(String::from);
                let queued = std::mem::take(&mut self.queued_lamp_ops);
                match resolved {
                    Some(_) => {
                        for op in queued {
                            self.lamp_op(op).await;
                        }
                    }
                    None => {
                        // Discovery failed: the whole property group reports
                        // unavailable; only mutations surface an error
                        for op in queued {
                            if !matches!(op.kind, LampOpKind::FetchBrightness) {
                                self.publish(vec![PlatformEvent::Error(
                                    "Lamp control is not available".to_string(),
                                )]);
                            }
                        }
                    }
                }
            }
            PlatformDone::LampBrightnessFetched { op, result } => {
                if self.maybe_retry_lamp(&op, result.as_ref().err()).await {
                    return;
                }
                let events = self.state.write().await.apply_lamp_brightness_fetch(result);
                self.publish(events);
            }
            PlatformDone::LampBrightnessSet { op, result } => {
                if self.maybe_retry_lamp(&op, result.as_ref().err()).await {
                    return;
                }
                let value = match op.kind {
                    LampOpKind::SetBrightness(v) => v,
                    _ => return,
                };
                let events = self.state.write().await.finish_lamp_brightness_set(value, result);
                self.publish(events);
            }
            PlatformDone::LampEffectSet { op, result } => {
                if self.maybe_retry_lamp(&op, result.as_ref().err()).await {
                    return;
                }
                if let Err(e) = result {
                    self.publish(vec![PlatformEvent::Error(format!(
                        "Failed to set lamp effect: {}",
                        e
                    ))]);
                }
            }
            PlatformDone::ProfileSet { value, result } => {
                let events = self.state.write().await.finish_profile_set(value, result);
                self.publish(events);
            }
            PlatformDone::ChargeSet { value, result } => {
                let events = self.state.write().await.finish_charge_set(value, result);
                self.publish(events);
            }
            PlatformDone::FanCurveSet { result } => {
                if let Err(e) = result {
                    self.publish(vec![PlatformEvent::Error(format!(
                        "Failed to set fan curve: {}",
                        e
                    ))]);
                }
            }
        }
    }

    async fn handle_bus_event(&mut self, event: BusEvent) {
        match event {
            BusEvent::PropertiesChanged { service, interface, changed, .. }
                if service == services::PLATFORM =>
            {
                let events = self
                    .state
                    .write()
                    .await
                    .apply_properties_changed(&interface, &changed);
                self.publish(events);
            }
            BusEvent::ServiceRegistered { service } if service == services::PLATFORM => {
                let events = {
                    let mut state = self.state.write().await;
                    // The daemon may have come back with the lamp device on a
                    // different path
                    state.lamp_mut().invalidate();
                    state.set_available(true)
                };
                self.publish(events);
                self.handle_cmd(PlatformCmd::Refresh).await;
            }
            BusEvent::ServiceUnregistered { service } if service == services::PLATFORM => {
                let events = self.state.write().await.set_available(false);
                self.publish(events);
            }
            _ => {}
        }
    }

    /// Issue a lamp operation, resolving the device path first if needed
    async fn lamp_op(&mut self, op: LampOp) {
        let (path, needs_discovery, failed) = {
            let state = self.state.read().await;
            (
                state.lamp_path().map(String::from),
                state.lamp_needs_discovery(),
                !state.lamp_available(),
            )
        };

        if let Some(path) = path {
            self.spawn_lamp_call(path, op);
            return;
        }
        if failed {
            if !matches!(op.kind, LampOpKind::FetchBrightness) {
                self.publish(vec![PlatformEvent::Error(
                    "Lamp control is not available".to_string(),
                )]);
            }
            return;
        }
        if needs_discovery {
            self.queued_lamp_ops.push(op);
            self.spawn_discovery();
        }
    }

    fn spawn_discovery(&mut self) {
        if self.discovery_in_flight {
            return;
        }
        self.discovery_in_flight = true;
        debug!("Resolving lamp device path");
        let transport = self.transport.clone();
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let result = transport
                .call(
                    services::PLATFORM,
                    BusRequest::Introspect { path: paths::LAMP_PARENT.to_string() },
                )
                .await
                .and_then(|response| match response {
                    BusResponse::Ok(data) => data
                        .node_xml
                        .ok_or_else(|| PanelError::DiscoveryFailed("empty description".to_string())),
                    BusResponse::Error { message } => Err(PanelError::CallFailed(message)),
                });
            let _ = done_tx.send(PlatformDone::LampResolved(result));
        });
    }

    fn spawn_lamp_call(&self, path: String, op: LampOp) {
        let transport = self.transport.clone();
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            match op.kind.clone() {
                LampOpKind::FetchBrightness => {
                    let result = transport
                        .call(
                            services::PLATFORM,
                            BusRequest::GetProperty {
                                path,
                                interface: interfaces::LAMP.to_string(),
                                name: PROP_BRIGHTNESS.to_string(),
                            },
                        )
                        .await
                        .and_then(decode_u32);
                    let _ = done_tx.send(PlatformDone::LampBrightnessFetched { op, result });
                }
                LampOpKind::SetBrightness(value) => {
                    let result = transport
                        .call(
                            services::PLATFORM,
                            BusRequest::SetProperty {
                                path,
                                interface: interfaces::LAMP.to_string(),
                                name: PROP_BRIGHTNESS.to_string(),
                                value: Value::U32(value),
                            },
                        )
                        .await
                        .and_then(expect_ack);
                    let _ = done_tx.send(PlatformDone::LampBrightnessSet { op, result });
                }
                LampOpKind::SetEffect(effect) => {
                    let result = transport
                        .call(
                            services::PLATFORM,
                            BusRequest::Call {
                                path,
                                interface: interfaces::LAMP.to_string(),
                                method: "SetLampMode".to_string(),
                                args: effect_args(&effect),
                            },
                        )
                        .await
                        .and_then(expect_ack);
                    let _ = done_tx.send(PlatformDone::LampEffectSet { op, result });
                }
            }
        });
    }

    /// If a lamp call failed because the cached path went stale, invalidate
    /// the path and retry the operation once after re-discovery.
    async fn maybe_retry_lamp(&mut self, op: &LampOp, error: Option<&PanelError>) -> bool {
        let Some(error) = error else { return false };
        if op.retried || !error.is_not_found() {
            return false;
        }
        debug!("Lamp path went stale, re-running discovery");
        self.state.write().await.lamp_mut().invalidate();
        self.queued_lamp_ops.push(LampOp {
            kind: op.kind.clone(),
            retried: true,
        });
        self.spawn_discovery();
        true
    }

    fn fetch_profile(&self) {
        let transport = self.transport.clone();
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let result = transport
                .call(
                    services::PLATFORM,
                    get_property(paths::PLATFORM, interfaces::PLATFORM, PROP_PROFILE),
                )
                .await
                .and_then(decode_u32);
            let _ = done_tx.send(PlatformDone::ProfileFetched(result));
        });
    }

    fn fetch_charge_limit(&self) {
        let transport = self.transport.clone();
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let result = transport
                .call(
                    services::PLATFORM,
                    get_property(paths::PLATFORM, interfaces::PLATFORM, PROP_CHARGE_LIMIT),
                )
                .await
                .and_then(decode_u8);
            let _ = done_tx.send(PlatformDone::ChargeFetched(result));
        });
    }

    fn publish_unreachable(&self) {
        self.publish(vec![PlatformEvent::Error(
            PanelError::unreachable(services::PLATFORM).to_string(),
        )]);
    }

    fn publish(&self, events: Vec<PlatformEvent>) {
        for event in events {
            let _ = self.events_tx.send(event);
        }
    }
}

// ============================================================================
// Wire Helpers
// ============================================================================

fn get_property(path: &str, interface: &str, name: &str) -> BusRequest {
    BusRequest::GetProperty {
        path: path.to_string(),
        interface: interface.to_string(),
        name: name.to_string(),
    }
}

fn set_property(path: &str, interface: &str, name: &str, value: Value) -> BusRequest {
    BusRequest::SetProperty {
        path: path.to_string(),
        interface: interface.to_string(),
        name: name.to_string(),
        value,
    }
}

fn expect_ack(response: BusResponse) -> Result<()> {
    match response {
        BusResponse::Ok(_) => Ok(()),
        BusResponse::Error { message } => Err(PanelError::CallFailed(message)),
    }
}

fn decode_u32(response: BusResponse) -> Result<u32> {
    match response {
        BusResponse::Ok(data) => data
            .value
            .as_ref()
            .and_then(Value::as_u32)
            .ok_or_else(|| PanelError::Protocol("expected integer value".to_string())),
        BusResponse::Error { message } => Err(PanelError::CallFailed(message)),
    }
}

fn decode_u8(response: BusResponse) -> Result<u8> {
    match response {
        BusResponse::Ok(data) => data
            .value
            .as_ref()
            .and_then(Value::as_u8)
            .ok_or_else(|| PanelError::Protocol("expected byte value".to_string())),
        BusResponse::Error { message } => Err(PanelError::CallFailed(message)),
    }
}

fn effect_args(effect: &LampEffect) -> Vec<Value> {
    let color = |c: (u8, u8, u8)| Value::List(vec![Value::U8(c.0), Value::U8(c.1), Value::U8(c.2)]);
    vec![
        Value::U32(effect.mode),
        color(effect.color1),
        effect.color2.map(color).unwrap_or(Value::List(Vec::new())),
        Value::U8(effect.speed),
    ]
}
