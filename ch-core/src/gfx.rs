//! GPU Mode Switch Coordinator
//!
//! Client for the graphics-mode daemon. Mode switching is not atomic: a
//! transition touching the MUX (dedicated) or VFIO (pass-through) mode is
//! only applied by the daemon after the user session restarts, so the
//! coordinator tracks a pending target alongside the confirmed current mode
//! and reconciles the two from the daemon's status notifications.
//!
//! State machine: `Stable(current)` / `Pending(current, target)`. At most
//! one pending switch; a second request overwrites the previous target.

use std::sync::Arc;

use ch_bus::{BusEvent, BusRequest, BusResponse, Transport, Value};
use ch_error::{PanelError, Result};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, warn};

use crate::constants::{interfaces, paths, services};

// ============================================================================
// Modes and Power States
// ============================================================================

/// Graphics mode as enumerated by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuMode {
    /// iGPU only, dGPU powered off
    Integrated,
    /// Automatic switching between iGPU and dGPU
    Hybrid,
    /// dGPU only via the MUX switch
    Discrete,
    /// dGPU passed through to a virtual machine
    Vfio,
    /// External GPU over Thunderbolt
    Egpu,
}

/// Every mode, for iterating the full enumeration
pub const ALL_MODES: [GpuMode; 5] = [
    GpuMode::Integrated,
    GpuMode::Hybrid,
    GpuMode::Discrete,
    GpuMode::Vfio,
    GpuMode::Egpu,
];

impl GpuMode {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Integrated),
            1 => Some(Self::Hybrid),
            2 => Some(Self::Discrete),
            3 => Some(Self::Vfio),
            4 => Some(Self::Egpu),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::Integrated => 0,
            Self::Hybrid => 1,
            Self::Discrete => 2,
            Self::Vfio => 3,
            Self::Egpu => 4,
        }
    }

    /// User-facing name
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Integrated => "Eco",
            Self::Hybrid => "Hybrid",
            Self::Discrete => "Dedicated",
            Self::Vfio => "VFIO",
            Self::Egpu => "eGPU",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Integrated => "Uses only the integrated GPU. Best battery life, lowest power consumption.",
            Self::Hybrid => "Automatic GPU switching. dGPU activates when needed.",
            Self::Discrete => "Uses only the discrete GPU. Best performance, highest power consumption.",
            Self::Vfio => "Passes the discrete GPU to a virtual machine.",
            Self::Egpu => "Uses an external GPU connected via Thunderbolt.",
        }
    }
}

/// Whether switching between two modes needs a session restart before the
/// daemon applies it. True whenever either endpoint is the exclusive
/// discrete (MUX) mode or the pass-through (VFIO) mode.
pub fn requires_session_restart(from: GpuMode, to: GpuMode) -> bool {
    if from == GpuMode::Discrete || to == GpuMode::Discrete {
        return true;
    }
    if from == GpuMode::Vfio || to == GpuMode::Vfio {
        return true;
    }
    false
}

/// Discrete GPU power state as reported by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuPower {
    Active,
    Suspended,
    Off,
    Disabled,
    MuxDiscrete,
    Unknown,
}

impl GpuPower {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Active,
            1 => Self::Suspended,
            2 => Self::Off,
            3 => Self::Disabled,
            4 => Self::MuxDiscrete,
            _ => Self::Unknown,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Suspended => "Suspended",
            Self::Off => "Off",
            Self::Disabled => "Disabled",
            Self::MuxDiscrete => "MUX Discrete",
            Self::Unknown => "Unknown",
        }
    }
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone)]
pub enum GfxEvent {
    AvailableChanged(bool),
    ModeChanged(GpuMode),
    /// The pending target changed (Some while a restart-gated switch is
    /// outstanding, None once confirmed)
    PendingChanged(Option<GpuMode>),
    SwitchPending(bool),
    /// A restart-gated switch was accepted; the session must restart before
    /// the daemon applies it
    RestartRequired { mode: GpuMode, display_name: String },
    /// A previously pending switch was confirmed by the daemon
    SwitchConfirmed(GpuMode),
    PowerChanged(GpuPower),
    SupportedModesChanged(Vec<GpuMode>),
    Error(String),
}

// ============================================================================
// State Machine
// ============================================================================

/// Coordinator state. Mutated only by the owning task; every transition
/// returns the events to publish.
#[derive(Debug, Clone)]
pub struct GfxState {
    available: bool,
    current: GpuMode,
    pending: Option<GpuMode>,
    power: GpuPower,
    supported: Vec<GpuMode>,
}

impl GfxState {
    pub fn new(available: bool) -> Self {
        Self {
            available,
            current: GpuMode::Hybrid,
            pending: None,
            power: GpuPower::Unknown,
            supported: Vec::new(),
        }
    }

    pub fn available(&self) -> bool {
        self.available
    }

    pub fn current_mode(&self) -> GpuMode {
        self.current
    }

    pub fn pending_mode(&self) -> Option<GpuMode> {
        self.pending
    }

    pub fn switch_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn power(&self) -> GpuPower {
        self.power
    }

    pub fn supported_modes(&self) -> &[GpuMode] {
        &self.supported
    }

    pub fn set_available(&mut self, available: bool) -> Vec<GfxEvent> {
        if self.available == available {
            return Vec::new();
        }
        self.available = available;
        vec![GfxEvent::AvailableChanged(available)]
    }

    /// Apply the outcome of a mode fetch. Confirms the pending switch when
    /// the daemon now reports the pending target.
    pub fn apply_mode_fetch(&mut self, mode: GpuMode) -> Vec<GfxEvent> {
        let mut events = Vec::new();
        if self.current != mode {
            self.current = mode;
            events.push(GfxEvent::ModeChanged(mode));
        }
        if self.pending == Some(mode) {
            self.pending = None;
            events.push(GfxEvent::SwitchPending(false));
            events.push(GfxEvent::PendingChanged(None));
            events.push(GfxEvent::SwitchConfirmed(mode));
        }
        events
    }

    pub fn apply_power_fetch(&mut self, power: GpuPower) -> Vec<GfxEvent> {
        if self.power == power {
            return Vec::new();
        }
        self.power = power;
        vec![GfxEvent::PowerChanged(power)]
    }

    /// Apply the supported-modes fetch; falls back to the common pair when
    /// the daemon cannot answer.
    pub fn apply_supported_fetch(&mut self, result: Result<Vec<GpuMode>>) -> Vec<GfxEvent> {
        match result {
            Ok(modes) => self.supported = modes,
            Err(e) => {
                warn!("Failed to get supported GPU modes: {}", e);
                self.supported = vec![GpuMode::Integrated, GpuMode::Hybrid];
            }
        }
        vec![GfxEvent::SupportedModesChanged(self.supported.clone())]
    }

    /// Apply the outcome of a switch command.
    ///
    /// - failure: no state change, one error event
    /// - success without restart: immediately `Stable(target)`
    /// - success with restart: `Pending(current, target)`, current untouched
    pub fn apply_switch_result(
        &mut self,
        target: GpuMode,
        needs_restart: bool,
        result: Result<()>,
    ) -> Vec<GfxEvent> {
        if let Err(e) = result {
            warn!(mode = target.display_name(), "Failed to set GPU mode: {}", e);
            return vec![GfxEvent::Error(format!("Failed to set GPU mode: {}", e))];
        }

        if needs_restart {
            self.pending = Some(target);
            vec![
                GfxEvent::PendingChanged(Some(target)),
                GfxEvent::SwitchPending(true),
                GfxEvent::RestartRequired {
                    mode: target,
                    display_name: target.display_name().to_string(),
                },
            ]
        } else {
            self.current = target;
            vec![GfxEvent::ModeChanged(target)]
        }
    }
}

// ============================================================================
// Client Actor
// ============================================================================

enum GfxCmd {
    Refresh,
    SetMode(GpuMode),
}

enum GfxDone {
    ModeFetched(Result<GpuMode>),
    PowerFetched(Result<GpuPower>),
    SupportedFetched(Result<Vec<GpuMode>>),
    SwitchDone {
        target: GpuMode,
        needs_restart: bool,
        result: Result<()>,
    },
}

/// Handle to the graphics-mode client task
pub struct GfxClient {
    cmd_tx: mpsc::UnboundedSender<GfxCmd>,
    events_tx: broadcast::Sender<GfxEvent>,
    state: Arc<RwLock<GfxState>>,
}

impl GfxClient {
    pub async fn spawn(transport: Arc<dyn Transport>) -> Self {
        let available = transport.service_registered(services::GFX).await;
        let state = Arc::new(RwLock::new(GfxState::new(available)));

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(64);

        // Subscribe before the task starts so a status notification racing
        // the construction is not lost
        let bus_events = transport.events();
        tokio::spawn(run_gfx(
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

    pub fn subscribe(&self) -> broadcast::Receiver<GfxEvent> {
        self.events_tx.subscribe()
    }

    pub async fn snapshot(&self) -> GfxState {
        self.state.read().await.clone()
    }

    pub async fn available(&self) -> bool {
        self.state.read().await.available()
    }

    /// Re-fetch mode, power and supported modes (non-blocking)
    pub fn refresh(&self) {
        let _ = self.cmd_tx.send(GfxCmd::Refresh);
    }

    /// Request a mode switch (non-blocking). The outcome arrives as events.
    pub fn set_mode(&self, mode: GpuMode) {
        let _ = self.cmd_tx.send(GfxCmd::SetMode(mode));
    }
}

struct GfxActor {
    transport: Arc<dyn Transport>,
    state: Arc<RwLock<GfxState>>,
    events_tx: broadcast::Sender<GfxEvent>,
    done_tx: mpsc::UnboundedSender<GfxDone>,
}

async fn run_gfx(
    transport: Arc<dyn Transport>,
    mut bus_events: broadcast::Receiver<BusEvent>,
    state: Arc<RwLock<GfxState>>,
    events_tx: broadcast::Sender<GfxEvent>,
    mut cmd_rx: mpsc::UnboundedReceiver<GfxCmd>,
) {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let mut actor = GfxActor {
        transport,
        state,
        events_tx,
        done_tx,
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
                    // Missed notifications: reconcile by re-fetching
                    actor.fetch_mode_and_power();
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

impl GfxActor {
    async fn handle_cmd(&mut self, cmd: GfxCmd) {
        match cmd {
            GfxCmd::Refresh => {
                if self.state.read().await.available() {
                    self.fetch_mode_and_power();
                    self.fetch_supported();
                }
            }
            GfxCmd::SetMode(target) => self.begin_switch(target).await,
        }
    }

    async fn handle_done(&mut self, done: GfxDone) {
        let events = {
            let mut state = self.state.write().await;
            match done {
                GfxDone::ModeFetched(Ok(mode)) => state.apply_mode_fetch(mode),
                GfxDone::ModeFetched(Err(e)) => {
                    // A failed confirmation re-fetch is swallowed: the machine
                    // stays Pending and retries on the next notification
                    warn!("Failed to get GPU mode: {}", e);
                    Vec::new()
                }
                GfxDone::PowerFetched(Ok(power)) => state.apply_power_fetch(power),
                GfxDone::PowerFetched(Err(e)) => {
                    warn!("Failed to get GPU power status: {}", e);
                    Vec::new()
                }
                GfxDone::SupportedFetched(result) => state.apply_supported_fetch(result),
                GfxDone::SwitchDone { target, needs_restart, result } => {
                    state.apply_switch_result(target, needs_restart, result)
                }
            }
        };
        self.publish(events);
    }

    async fn handle_bus_event(&mut self, event: BusEvent) {
        match event {
            BusEvent::StatusChanged { service, code } if service == services::GFX => {
                debug!(code, "GPU status notification");
                self.fetch_mode_and_power();
            }
            BusEvent::ServiceRegistered { service } if service == services::GFX => {
                let events = self.state.write().await.set_available(true);
                self.publish(events);
                self.fetch_mode_and_power();
                self.fetch_supported();
            }
            BusEvent::ServiceUnregistered { service } if service == services::GFX => {
                let events = self.state.write().await.set_available(false);
                self.publish(events);
            }
            _ => {}
        }
    }

    async fn begin_switch(&mut self, target: GpuMode) {
        let (available, current) = {
            let state = self.state.read().await;
            (state.available(), state.current_mode())
        };
        if !available {
            self.publish(vec![GfxEvent::Error(
                PanelError::unreachable(services::GFX).to_string(),
            )]);
            return;
        }

        // Decide the restart branch against the mode current at issue time
        let needs_restart = requires_session_restart(current, target);
        let transport = self.transport.clone();
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let result = transport
                .call(services::GFX, method_call("SetMode", vec![Value::U32(target.code())]))
                .await
                .and_then(expect_ack);
            let _ = done_tx.send(GfxDone::SwitchDone {
                target,
                needs_restart,
                result,
            });
        });
    }

    fn fetch_mode_and_power(&self) {
        let transport = self.transport.clone();
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let result = transport
                .call(services::GFX, method_call("Mode", Vec::new()))
                .await
                .and_then(decode_mode);
            let _ = done_tx.send(GfxDone::ModeFetched(result));
        });

        let transport = self.transport.clone();
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let result = transport
                .call(services::GFX, method_call("Power", Vec::new()))
                .await
                .and_then(decode_power);
            let _ = done_tx.send(GfxDone::PowerFetched(result));
        });
    }

    fn fetch_supported(&self) {
        let transport = self.transport.clone();
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let result = transport
                .call(services::GFX, method_call("Supported", Vec::new()))
                .await
                .and_then(decode_supported);
            let _ = done_tx.send(GfxDone::SupportedFetched(result));
        });
    }

    fn publish(&self, events: Vec<GfxEvent>) {
        for event in events {
            let _ = self.events_tx.send(event);
        }
    }
}

// ============================================================================
// Wire Decoding
// ============================================================================

fn method_call(method: &str, args: Vec<Value>) -> BusRequest {
    BusRequest::Call {
        path: paths::GFX.to_string(),
        interface: interfaces::GFX.to_string(),
        method: method.to_string(),
        args,
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

fn decode_mode(response: BusResponse) -> Result<GpuMode> {
    let code = decode_u32(response)?;
    GpuMode::from_code(code)
        .ok_or_else(|| PanelError::Protocol(format!("unknown GPU mode code {}", code)))
}

fn decode_power(response: BusResponse) -> Result<GpuPower> {
    Ok(GpuPower::from_code(decode_u32(response)?))
}

fn decode_supported(response: BusResponse) -> Result<Vec<GpuMode>> {
    match response {
        BusResponse::Ok(data) => {
            let list = data
                .list
                .ok_or_else(|| PanelError::Protocol("expected mode list".to_string()))?;
            Ok(list
                .iter()
                .filter_map(Value::as_u32)
                .filter_map(GpuMode::from_code)
                .collect())
        }
        BusResponse::Error { message } => Err(PanelError::CallFailed(message)),
    }
}
