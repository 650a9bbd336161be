//! Service Availability Monitor
//!
//! Tracks reachability of the watched daemons. Two independent triggers
//! update the state: push events from the transport announcing a service
//! appeared or disappeared (applied immediately), and a fixed 5 s retry tick
//! that re-probes directly, used only as a fallback while any service is
//! unreachable and stopped the instant all are reachable.
//!
//! Every flip is reported, no debouncing. Refreshing dependent property
//! caches on a reachable-transition is the owner's job, not done here.

use std::sync::Arc;
use std::time::Instant;

use ch_bus::{BusEvent, Transport};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info};

use crate::constants::timing::RETRY_INTERVAL;

/// One watched daemon. Created at monitor construction, never destroyed.
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    pub name: String,
    pub reachable: bool,
    pub last_transition: Instant,
}

/// Notifications raised whenever any service's reachability flips
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    ReachabilityChanged { service: String, reachable: bool },
    /// Human-readable aggregate status ("Connected" / "Disconnected: …")
    StatusChanged(String),
}

// ============================================================================
// State Machine
// ============================================================================

/// Pure reachability state. All transitions go through the `apply_*`
/// methods, which return the events the owner must publish.
#[derive(Debug, Clone)]
pub struct MonitorState {
    services: Vec<ServiceEndpoint>,
    retry_active: bool,
}

impl MonitorState {
    pub fn new(names: &[&str]) -> Self {
        let now = Instant::now();
        Self {
            services: names
                .iter()
                .map(|name| ServiceEndpoint {
                    name: name.to_string(),
                    reachable: false,
                    last_transition: now,
                })
                .collect(),
            retry_active: true,
        }
    }

    pub fn is_reachable(&self, name: &str) -> bool {
        self.services
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.reachable)
            .unwrap_or(false)
    }

    pub fn all_reachable(&self) -> bool {
        self.services.iter().all(|s| s.reachable)
    }

    /// Whether the fallback retry tick is currently probing.
    /// Invariant: active exactly while `all_reachable()` is false.
    pub fn retry_active(&self) -> bool {
        self.retry_active
    }

    pub fn endpoints(&self) -> &[ServiceEndpoint] {
        &self.services
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }

    /// Aggregate connectivity as a user-facing string
    pub fn connection_status(&self) -> String {
        if self.all_reachable() {
            return "Connected".to_string();
        }
        let missing: Vec<&str> = self
            .services
            .iter()
            .filter(|s| !s.reachable)
            .map(|s| s.name.as_str())
            .collect();
        format!("Disconnected: {}", missing.join(", "))
    }

    /// Apply a direct probe result or a push registration edge
    pub fn apply_reachability(&mut self, name: &str, reachable: bool) -> Vec<MonitorEvent> {
        let mut events = Vec::new();
        let Some(endpoint) = self.services.iter_mut().find(|s| s.name == name) else {
            return events;
        };
        if endpoint.reachable == reachable {
            self.update_retry();
            return events;
        }

        endpoint.reachable = reachable;
        endpoint.last_transition = Instant::now();
        info!(service = %name, reachable, "Service reachability changed");

        events.push(MonitorEvent::ReachabilityChanged {
            service: name.to_string(),
            reachable,
        });
        events.push(MonitorEvent::StatusChanged(self.connection_status()));

        self.update_retry();
        events
    }

    fn update_retry(&mut self) {
        let should_run = !self.all_reachable();
        if self.retry_active != should_run {
            self.retry_active = should_run;
            debug!(active = should_run, "Retry poll {}", if should_run { "started" } else { "stopped" });
        }
    }
}

// ============================================================================
// Monitor Actor
// ============================================================================

/// Handle to the running monitor task
pub struct ServiceMonitor {
    state: Arc<RwLock<MonitorState>>,
    events_tx: broadcast::Sender<MonitorEvent>,
    recheck_tx: mpsc::UnboundedSender<()>,
}

impl ServiceMonitor {
    /// Construct the monitor and probe every watched service immediately.
    pub async fn spawn(transport: Arc<dyn Transport>, services: &[&str]) -> Self {
        let mut state = MonitorState::new(services);

        // Initial reachability check, before the task starts
        for name in services {
            let reachable = transport.service_registered(name).await;
            // Nobody is subscribed yet; the initial probe sets state silently
            let _ = state.apply_reachability(name, reachable);
        }

        let (events_tx, _) = broadcast::channel(64);
        let (recheck_tx, recheck_rx) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(state));

        // Subscribe before the task starts so no registration edge between
        // construction and the first poll of the loop is lost
        let bus_events = transport.events();
        tokio::spawn(run_monitor(
            transport,
            bus_events,
            state.clone(),
            events_tx.clone(),
            recheck_rx,
        ));

        Self {
            state,
            events_tx,
            recheck_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events_tx.subscribe()
    }

    pub async fn is_reachable(&self, name: &str) -> bool {
        self.state.read().await.is_reachable(name)
    }

    pub async fn all_reachable(&self) -> bool {
        self.state.read().await.all_reachable()
    }

    pub async fn connection_status(&self) -> String {
        self.state.read().await.connection_status()
    }

    pub async fn retry_active(&self) -> bool {
        self.state.read().await.retry_active()
    }

    /// Force an immediate re-probe of every watched service
    pub fn check_now(&self) {
        let _ = self.recheck_tx.send(());
    }
}

async fn run_monitor(
    transport: Arc<dyn Transport>,
    mut bus_events: broadcast::Receiver<BusEvent>,
    state: Arc<RwLock<MonitorState>>,
    events_tx: broadcast::Sender<MonitorEvent>,
    mut recheck_rx: mpsc::UnboundedReceiver<()>,
) {
    let mut retry = tokio::time::interval(RETRY_INTERVAL);
    retry.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    retry.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            event = bus_events.recv() => match event {
                Ok(BusEvent::ServiceRegistered { service }) => {
                    apply(&state, &events_tx, &service, true).await;
                }
                Ok(BusEvent::ServiceUnregistered { service }) => {
                    apply(&state, &events_tx, &service, false).await;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("Monitor lagged {} bus events, re-probing", n);
                    probe_all(&transport, &state, &events_tx).await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = retry.tick() => {
                // Fallback poll, only while something is unreachable
                if state.read().await.retry_active() {
                    debug!("Retrying service connections");
                    probe_all(&transport, &state, &events_tx).await;
                }
            }
            Some(()) = recheck_rx.recv() => {
                probe_all(&transport, &state, &events_tx).await;
            }
        }
    }
}

async fn apply(
    state: &Arc<RwLock<MonitorState>>,
    events_tx: &broadcast::Sender<MonitorEvent>,
    service: &str,
    reachable: bool,
) {
    let events = state.write().await.apply_reachability(service, reachable);
    for event in events {
        let _ = events_tx.send(event);
    }
}

async fn probe_all(
    transport: &Arc<dyn Transport>,
    state: &Arc<RwLock<MonitorState>>,
    events_tx: &broadcast::Sender<MonitorEvent>,
) {
    let names = state.read().await.service_names();
    for name in names {
        let reachable = transport.service_registered(&name).await;
        apply(state, events_tx, &name, reachable).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_service_state() -> MonitorState {
        MonitorState::new(&["io.chassis.Powerd", "io.chassis.Gfxd"])
    }

    /// all_reachable() must equal the AND of the individual flags at every
    /// point of an arbitrary transition sequence.
    #[test]
    fn test_aggregate_is_conjunction() {
        let mut state = two_service_state();
        let flips = [
            ("io.chassis.Powerd", true),
            ("io.chassis.Gfxd", true),
            ("io.chassis.Powerd", false),
            ("io.chassis.Powerd", true),
            ("io.chassis.Gfxd", false),
            ("io.chassis.Gfxd", true),
        ];
        for (name, reachable) in flips {
            state.apply_reachability(name, reachable);
            let conjunction = state.is_reachable("io.chassis.Powerd")
                && state.is_reachable("io.chassis.Gfxd");
            assert_eq!(state.all_reachable(), conjunction);
        }
    }

    /// The retry poll runs exactly while some service is unreachable.
    #[test]
    fn test_retry_active_iff_not_all_reachable() {
        let mut state = two_service_state();
        assert!(state.retry_active());

        state.apply_reachability("io.chassis.Powerd", true);
        assert!(state.retry_active(), "one service still down");

        state.apply_reachability("io.chassis.Gfxd", true);
        assert!(!state.retry_active(), "everything up, poll must stop");

        state.apply_reachability("io.chassis.Gfxd", false);
        assert!(state.retry_active(), "poll must restart on loss");
    }

    /// Registration scenario: A up -> still disconnected, B up -> connected.
    #[test]
    fn test_two_service_registration_sequence() {
        let mut state = two_service_state();
        assert!(!state.all_reachable());

        let events = state.apply_reachability("io.chassis.Powerd", true);
        assert!(state.is_reachable("io.chassis.Powerd"));
        assert!(!state.all_reachable());
        assert!(state.retry_active());
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            MonitorEvent::ReachabilityChanged { service, reachable: true }
                if service == "io.chassis.Powerd"
        ));

        let events = state.apply_reachability("io.chassis.Gfxd", true);
        assert!(state.all_reachable());
        assert!(!state.retry_active());
        // The reachable-transition event is what the owner uses to refresh
        // dependent caches
        assert!(matches!(
            &events[0],
            MonitorEvent::ReachabilityChanged { reachable: true, .. }
        ));
    }

    /// Repeated probes with an unchanged result must not raise events.
    #[test]
    fn test_no_event_without_flip() {
        let mut state = two_service_state();
        let events = state.apply_reachability("io.chassis.Powerd", false);
        assert!(events.is_empty());

        state.apply_reachability("io.chassis.Powerd", true);
        let events = state.apply_reachability("io.chassis.Powerd", true);
        assert!(events.is_empty());
    }

    #[test]
    fn test_connection_status_strings() {
        let mut state = two_service_state();
        assert_eq!(
            state.connection_status(),
            "Disconnected: io.chassis.Powerd, io.chassis.Gfxd"
        );

        state.apply_reachability("io.chassis.Powerd", true);
        assert_eq!(state.connection_status(), "Disconnected: io.chassis.Gfxd");

        state.apply_reachability("io.chassis.Gfxd", true);
        assert_eq!(state.connection_status(), "Connected");
    }

    #[test]
    fn test_unknown_service_ignored() {
        let mut state = two_service_state();
        let events = state.apply_reachability("io.chassis.Unknown", true);
        assert!(events.is_empty());
        assert!(!state.is_reachable("io.chassis.Unknown"));
    }
}
