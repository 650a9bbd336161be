//! End-to-end tests of the synchronization layer against a scripted
//! transport: service registration flows, cache population, the lamp path
//! discovery/retry dance and the full GPU switch lifecycle.

use std::sync::Arc;

use ch_bus::{BusEvent, Value};

use crate::constants::services;
use crate::gfx::{GfxClient, GfxEvent, GpuMode};
use crate::monitor::ServiceMonitor;
use crate::platform::PlatformClient;
use crate::testutil::{wait_until, FakeTransport};

#[tokio::test]
async fn test_monitor_reacts_to_push_registration() {
    let transport = FakeTransport::new();
    let monitor = ServiceMonitor::spawn(transport.clone(), services::WATCHED).await;

    assert!(!monitor.all_reachable().await);
    assert!(monitor.retry_active().await);

    transport.register(services::PLATFORM);
    transport.push_event(BusEvent::ServiceRegistered {
        service: services::PLATFORM.to_string(),
    });
    wait_until(|| async { monitor.is_reachable(services::PLATFORM).await }).await;
    assert!(!monitor.all_reachable().await);
    assert!(monitor.retry_active().await, "one service still missing");

    transport.register(services::GFX);
    transport.push_event(BusEvent::ServiceRegistered {
        service: services::GFX.to_string(),
    });
    wait_until(|| async { monitor.all_reachable().await }).await;
    assert!(!monitor.retry_active().await, "poll stops once everything is up");
    assert_eq!(monitor.connection_status().await, "Connected");
}

#[tokio::test]
async fn test_monitor_manual_recheck_picks_up_services() {
    let transport = FakeTransport::new();
    let monitor = ServiceMonitor::spawn(transport.clone(), services::WATCHED).await;

    // Services appear without any push notification
    transport.register(services::PLATFORM);
    transport.register(services::GFX);
    monitor.check_now();

    wait_until(|| async { monitor.all_reachable().await }).await;
}

#[tokio::test]
async fn test_platform_refresh_populates_cache() {
    let transport = FakeTransport::new();
    transport.register(services::PLATFORM);
    transport.script_value("GetProperty:PlatformProfile", Value::U32(1));
    transport.script_value("GetProperty:ChargeLimit", Value::U8(80));
    transport.script_node_xml(r#"<node><node name="19b6_3_4"/></node>"#);
    transport.script_value("GetProperty:Brightness", Value::U32(2));

    let client = PlatformClient::spawn(transport.clone()).await;

    wait_until(|| async {
        let snapshot = client.snapshot().await;
        snapshot.profile() == Some(1)
            && snapshot.charge_limit() == Some(80)
            && snapshot.lamp_brightness() == Some(2)
    })
    .await;

    let snapshot = client.snapshot().await;
    assert_eq!(snapshot.lamp_path(), Some("/io/chassis/lamp/19b6_3_4"));
}

#[tokio::test]
async fn test_platform_set_profile_confirms_then_caches() {
    let transport = FakeTransport::new();
    transport.register(services::PLATFORM);
    transport.script_value("GetProperty:PlatformProfile", Value::U32(1));

    let client = PlatformClient::spawn(transport.clone()).await;
    wait_until(|| async { client.snapshot().await.profile() == Some(1) }).await;

    transport.script_ack("SetProperty:PlatformProfile");
    client.set_profile(2);
    wait_until(|| async { client.snapshot().await.profile() == Some(2) }).await;
}

#[tokio::test]
async fn test_platform_failed_set_keeps_cache() {
    let transport = FakeTransport::new();
    transport.register(services::PLATFORM);
    transport.script_value("GetProperty:ChargeLimit", Value::U8(100));

    let client = PlatformClient::spawn(transport.clone()).await;
    wait_until(|| async { client.snapshot().await.charge_limit() == Some(100) }).await;

    let mut events = client.subscribe();
    transport.script_call_failed("SetProperty:ChargeLimit", "write rejected");
    client.set_charge_limit(60);

    // The error surfaces as an event and the cache stays put
    let event = tokio::time::timeout(std::time::Duration::from_secs(2), async {
        loop {
            if let Ok(crate::platform::PlatformEvent::Error(message)) = events.recv().await {
                break message;
            }
        }
    })
    .await
    .expect("error event");
    assert!(event.contains("write rejected"));
    assert_eq!(client.snapshot().await.charge_limit(), Some(100));
}

#[tokio::test]
async fn test_lamp_stale_path_triggers_rediscovery() {
    let transport = FakeTransport::new();
    transport.register(services::PLATFORM);
    transport.script_node_xml(r#"<node name="aaa"/>"#);
    transport.script_value("GetProperty:Brightness", Value::U32(1));

    let client = PlatformClient::spawn(transport.clone()).await;
    wait_until(|| async { client.snapshot().await.lamp_path() == Some("/io/chassis/lamp/aaa") })
        .await;

    // The daemon restarted and re-homed the lamp device: the cached path now
    // answers not-found, discovery re-runs, and the write is retried once
    transport.script_call_failed("SetProperty:Brightness", "Object not found");
    transport.script_node_xml(r#"<node name="bbb"/>"#);
    transport.script_ack("SetProperty:Brightness");

    client.set_lamp_brightness(3);
    wait_until(|| async {
        let snapshot = client.snapshot().await;
        snapshot.lamp_path() == Some("/io/chassis/lamp/bbb") && snapshot.lamp_brightness() == Some(3)
    })
    .await;
}

#[tokio::test]
async fn test_gfx_switch_with_restart_and_confirmation() {
    let transport = FakeTransport::new();
    transport.register(services::GFX);
    transport.script_value("Call:Mode", Value::U32(GpuMode::Hybrid.code()));
    transport.script_value("Call:Power", Value::U32(0));
    transport.script_list("Call:Supported", vec![Value::U32(0), Value::U32(1), Value::U32(2)]);

    let client = GfxClient::spawn(transport.clone()).await;
    wait_until(|| async { client.snapshot().await.current_mode() == GpuMode::Hybrid }).await;

    let mut events = client.subscribe();
    transport.script_ack("Call:SetMode");
    client.set_mode(GpuMode::Discrete);

    wait_until(|| async {
        client.snapshot().await.pending_mode() == Some(GpuMode::Discrete)
    })
    .await;
    assert_eq!(client.snapshot().await.current_mode(), GpuMode::Hybrid);

    let restart_name = tokio::time::timeout(std::time::Duration::from_secs(2), async {
        loop {
            if let Ok(GfxEvent::RestartRequired { display_name, .. }) = events.recv().await {
                break display_name;
            }
        }
    })
    .await
    .expect("restart-required event");
    assert_eq!(restart_name, "Dedicated");

    // After the session restart, the daemon broadcasts a status change and
    // the re-fetch reports the new mode
    transport.script_value("Call:Mode", Value::U32(GpuMode::Discrete.code()));
    transport.script_value("Call:Power", Value::U32(4));
    transport.push_event(BusEvent::StatusChanged {
        service: services::GFX.to_string(),
        code: 1,
    });

    wait_until(|| async {
        let snapshot = client.snapshot().await;
        snapshot.current_mode() == GpuMode::Discrete && snapshot.pending_mode().is_none()
    })
    .await;
}

#[tokio::test]
async fn test_gfx_switch_without_restart_is_immediate() {
    let transport = FakeTransport::new();
    transport.register(services::GFX);
    transport.script_value("Call:Mode", Value::U32(GpuMode::Hybrid.code()));

    let client = GfxClient::spawn(transport.clone()).await;
    wait_until(|| async { client.snapshot().await.current_mode() == GpuMode::Hybrid }).await;

    transport.script_ack("Call:SetMode");
    client.set_mode(GpuMode::Integrated);

    wait_until(|| async { client.snapshot().await.current_mode() == GpuMode::Integrated }).await;
    assert!(client.snapshot().await.pending_mode().is_none());
}

#[tokio::test]
async fn test_gfx_unavailable_set_raises_error() {
    let transport = FakeTransport::new();
    let client = GfxClient::spawn(transport.clone()).await;
    assert!(!client.available().await);

    let mut events = client.subscribe();
    client.set_mode(GpuMode::Discrete);

    let message = tokio::time::timeout(std::time::Duration::from_secs(2), async {
        loop {
            if let Ok(GfxEvent::Error(message)) = events.recv().await {
                break message;
            }
        }
    })
    .await
    .expect("error event");
    assert!(message.contains("unreachable"));

    // No command went out
    assert!(transport.calls().iter().all(|(_, req)| {
        !matches!(req, ch_bus::BusRequest::Call { method, .. } if method == "SetMode")
    }));
}
