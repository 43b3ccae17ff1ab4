//! Client Tests
//!
//! End-to-end exchanges against a scripted in-memory light:
//! - Handshake, command and query sequencing
//! - Connection ownership (external vs. per-exchange)
//! - Timeouts and handshake failures
//! - Local state bookkeeping and observers
//! - Failed exchanges leave state unchanged

use glow_client::prelude::*;
use glow_core::{
    build_action_packet, build_brightness_body, Action, FieldMap, READ_CHAR_UUID,
    RECONNECT_PACKET, WRITE_CHAR_UUID,
};
use glow_test_utils::{HandshakeReply, MockDevice, StateReport};
use glow_transport::{Connection, TransportError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TOKEN: u64 = 0x2a;

fn client(device: &MockDevice) -> Glow {
    Glow::builder()
        .connector(device.connector())
        .handshake_timeout(Duration::from_millis(200))
        .state_response_timeout(Duration::from_millis(200))
        .build()
        .expect("client builds")
}

fn external_client(device: &MockDevice) -> Glow {
    Glow::builder()
        .connection(Arc::new(device.connection()))
        .handshake_timeout(Duration::from_millis(200))
        .state_response_timeout(Duration::from_millis(200))
        .build()
        .expect("client builds")
}

/// Dimming duration (ms) carried by a brightness command packet
fn dimming_ms(packet: &[u8]) -> Option<u64> {
    let outer = FieldMap::parse(packet);
    let body = FieldMap::parse(outer.last_bytes(4)?);
    let brightness = FieldMap::parse(body.last_bytes(18)?);
    brightness.last_varint(3)
}

// ============================================================================
// End-to-end sequencing
// ============================================================================

#[tokio::test]
async fn test_turn_on_sequence() {
    let device = MockDevice::new(TOKEN);
    let glow = client(&device);

    glow.turn_on(None).await.expect("turn_on");

    let writes = device.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].0, WRITE_CHAR_UUID);
    assert_eq!(writes[0].1.as_ref(), RECONNECT_PACKET);
    assert_eq!(writes[1].1, build_action_packet(TOKEN, &Action::TurnOn.body()));
    assert_eq!(
        writes[1].1.as_ref(),
        &[0x08, 0x01, 0x10, 0x2a, 0x22, 0x04, 0x1a, 0x02, 0x08, 0x02]
    );

    assert_eq!(device.subscriptions(), vec![READ_CHAR_UUID]);
    assert_eq!(device.connect_count(), 1);
    assert_eq!(device.disconnect_count(), 1);
    assert_eq!(glow.is_on(), Some(true));
}

#[tokio::test]
async fn test_query_state_fresh() {
    let device = MockDevice::new(TOKEN)
        .with_state_reply(StateReport::on(600_000, 900_000).battery(5).encode(TOKEN));
    let glow = client(&device);

    let snapshot = glow.query_state().await.expect("query_state");
    assert!(snapshot.is_fresh());

    let state = snapshot.state();
    assert_eq!(state.is_on, Some(true));
    assert_eq!(state.remaining_minutes, Some(10));
    assert_eq!(state.configured_minutes, Some(15));
    assert_eq!(state.is_paused, Some(false));
    assert_eq!(state.battery, Some(BatteryLevel::Pct75));
    assert!(state.raw_state.is_some());

    assert_eq!(glow.state(), *state);
    assert_eq!(
        device.command_writes(),
        vec![build_action_packet(TOKEN, &Action::QueryState.body())]
    );
}

#[tokio::test]
async fn test_query_state_timeout_is_stale() {
    let device = MockDevice::new(TOKEN);
    let glow = client(&device);

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    glow.register_observer(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let snapshot = glow.query_state().await.expect("timeout is not an error");
    assert!(!snapshot.is_fresh());
    assert_eq!(snapshot.into_state(), DeviceState::default());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(device.disconnect_count(), 1);
}

#[tokio::test]
async fn test_turn_on_with_brightness_runs_two_exchanges() {
    let device = MockDevice::new(TOKEN);
    let glow = client(&device);

    glow.turn_on(Some(Brightness::Pct80))
        .await
        .expect("turn_on");

    let commands = device.command_writes();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0], build_action_packet(TOKEN, &Action::TurnOn.body()));
    assert_eq!(
        commands[1],
        build_action_packet(TOKEN, &build_brightness_body(Brightness::Pct80, 900_000))
    );
    assert_eq!(device.connect_count(), 2);
    assert_eq!(device.disconnect_count(), 2);

    let state = glow.state();
    assert_eq!(state.is_on, Some(true));
    assert_eq!(state.brightness, Some(Brightness::Pct80));
}

#[tokio::test]
async fn test_state_before_ready_is_applied() {
    let device = MockDevice::new(TOKEN)
        .with_notification_before_ready(StateReport::off().battery(3).encode(TOKEN));
    let glow = client(&device);

    glow.turn_on(None).await.expect("turn_on");

    let state = glow.state();
    // The command's effect wins over the pre-command report
    assert_eq!(state.is_on, Some(true));
    assert_eq!(state.battery, Some(BatteryLevel::Pct25));
}

#[tokio::test]
async fn test_handshake_only() {
    let device = MockDevice::new(TOKEN);
    let glow = client(&device);

    glow.handshake().await.expect("handshake");

    assert!(device.command_writes().is_empty());
    assert_eq!(device.writes().len(), 1);
    assert_eq!(device.disconnect_count(), 1);
    assert_eq!(glow.state(), DeviceState::default());
}

// ============================================================================
// Connection ownership
// ============================================================================

#[tokio::test]
async fn test_external_connection_left_open() {
    let device = MockDevice::new(TOKEN).connected();
    let glow = external_client(&device);

    glow.turn_off().await.expect("turn_off");
    glow.pause().await.expect("pause");

    assert_eq!(device.connect_count(), 0);
    assert_eq!(device.disconnect_count(), 0);
    assert!(device.is_connected());
    assert_eq!(device.command_writes().len(), 2);
}

#[tokio::test]
async fn test_idle_external_connection_is_reconnected() {
    let device = MockDevice::new(TOKEN);
    let glow = external_client(&device);

    glow.resume().await.expect("resume");

    assert_eq!(device.connect_count(), 1);
    assert_eq!(device.disconnect_count(), 0);
    assert_eq!(glow.state().is_paused, Some(false));
}

#[tokio::test]
async fn test_set_connection_replaces_link() {
    let first = MockDevice::new(1).connected();
    let second = MockDevice::new(2).connected();
    let glow = external_client(&first);

    glow.set_connection(Some(Arc::new(second.connection())));
    glow.turn_on(None).await.expect("turn_on");

    assert!(first.writes().is_empty());
    assert_eq!(
        second.command_writes(),
        vec![build_action_packet(2, &Action::TurnOn.body())]
    );
}

#[tokio::test]
async fn test_internal_connection_closed_on_error() {
    let device = MockDevice::new(TOKEN).failing_commands();
    let glow = client(&device);

    let err = glow.turn_on(None).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Transport(TransportError::WriteFailed(_))
    ));
    assert_eq!(device.disconnect_count(), 1);
}

#[tokio::test]
async fn test_connect_failure_writes_nothing() {
    let device = MockDevice::new(TOKEN).failing_connect();
    let glow = client(&device);

    let err = glow.turn_off().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Transport(TransportError::ConnectionFailed(_))
    ));
    assert!(device.writes().is_empty());
}

#[test]
fn test_builder_requires_a_link() {
    let result = Glow::builder().build();
    assert!(matches!(result, Err(ClientError::InvalidArgument(_))));
}

// ============================================================================
// Handshake failures
// ============================================================================

#[tokio::test]
async fn test_handshake_timeout() {
    let device = MockDevice::new(TOKEN).with_handshake(HandshakeReply::Silent);
    let glow = client(&device);

    let err = glow.turn_on(None).await.unwrap_err();
    assert!(matches!(err, ClientError::HandshakeTimeout(d) if d == Duration::from_millis(200)));

    assert!(device.command_writes().is_empty());
    assert_eq!(device.disconnect_count(), 1);
    assert_eq!(glow.state(), DeviceState::default());
}

#[tokio::test]
async fn test_marker_without_token() {
    let device = MockDevice::new(TOKEN).with_handshake(HandshakeReply::MarkerOnly);
    let glow = client(&device);

    let err = glow.turn_on(None).await.unwrap_err();
    assert!(matches!(err, ClientError::Command(_)));
    assert!(device.command_writes().is_empty());
    assert_eq!(device.disconnect_count(), 1);
}

#[tokio::test]
async fn test_disconnect_during_handshake() {
    let device = MockDevice::new(TOKEN).with_handshake(HandshakeReply::Hangup);
    let glow = client(&device);

    let err = glow.handshake().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Transport(TransportError::ConnectionClosed)
    ));
}

// ============================================================================
// Brightness and dimming
// ============================================================================

#[tokio::test]
async fn test_set_brightness_defaults_to_15_minutes() {
    let device = MockDevice::new(TOKEN);
    let glow = client(&device);

    glow.set_brightness(Brightness::Pct60).await.expect("set_brightness");

    let commands = device.command_writes();
    assert_eq!(dimming_ms(&commands[0]), Some(900_000));
    assert_eq!(glow.state().brightness, Some(Brightness::Pct60));
}

#[tokio::test]
async fn test_set_brightness_uses_configured_not_remaining() {
    // 10 minutes left of a 30 minute sequence
    let device = MockDevice::new(TOKEN)
        .with_state_reply(StateReport::on(600_000, 1_800_000).encode(TOKEN));
    let glow = client(&device);

    glow.query_state().await.expect("query_state");
    glow.set_brightness(Brightness::Pct90).await.expect("set_brightness");

    let commands = device.command_writes();
    assert_eq!(commands.len(), 2);
    assert_eq!(dimming_ms(&commands[1]), Some(1_800_000));
}

#[tokio::test]
async fn test_set_brightness_ignores_sub_minute_configured_duration() {
    // 30 s rounds down to zero whole minutes, which is no usable setting
    let device =
        MockDevice::new(TOKEN).with_state_reply(StateReport::on(30_000, 30_000).encode(TOKEN));
    let glow = client(&device);

    glow.query_state().await.expect("query_state");
    assert_eq!(glow.state().configured_minutes, None);

    glow.set_brightness(Brightness::Pct80).await.expect("set_brightness");

    let commands = device.command_writes();
    assert_eq!(commands.len(), 2);
    assert_eq!(dimming_ms(&commands[1]), Some(900_000));
}

#[tokio::test]
async fn test_set_dimming_time_requires_brightness() {
    let device = MockDevice::new(TOKEN);
    let glow = client(&device);

    let err = glow.set_dimming_time(DimmingTime::Min30).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidArgument(_)));
    assert!(device.writes().is_empty());
    assert_eq!(device.connect_count(), 0);
}

#[tokio::test]
async fn test_set_dimming_time_keeps_brightness() {
    let device = MockDevice::new(TOKEN);
    let glow = client(&device);

    glow.set_brightness(Brightness::Pct70).await.expect("set_brightness");
    glow.set_dimming_time(DimmingTime::Min45).await.expect("set_dimming_time");

    let commands = device.command_writes();
    assert_eq!(
        commands[1],
        build_action_packet(TOKEN, &build_brightness_body(Brightness::Pct70, 2_700_000))
    );

    let state = glow.state();
    assert_eq!(state.configured_minutes, Some(45));
    assert_eq!(state.brightness, Some(Brightness::Pct70));

    // later brightness changes keep the new duration
    glow.set_brightness(Brightness::Pct100).await.expect("set_brightness");
    assert_eq!(dimming_ms(&device.command_writes()[2]), Some(2_700_000));
}

// ============================================================================
// Local state bookkeeping
// ============================================================================

#[tokio::test]
async fn test_turn_off_clears_countdown() {
    let device = MockDevice::new(TOKEN)
        .with_state_reply(StateReport::on(600_000, 900_000).paused(true).encode(TOKEN));
    let glow = client(&device);

    glow.query_state().await.expect("query_state");
    assert_eq!(glow.state().is_paused, Some(true));

    glow.turn_off().await.expect("turn_off");
    let state = glow.state();
    assert_eq!(state.is_on, Some(false));
    assert_eq!(state.remaining_minutes, Some(0));
    assert_eq!(state.is_paused, Some(false));
    assert_eq!(state.configured_minutes, Some(15));
}

#[tokio::test]
async fn test_pause_resume_flags() {
    let device = MockDevice::new(TOKEN);
    let glow = client(&device);

    glow.pause().await.expect("pause");
    assert_eq!(glow.state().is_paused, Some(true));
    glow.resume().await.expect("resume");
    assert_eq!(glow.state().is_paused, Some(false));

    assert_eq!(
        device.command_writes(),
        vec![
            build_action_packet(TOKEN, &Action::Pause.body()),
            build_action_packet(TOKEN, &Action::Resume.body()),
        ]
    );
}

#[tokio::test]
async fn test_failed_exchange_leaves_state_unchanged() {
    let device = MockDevice::new(TOKEN)
        .with_notification_before_ready(StateReport::on(60_000, 900_000).encode(TOKEN))
        .failing_commands();
    let glow = client(&device);

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    glow.register_observer(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(glow.turn_on(None).await.is_err());
    assert_eq!(glow.state(), DeviceState::default());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Observers
// ============================================================================

#[tokio::test]
async fn test_observers_fire_once_per_operation() {
    let device = MockDevice::new(TOKEN);
    let glow = client(&device);

    let calls = Arc::new(AtomicU32::new(0));
    let seen_on = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let on_counter = Arc::clone(&seen_on);
    let id = glow.register_observer(move |state| {
        counter.fetch_add(1, Ordering::SeqCst);
        if state.is_on == Some(true) {
            on_counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    glow.turn_on(None).await.expect("turn_on");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(seen_on.load(Ordering::SeqCst), 1);

    glow.turn_on(Some(Brightness::Pct100)).await.expect("turn_on");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    assert!(glow.unregister_observer(id));
    assert!(!glow.unregister_observer(id));

    glow.turn_off().await.expect("turn_off");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_observer_ids_are_unique() {
    let device = MockDevice::new(TOKEN);
    let glow = client(&device);

    let a = glow.register_observer(|_| {});
    let b = glow.register_observer(|_| {});
    assert_ne!(a, b);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_concurrent_operations_are_serialized() {
    let device = MockDevice::new(TOKEN).connected();
    let glow = Arc::new(external_client(&device));

    let mut handles = Vec::new();
    for i in 0..8 {
        let glow = Arc::clone(&glow);
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                glow.pause().await
            } else {
                glow.resume().await
            }
        }));
    }
    for handle in handles {
        handle.await.expect("task").expect("operation");
    }

    // Each exchange is reconnect followed by exactly one command
    let writes = device.writes();
    assert_eq!(writes.len(), 16);
    for pair in writes.chunks(2) {
        assert_eq!(pair[0].1.as_ref(), RECONNECT_PACKET);
        assert_ne!(pair[1].1.as_ref(), RECONNECT_PACKET);
    }
}

#[tokio::test]
async fn test_mock_connection_is_a_connection() {
    let device = MockDevice::new(TOKEN);
    let conn: Arc<dyn Connection> = Arc::new(device.connection());
    assert!(!conn.is_connected());
    conn.connect().await.expect("connect");
    assert!(conn.is_connected());
}
