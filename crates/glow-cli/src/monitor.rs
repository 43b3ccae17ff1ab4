//! Raw session monitor
//!
//! Drives the handshake by hand and prints every notification with its
//! decoded fields. Used by the `dump` and `raw` subcommands.

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use colored::Colorize;
use glow_core::action::unverified;
use glow_core::{
    build_action_packet, Action, ActionBody, FieldMap, FieldValue, Notification, Readiness,
    READ_CHAR_UUID, RECONNECT_PACKET, WRITE_CHAR_UUID,
};
use glow_transport::{Connection, TransportEvent};
use std::time::Duration;
use tracing::{info, warn};

/// Parse a hex string; whitespace, `:` separators and a `0x` prefix are allowed
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let digits: String = text
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();

    hex::decode(&digits).with_context(|| format!("Invalid hex string '{}'", text))
}

/// Resolve a `raw` argument: an action name, an unverified body name, or hex
pub fn parse_body(text: &str) -> Result<ActionBody> {
    let action = match text {
        "on" => Some(Action::TurnOn),
        "off" => Some(Action::TurnOff),
        "pause" => Some(Action::Pause),
        "resume" => Some(Action::Resume),
        "query" => Some(Action::QueryState),
        _ => None,
    };
    if let Some(action) = action {
        return Ok(action.body());
    }

    if let Some(body) = unverified::lookup(text) {
        warn!("'{}' is an unverified body and may not work", text);
        return Ok(ActionBody::from_static(body));
    }

    let bytes = parse_hex(text)?;
    if bytes.is_empty() {
        bail!("Empty action body");
    }
    Ok(ActionBody::from(bytes))
}

fn describe_fields(fields: &FieldMap) -> String {
    fields
        .iter()
        .flat_map(|(field, values)| {
            values.iter().map(move |value| match value {
                FieldValue::Varint(v) => format!("{}={}", field, v),
                FieldValue::Bytes(b) => format!("{}=[{}]", field, hex::encode(b)),
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_notification(payload: &[u8], notification: &Notification) {
    println!("{} {}", "<-".blue().bold(), hex::encode(payload));
    println!("   fields: {}", describe_fields(&FieldMap::parse(payload)));

    if let Some(delta) = &notification.state {
        println!(
            "   {} on={:?} remaining={:?}min configured={:?}min paused={:?} battery={}",
            "state".green(),
            delta.is_on,
            delta.remaining_minutes,
            delta.configured_minutes,
            delta.is_paused,
            delta
                .battery
                .map(|b| b.to_string())
                .unwrap_or_else(|| "?".into()),
        );
    }

    match notification.ready {
        Readiness::Token(token) => println!("   {} token={}", "ready".cyan(), token),
        Readiness::MarkerWithoutToken => println!("   {}", "ready marker without token".red()),
        Readiness::NotReady => {}
    }
}

/// Handshake on `conn`, send `body` once ready, print notifications
///
/// Runs for `listen` (or until Ctrl+C when `None`) and disconnects afterwards.
pub async fn run(
    conn: &dyn Connection,
    body: Option<ActionBody>,
    listen: Option<Duration>,
) -> Result<()> {
    if !conn.is_connected() {
        conn.connect().await.context("Failed to connect")?;
    }

    let result = monitor(conn, body, listen).await;

    if let Err(e) = conn.disconnect().await {
        warn!("Error while disconnecting: {}", e);
    }
    result
}

async fn monitor(
    conn: &dyn Connection,
    body: Option<ActionBody>,
    listen: Option<Duration>,
) -> Result<()> {
    let mut notifications = conn
        .subscribe(READ_CHAR_UUID)
        .await
        .context("Failed to subscribe to notifications")?;

    conn.write(WRITE_CHAR_UUID, Bytes::from_static(RECONNECT_PACKET))
        .await
        .context("Failed to send reconnect packet")?;
    println!("{} {}", "->".magenta().bold(), hex::encode(RECONNECT_PACKET));

    let mut pending = body;
    let limit = async {
        match listen {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(limit);

    loop {
        let event = tokio::select! {
            event = notifications.recv() => event,
            _ = &mut limit => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        };

        match event {
            Some(TransportEvent::Data(payload)) => {
                let notification = Notification::inspect(&payload);
                print_notification(&payload, &notification);

                if let Readiness::Token(token) = notification.ready {
                    if let Some(body) = pending.take() {
                        let packet = build_action_packet(token, &body);
                        println!("{} {}", "->".magenta().bold(), hex::encode(&packet));
                        conn.write(WRITE_CHAR_UUID, packet)
                            .await
                            .context("Failed to send command")?;
                    }
                }
            }
            Some(TransportEvent::Error(e)) => warn!("Transport error: {}", e),
            Some(TransportEvent::Disconnected { reason }) => {
                println!("{} {}", "disconnected".red(), reason.unwrap_or_default());
                break;
            }
            None => break,
        }
    }

    if pending.is_some() {
        warn!("Device never became ready; command not sent");
    }
    Ok(())
}
