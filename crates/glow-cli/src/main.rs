//! Glow CLI - Command-line interface for Casper Glow lights
//!
//! Scan for lights, send commands, query state and watch raw notifications.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use glow_client::{Glow, StateSnapshot};
use glow_core::{Action, Brightness, DeviceState, DimmingTime};
use glow_transport::{BleConfig, BleScanner, DiscoveredGlow};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod monitor;

use config::{DeviceFilter, FileConfig};

/// Glow - control Casper Glow lights over Bluetooth LE
#[derive(Parser)]
#[command(name = "glow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Scan duration in seconds
    #[arg(long, global = true, env = "GLOW_SCAN_SECS")]
    scan_secs: Option<u64>,

    /// Only use lights whose name matches this glob
    #[arg(long, global = true)]
    name: Option<String>,

    /// Only use lights whose address matches this glob
    #[arg(long, global = true)]
    address: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List nearby lights
    Scan,

    /// Turn the light on
    On {
        /// Brightness percent (60, 70, 80, 90, 100)
        #[arg(short, long, value_parser = parse_brightness)]
        brightness: Option<Brightness>,
    },

    /// Turn the light off
    Off,

    /// Pause the dimming countdown
    Pause,

    /// Resume the dimming countdown
    Resume,

    /// Set brightness, keeping the dimming duration
    Brightness {
        /// Percent (60, 70, 80, 90, 100)
        #[arg(value_parser = parse_brightness)]
        percent: Brightness,
    },

    /// Set the dimming duration at the current brightness
    Dimming {
        /// Minutes (15, 30, 45, 60, 90)
        #[arg(value_parser = parse_dimming)]
        minutes: DimmingTime,

        /// Brightness to send along, if not set earlier in this run
        #[arg(short, long, value_parser = parse_brightness)]
        brightness: Option<Brightness>,
    },

    /// Query and print the light's state
    State {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that the light completes a handshake
    Handshake,

    /// Print every notification until interrupted
    Dump {
        /// Command to send once the light is ready
        #[arg(short, long, value_enum)]
        action: Option<DumpAction>,

        /// Stop after this many seconds
        #[arg(short, long)]
        seconds: Option<u64>,
    },

    /// Send an arbitrary action body (hex, or a named body)
    Raw {
        /// Body bytes in hex, or one of on/off/pause/resume/query,
        /// brightness-1..5, dim-15/30/45/60/90
        body: String,

        /// How long to print notifications after sending
        #[arg(long, default_value = "5")]
        listen_secs: u64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DumpAction {
    On,
    Off,
    Pause,
    Resume,
    Query,
}

impl DumpAction {
    fn action(self) -> Action {
        match self {
            DumpAction::On => Action::TurnOn,
            DumpAction::Off => Action::TurnOff,
            DumpAction::Pause => Action::Pause,
            DumpAction::Resume => Action::Resume,
            DumpAction::Query => Action::QueryState,
        }
    }
}

fn parse_brightness(s: &str) -> std::result::Result<Brightness, String> {
    let percent: u8 = s.parse().map_err(|_| format!("'{}' is not a percentage", s))?;
    Brightness::try_from(percent).map_err(|e| e.to_string())
}

fn parse_dimming(s: &str) -> std::result::Result<DimmingTime, String> {
    let minutes: u32 = s.parse().map_err(|_| format!("'{}' is not a number of minutes", s))?;
    DimmingTime::try_from(minutes).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli.log_level, cli.json_logs)?;

    let mut file = FileConfig::load(cli.config.as_deref())?;
    if let Some(seconds) = cli.scan_secs {
        file.scan.seconds = seconds;
    }
    if cli.name.is_some() {
        file.filter.name = cli.name.clone();
    }
    if cli.address.is_some() {
        file.filter.address = cli.address.clone();
    }

    let ble = BleConfig {
        scan_duration_secs: file.scan.seconds,
        ..Default::default()
    };

    match cli.command {
        Commands::Scan => {
            scan(&ble, &file.filter).await?;
        }

        Commands::On { brightness } => {
            let glow = open_client(&ble, &file).await?;
            glow.turn_on(brightness).await?;
            report("on", &glow.state());
        }

        Commands::Off => {
            let glow = open_client(&ble, &file).await?;
            glow.turn_off().await?;
            report("off", &glow.state());
        }

        Commands::Pause => {
            let glow = open_client(&ble, &file).await?;
            glow.pause().await?;
            report("paused", &glow.state());
        }

        Commands::Resume => {
            let glow = open_client(&ble, &file).await?;
            glow.resume().await?;
            report("resumed", &glow.state());
        }

        Commands::Brightness { percent } => {
            let glow = open_client(&ble, &file).await?;
            set_brightness_keeping_dimming(&glow, percent).await?;
            report(&format!("brightness {}", percent), &glow.state());
        }

        Commands::Dimming {
            minutes,
            brightness,
        } => {
            let glow = open_client(&ble, &file).await?;
            if let Some(brightness) = brightness {
                glow.set_brightness(brightness).await?;
            }
            glow.set_dimming_time(minutes)
                .await
                .context("Pass --brightness to set the dimming time in a fresh run")?;
            report(&format!("dimming {}", minutes), &glow.state());
        }

        Commands::State { json } => {
            let glow = open_client(&ble, &file).await?;
            let snapshot = glow.query_state().await?;
            print_snapshot(&snapshot, json)?;
        }

        Commands::Handshake => {
            let glow = open_client(&ble, &file).await?;
            glow.handshake().await?;
            println!("{} Handshake {}", "GLOW".yellow().bold(), "ok".green());
        }

        Commands::Dump { action, seconds } => {
            let light = find_light(&ble, &file.filter).await?;
            let connection = light.connector(ble.clone()).connection();
            monitor::run(
                &connection,
                action.map(|a| a.action().body()),
                seconds.map(Duration::from_secs),
            )
            .await?;
        }

        Commands::Raw { body, listen_secs } => {
            let body = monitor::parse_body(&body)?;
            let light = find_light(&ble, &file.filter).await?;
            let connection = light.connector(ble.clone()).connection();
            monitor::run(
                &connection,
                Some(body),
                Some(Duration::from_secs(listen_secs)),
            )
            .await?;
        }
    }

    Ok(())
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}

async fn discover(ble: &BleConfig, filter: &DeviceFilter) -> Result<Vec<DiscoveredGlow>> {
    let scanner = BleScanner::with_config(ble.clone())
        .await
        .context("Bluetooth unavailable")?;

    let mut lights: Vec<_> = scanner
        .scan()
        .await?
        .into_iter()
        .filter(|light| filter.matches(light.name.as_deref(), &light.address))
        .collect();

    // Strongest signal first
    lights.sort_by_key(|light| std::cmp::Reverse(light.rssi.unwrap_or(i16::MIN)));
    Ok(lights)
}

async fn scan(ble: &BleConfig, filter: &DeviceFilter) -> Result<()> {
    println!(
        "{} Scanning for {} seconds",
        "GLOW".yellow().bold(),
        ble.scan_duration_secs
    );

    let lights = discover(ble, filter).await?;
    if lights.is_empty() {
        println!("No lights found");
        return Ok(());
    }

    for light in &lights {
        println!(
            "  {}  {}  {}",
            light.address.cyan(),
            light.name.as_deref().unwrap_or("<unnamed>"),
            light
                .rssi
                .map(|rssi| format!("{} dBm", rssi))
                .unwrap_or_default()
                .dimmed()
        );
    }
    Ok(())
}

async fn find_light(ble: &BleConfig, filter: &DeviceFilter) -> Result<DiscoveredGlow> {
    let Some(light) = discover(ble, filter).await?.into_iter().next() else {
        bail!(
            "No matching light found within {} seconds",
            ble.scan_duration_secs
        );
    };

    info!(
        "Using {} ({})",
        light.name.as_deref().unwrap_or("<unnamed>"),
        light.address
    );
    Ok(light)
}

async fn open_client(ble: &BleConfig, file: &FileConfig) -> Result<Glow> {
    let light = find_light(ble, &file.filter).await?;
    let glow = Glow::builder()
        .connector(light.connector(ble.clone()))
        .config(file.session.clone())
        .build()?;
    Ok(glow)
}

/// Read the configured dimming duration first so it is sent back unchanged
async fn set_brightness_keeping_dimming(glow: &Glow, brightness: Brightness) -> Result<()> {
    if !glow.query_state().await?.is_fresh() {
        warn!("Light did not report its state; using the default dimming time");
    }
    glow.set_brightness(brightness).await?;
    Ok(())
}

fn report(what: &str, state: &DeviceState) {
    println!("{} {} ({})", "GLOW".yellow().bold(), what.green(), state);
}

fn print_snapshot(snapshot: &StateSnapshot, json: bool) -> Result<()> {
    let state = snapshot.state();

    if json {
        let out = serde_json::json!({
            "fresh": snapshot.is_fresh(),
            "state": state,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let power = match state.is_on {
        Some(true) => "on".green(),
        Some(false) => "off".red(),
        None => "unknown".dimmed(),
    };
    println!("{} {}", "GLOW".yellow().bold(), power);
    if !snapshot.is_fresh() {
        println!("  {}", "no response from the light; showing last known state".yellow());
    }

    let fmt_opt = |v: Option<String>| v.unwrap_or_else(|| "?".into());
    println!("  remaining:  {} min", fmt_opt(state.remaining_minutes.map(|m| m.to_string())));
    println!("  configured: {} min", fmt_opt(state.configured_minutes.map(|m| m.to_string())));
    println!("  paused:     {}", fmt_opt(state.is_paused.map(|p| p.to_string())));
    println!("  battery:    {}", fmt_opt(state.battery.map(|b| b.to_string())));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glow_core::FieldMap;
    use glow_test_utils::{MockDevice, StateReport};

    const TOKEN: u64 = 9;

    fn dimming_ms(packet: &[u8]) -> Option<u64> {
        let outer = FieldMap::parse(packet);
        let body = FieldMap::parse(outer.last_bytes(4)?);
        FieldMap::parse(body.last_bytes(18)?).last_varint(3)
    }

    #[tokio::test]
    async fn test_brightness_keeps_device_dimming_time() {
        // 20 minutes left of a 45 minute sequence
        let device = MockDevice::new(TOKEN)
            .with_state_reply(StateReport::on(1_200_000, 2_700_000).encode(TOKEN));
        let glow = Glow::builder()
            .connector(device.connector())
            .build()
            .unwrap();

        set_brightness_keeping_dimming(&glow, Brightness::Pct70)
            .await
            .unwrap();

        let commands = device.command_writes();
        assert_eq!(commands.len(), 2);
        assert_eq!(dimming_ms(&commands[1]), Some(2_700_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_brightness_without_state_reply_uses_default() {
        let device = MockDevice::new(TOKEN);
        let glow = Glow::builder()
            .connector(device.connector())
            .build()
            .unwrap();

        set_brightness_keeping_dimming(&glow, Brightness::Pct70)
            .await
            .unwrap();

        let commands = device.command_writes();
        assert_eq!(dimming_ms(&commands[1]), Some(900_000));
    }
}
