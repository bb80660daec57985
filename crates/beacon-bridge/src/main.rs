//! Classroom beacon bridge: entry point.
//!
//! This binary owns the USB serial link to the beacon receiver, keeps the
//! authoritative table state, and pushes every change to observers connected
//! over WebSocket.
//!
//! # Usage
//!
//! ```text
//! beacon-bridge [OPTIONS]
//!
//! Options:
//!   --ws-bind       <IP>     WebSocket bind address        [default: 0.0.0.0]
//!   --ws-port       <PORT>   WebSocket port                [default: 8000]
//!   --serial-port   <PORT>   Serial port                   [default: auto-detect]
//!   --baud-rate     <BAUD>   Serial baud rate              [default: 115200]
//!   --table-range   <A-B>    Table ids                     [default: 1-50]
//!   --retry-seconds <SECS>   Pause between connect tries   [default: 3]
//!   --config        <FILE>   Optional TOML config file
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable        | Flag              |
//! |-----------------|-------------------|
//! | `API_HOST`      | `--ws-bind`       |
//! | `API_PORT`      | `--ws-port`       |
//! | `SERIAL_PORT`   | `--serial-port`   |
//! | `BAUD_RATE`     | `--baud-rate`     |
//! | `TABLE_RANGE`   | `--table-range`   |
//! | `RETRY_SECONDS` | `--retry-seconds` |
//! | `BEACON_CONFIG` | `--config`        |
//!
//! Precedence: CLI flag, then environment variable, then config file, then
//! built-in default.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use beacon_bridge::application::{BroadcastHub, ChangeFeed, RequestService, EVENT_QUEUE_CAPACITY};
use beacon_bridge::domain::{normalize_port, parse_table_range, BridgeConfig};
use beacon_bridge::infrastructure::config_file::FileConfig;
use beacon_bridge::infrastructure::serial::link_manager::{LinkManager, LinkSettings, LinkWorker};
use beacon_bridge::infrastructure::serial::native::NativeSerialBackend;
use beacon_bridge::infrastructure::{run_server, spawn_hub_pump, SessionContext};
use beacon_core::TableStore;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Classroom beacon bridge.
///
/// Every option is optional so that values missing on the command line can
/// fall through to the config file before the built-in defaults apply.
#[derive(Debug, Default, Parser)]
#[command(
    name = "beacon-bridge",
    about = "Serial-to-WebSocket bridge for classroom help beacons",
    version
)]
struct Cli {
    /// IP address the WebSocket server binds to.
    #[arg(long, env = "API_HOST")]
    ws_bind: Option<String>,

    /// TCP port the WebSocket server listens on.
    #[arg(long, env = "API_PORT")]
    ws_port: Option<u16>,

    /// Serial port of the beacon receiver.  Omit to auto-detect.
    #[arg(long, env = "SERIAL_PORT")]
    serial_port: Option<String>,

    /// Serial baud rate of the beacon receiver.
    #[arg(long, env = "BAUD_RATE")]
    baud_rate: Option<u32>,

    /// Table ids as `start-end`.  Invalid values fall back to `1-50`.
    #[arg(long, env = "TABLE_RANGE")]
    table_range: Option<String>,

    /// Seconds between connection attempts while no receiver is found.
    #[arg(long, env = "RETRY_SECONDS")]
    retry_seconds: Option<u64>,

    /// Path to a TOML config file.
    #[arg(long, env = "BEACON_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Reads the config file named by `--config`, or an empty one.
    fn load_file(&self) -> anyhow::Result<FileConfig> {
        match &self.config {
            Some(path) => FileConfig::load(path)
                .with_context(|| format!("failed to load config file {}", path.display())),
            None => Ok(FileConfig::default()),
        }
    }

    /// Merges CLI/env values over `file` over the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the bind host is not a valid IP address.
    fn into_bridge_config(self, file: FileConfig) -> anyhow::Result<BridgeConfig> {
        let defaults = BridgeConfig::default();

        let ws_bind_addr = {
            let host = self.ws_bind.or(file.server.host);
            let ip: IpAddr = match host {
                Some(host) => host
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid WebSocket bind address: '{host}'"))?,
                None => defaults.ws_bind_addr.ip(),
            };
            let port = self
                .ws_port
                .or(file.server.port)
                .unwrap_or(defaults.ws_bind_addr.port());
            SocketAddr::new(ip, port)
        };

        let table_range = match self.table_range.or(file.tables.range) {
            Some(text) => parse_table_range(&text).unwrap_or_else(|| {
                warn!(
                    "invalid table range {text:?}; falling back to {}-{}",
                    defaults.table_range.start(),
                    defaults.table_range.end()
                );
                defaults.table_range
            }),
            None => defaults.table_range,
        };

        Ok(BridgeConfig {
            ws_bind_addr,
            serial_port: normalize_port(self.serial_port.or(file.serial.port).as_deref()),
            baud_rate: self
                .baud_rate
                .or(file.serial.baud_rate)
                .unwrap_or(defaults.baud_rate),
            table_range,
            retry_interval: self
                .retry_seconds
                .or(file.serial.retry_seconds)
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_interval),
            read_timeout: file
                .serial
                .read_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.read_timeout),
            device_tokens: file
                .serial
                .device_tokens
                .unwrap_or(defaults.device_tokens),
        })
    }
}

/// `RUST_LOG` wins; otherwise the config file's `log_level`, then `info`.
fn init_tracing(file_level: Option<&str>) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(file_level.unwrap_or("info"))),
        )
        .init();
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments and the optional config file are read.
/// 2. `tracing_subscriber` is initialised.
/// 3. A Ctrl+C handler clears the shared `running` flag.
/// 4. The serial worker thread and the hub pump task are started.
/// 5. [`run_server`] accepts observers until the flag is cleared.
/// 6. The worker thread is joined and the pump drains.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file = cli.load_file()?;
    init_tracing(file.log_level.as_deref());
    let config = cli.into_bridge_config(file)?;

    info!(
        "classroom beacon bridge starting: ws={}, serial={}, tables={}-{}",
        config.ws_bind_addr,
        config.serial_port.as_deref().unwrap_or("auto-detect"),
        config.table_range.start(),
        config.table_range.end()
    );

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Wiring ────────────────────────────────────────────────────────────────
    let store = Arc::new(TableStore::new(config.table_range));
    let hub = Arc::new(BroadcastHub::new());
    let manager = Arc::new(LinkManager::new(
        Arc::new(NativeSerialBackend),
        LinkSettings::from(&config),
        config.serial_port.clone(),
    ));

    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let feed = Arc::new(ChangeFeed::new(store, events_tx));
    let worker = LinkWorker::new(
        Arc::clone(&manager),
        Arc::clone(&feed),
        Arc::clone(&running),
    );
    let worker_handle = worker
        .spawn()
        .context("failed to spawn serial worker thread")?;
    let pump = spawn_hub_pump(events_rx, Arc::clone(&hub));

    let service = Arc::new(RequestService::new(feed, manager));
    let context = SessionContext { hub, service };

    // ── Main server loop ──────────────────────────────────────────────────────
    let served = run_server(config.ws_bind_addr, context, Arc::clone(&running)).await;

    // Also stops the worker when the server failed to start.
    running.store(false, Ordering::Relaxed);
    match tokio::task::spawn_blocking(move || worker_handle.join()).await {
        Ok(Ok(())) => {}
        _ => error!("serial worker thread panicked"),
    }
    // Lingering sessions may still hold the feed, so the queue never closes.
    pump.abort();

    served?;
    info!("classroom beacon bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
