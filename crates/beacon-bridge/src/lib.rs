//! beacon-bridge library crate.
//!
//! This crate bridges the classroom beacon receiver (a USB serial device
//! speaking `ROLE,tableId,colorIndex` lines) to any number of live observers
//! connected over WebSocket.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Beacon receiver (USB serial)
//!         ↕
//! [beacon-bridge]
//!   ├── domain/             Pure types: BridgeConfig, JSON message enums
//!   ├── application/        BroadcastHub, ChangeFeed, CommandLink seam, RequestService
//!   └── infrastructure/
//!         ├── serial/       Port discovery, LinkManager + worker thread
//!         ├── hub_pump      Feed → hub handoff on the tokio runtime
//!         ├── ws_server     WebSocket accept loop (tokio-tungstenite)
//!         └── config_file   Optional TOML configuration
//!         ↕
//! Observers (JSON over WebSocket)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O, no async and no frameworks.
//! - `application` depends on `domain`, `beacon-core` and tokio's `mpsc`.
//! - `infrastructure` depends on all other layers plus `tokio`,
//!   `tokio-tungstenite` and `serialport`.
//!
//! # Two execution contexts (for beginners)
//!
//! Serial ports are read with blocking calls, so the serial link runs on its
//! own OS thread.  The WebSocket side is async and runs on tokio.  The two
//! meet at a bounded channel: the serial thread and observer requests push
//! one event per state change through the `ChangeFeed`, and a tokio task pops
//! them and broadcasts to every observer.

/// Domain layer: pure business-logic types (no I/O).
pub mod domain;

/// Application layer: request handling and fan-out.
pub mod application;

/// Infrastructure layer: serial port, WebSocket server, config file.
pub mod infrastructure;
