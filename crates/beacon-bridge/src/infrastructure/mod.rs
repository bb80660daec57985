//! Infrastructure layer for beacon-bridge.
//!
//! Everything that touches the outside world lives here: the serial port,
//! the WebSocket listener, the handoff between the serial worker thread and
//! the tokio runtime, and the configuration file.
//!
//! # What does NOT belong here?
//!
//! - Request semantics (that is the application layer)
//! - Message type definitions (that is the domain layer)
//! - CLI parsing (that is done in `main.rs`)

pub mod config_file;
pub mod hub_pump;
pub mod serial;
pub mod ws_server;

pub use hub_pump::spawn_hub_pump;
pub use ws_server::{run_server, SessionContext};
