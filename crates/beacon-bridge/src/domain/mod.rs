//! Domain layer for beacon-bridge.
//!
//! Pure types with no I/O: the runtime configuration and the JSON messages
//! exchanged with observers.
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, serial port or `WebSocket` types
//! - File I/O or environment variable reading
//! - Anything that could block or fail due to external state

pub mod config;
pub mod messages;

pub use config::{normalize_port, parse_table_range, BridgeConfig};
pub use messages::{ErrorCode, LinkStatus, ObserverRequest, PortInfo, PushMessage};
