//! JSON message types for the observer-facing WebSocket protocol.
//!
//! # Message flow
//!
//! ```text
//! Observer → Bridge: JSON text frame  →  ObserverRequest
//! Bridge → Observer: PushMessage      →  JSON text frame
//! ```
//!
//! # JSON discriminant
//!
//! Every message is a JSON object with a `"type"` field that identifies the
//! variant.  All other fields are flattened into the same object:
//!
//! ```json
//! {"type":"set_table","table":4,"color":"red"}
//! {"type":"table_update","table":{"table":4,"color":"red"},"counts":{...},"range":{...},"redDurations":[...]}
//! ```
//!
//! Two enums, one per direction, make it a compile-time error to send a
//! request-shaped message to an observer.

use serde::{Deserialize, Serialize};

use beacon_core::{Color, TableChange, TableId, TableSnapshot};

// ── Observer → Bridge ─────────────────────────────────────────────────────────

/// Every request an observer can send.
///
/// ```json
/// {"type":"set_table","table":3,"color":"orange"}
/// {"type":"reset"}
/// {"type":"set_range","start":1,"end":30}
/// {"type":"set_port","port":"/dev/ttyACM0"}
/// {"type":"get_snapshot"}
/// {"type":"get_serial_status"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverRequest {
    /// Command one beacon to show `color`.
    SetTable { table: TableId, color: Color },

    /// Command every beacon back to green.
    Reset,

    /// Replace the table set with `start..=end`.
    SetRange { start: TableId, end: TableId },

    /// Pin the serial port.  `null`, a missing field or an empty string
    /// switches back to auto-detection.
    SetPort {
        #[serde(default)]
        port: Option<String>,
    },

    GetSnapshot,

    GetSerialStatus,
}

impl ObserverRequest {
    /// Short name of the variant for log messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ObserverRequest::SetTable { .. } => "set_table",
            ObserverRequest::Reset => "reset",
            ObserverRequest::SetRange { .. } => "set_range",
            ObserverRequest::SetPort { .. } => "set_port",
            ObserverRequest::GetSnapshot => "get_snapshot",
            ObserverRequest::GetSerialStatus => "get_serial_status",
        }
    }
}

// ── Bridge → Observer ─────────────────────────────────────────────────────────

/// A serial port seen during enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    /// OS device name, e.g. `/dev/ttyACM0` or `COM3`.
    pub device: String,
    /// Human-readable description, `"Unknown"` when the OS reports none.
    pub description: String,
}

/// Snapshot of the serial link as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkStatus {
    /// Port pinned by an observer or the configuration, if any.
    pub configured_port: Option<String>,
    /// Port that is open right now.
    #[serde(rename = "connected_port")]
    pub active_port: Option<String>,
    pub available_ports: Vec<PortInfo>,
}

/// Machine-readable reason carried by [`PushMessage::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A command needed the serial link and no device is connected.
    LinkUnavailable,
    /// Writing to the serial link failed.
    Transport,
    /// A range request had `start <= 0` or `end < start`.
    InvalidRange,
    /// A table id was zero or negative.
    InvalidTarget,
    /// The frame was not a valid request.
    InvalidRequest,
}

/// Every message the bridge pushes to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    /// Full state.  Sent on connect and after bulk changes.
    Snapshot(TableSnapshot),

    /// One table changed.
    TableUpdate(TableChange),

    /// The serial link connected, disconnected or changed its port.
    SerialStatus(LinkStatus),

    /// A request from this observer could not be carried out.
    Error { code: ErrorCode, detail: String },
}

impl PushMessage {
    pub fn error(code: ErrorCode, detail: impl Into<String>) -> Self {
        PushMessage::Error {
            code,
            detail: detail.into(),
        }
    }

    /// Short name of the variant for log messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            PushMessage::Snapshot(_) => "snapshot",
            PushMessage::TableUpdate(_) => "table_update",
            PushMessage::SerialStatus(_) => "serial_status",
            PushMessage::Error { .. } => "error",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
