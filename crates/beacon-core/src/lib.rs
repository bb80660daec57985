//! # beacon-core
//!
//! Shared library for the classroom beacon bridge containing the serial line
//! protocol codec and the authoritative table state model.
//!
//! It has zero dependencies on OS APIs, serial drivers, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! Every classroom table carries a small battery-powered beacon that shows
//! one of three colors: green ("all good"), orange ("question soon") or red
//! ("need help now").  Beacons talk over radio to a receiver plugged into the
//! teacher's computer, which forwards every radio packet as one text line on
//! a USB serial port.
//!
//! This crate (`beacon-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – How lines travel over the serial link.  Each line is
//!   `ROLE,tableId,colorIndex` and is decoded into a typed [`Frame`].
//!
//! - **`domain`** – Pure business logic with no OS dependencies.  The most
//!   important piece is the [`TableStore`]: the thread-safe map of table id to
//!   color plus the "how long has this table been red" bookkeeping.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `beacon_core::TableStore` instead of `beacon_core::domain::table_store::TableStore`.
pub use domain::clock::{Clock, ManualClock, SystemClock};
pub use domain::color::{Color, ColorCounts};
pub use domain::table_store::{
    RedDuration, StoreError, TableChange, TableColor, TableId, TableRange, TableSnapshot,
    TableStore, DEFAULT_RED_LIMIT,
};
pub use protocol::codec::{encode_command, parse_line, ProtocolError};
pub use protocol::frame::{Frame, Role, Target, BROADCAST_TARGET};
