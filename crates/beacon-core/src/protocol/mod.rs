//! The serial line protocol spoken by classroom beacons.
//!
//! Every packet is one newline-terminated text line of three comma-separated
//! fields:
//!
//! ```text
//! <ROLE>,<tableId>,<colorIndex>
//! ```
//!
//! [`frame`] holds the typed form of a line and [`codec`] converts between
//! text and [`Frame`]s.

pub mod codec;
pub mod frame;

pub use codec::{encode_command, parse_line, ProtocolError};
pub use frame::{Frame, Role, Target, BROADCAST_TARGET};
