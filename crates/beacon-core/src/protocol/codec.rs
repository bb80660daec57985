//! Text codec for `ROLE,tableId,colorIndex` lines.
//!
//! Decoding is strict: anything that is not exactly three fields with a known
//! role, a valid id and a color index in `{0, 1, 2}` is rejected with a
//! [`ProtocolError`].  The caller drops rejected lines; they never change
//! state.
//!
//! `RT` lines are recognised from the role alone and decoded as
//! [`Frame::Echo`] without looking at the remaining fields.

use thiserror::Error;

use crate::domain::color::Color;
use crate::domain::table_store::TableId;
use crate::protocol::frame::{Frame, Role, Target};

/// Why a line could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line did not split into exactly three comma-separated fields.
    #[error("expected 3 fields, got {0}")]
    FieldCount(usize),

    /// The role field is not one of `T`, `RT`, `S`, `RS`.
    #[error("unknown role: {0:?}")]
    UnknownRole(String),

    /// A numeric field did not parse as an integer.
    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    /// The color index is outside `{0, 1, 2}`.
    #[error("unknown color index: {0}")]
    UnknownColorIndex(i64),

    /// The table id is zero or negative (other than `-1` on a `T` line).
    #[error("invalid table id {0} for this role")]
    InvalidTarget(TableId),
}

/// Decodes one protocol line.
///
/// Surrounding whitespace (including the trailing `\r\n`) is trimmed first,
/// and so is whitespace around each field.
///
/// # Errors
///
/// Returns [`ProtocolError`] when the line is malformed.
///
/// Table ids are positive integers.  `-1` is accepted only as the broadcast
/// target of a `T` line; any other id below 1 is
/// [`ProtocolError::InvalidTarget`].  Ids outside the configured range still
/// decode, and the store adopts them.
///
/// # Examples
///
/// ```rust
/// use beacon_core::{parse_line, Color, Frame};
///
/// let frame = parse_line("S,7,2\r\n").unwrap();
/// assert_eq!(frame, Frame::Status { table: 7, color: Color::Red, relayed: false });
/// ```
pub fn parse_line(line: &str) -> Result<Frame, ProtocolError> {
    let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
    if fields.len() != 3 {
        return Err(ProtocolError::FieldCount(fields.len()));
    }

    let role = Role::from_tag(fields[0])
        .ok_or_else(|| ProtocolError::UnknownRole(fields[0].to_string()))?;
    if role == Role::TeacherEcho {
        return Ok(Frame::Echo);
    }

    let id: TableId = parse_number("table id", fields[1])?;
    let index: i64 = parse_number("color index", fields[2])?;
    let color = Color::from_index(index).ok_or(ProtocolError::UnknownColorIndex(index))?;

    match role {
        Role::Teacher => {
            let target = Target::from_wire(id).ok_or(ProtocolError::InvalidTarget(id))?;
            Ok(Frame::Command { target, color })
        }
        Role::Status | Role::StatusEcho => {
            if id <= 0 {
                return Err(ProtocolError::InvalidTarget(id));
            }
            Ok(Frame::Status {
                table: id,
                color,
                relayed: role == Role::StatusEcho,
            })
        }
        Role::TeacherEcho => Ok(Frame::Echo),
    }
}

/// Encodes an outbound command line, newline included.
///
/// ```rust
/// use beacon_core::{encode_command, Color, Target};
///
/// assert_eq!(encode_command(Target::Table(4), Color::Orange), "T,4,1\n");
/// assert_eq!(encode_command(Target::All, Color::Green), "T,-1,0\n");
/// ```
pub fn encode_command(target: Target, color: Color) -> String {
    format!("{},{},{}\n", Role::Teacher, target.wire_id(), color.index())
}

fn parse_number<T: std::str::FromStr>(
    field: &'static str,
    value: &str,
) -> Result<T, ProtocolError> {
    value.parse().map_err(|_| ProtocolError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
