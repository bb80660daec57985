//! Typed form of a decoded protocol line.

use std::fmt;

use crate::domain::color::Color;
use crate::domain::table_store::TableId;

/// Wire id that addresses every device at once in a `T` line.
pub const BROADCAST_TARGET: TableId = -1;

/// The first field of a protocol line: who sent it and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// `T`: a command addressed to one or all devices.
    Teacher,
    /// `RT`: a repeater retransmitting a command.  Never applied.
    TeacherEcho,
    /// `S`: a device reporting its own color.
    Status,
    /// `RS`: a repeater retransmitting a device status.
    StatusEcho,
}

impl Role {
    /// Parses the role tag.  Tags are case-sensitive.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "T" => Some(Role::Teacher),
            "RT" => Some(Role::TeacherEcho),
            "S" => Some(Role::Status),
            "RS" => Some(Role::StatusEcho),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Role::Teacher => "T",
            Role::TeacherEcho => "RT",
            Role::Status => "S",
            Role::StatusEcho => "RS",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Who a `T` command is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Every device (`tableId = -1` on the wire).
    All,
    /// One table.  Always a positive id.
    Table(TableId),
}

impl Target {
    /// Maps a wire id to a target.
    ///
    /// Returns `None` for `0` and for negative ids other than `-1`.
    pub fn from_wire(id: TableId) -> Option<Self> {
        match id {
            BROADCAST_TARGET => Some(Target::All),
            id if id > 0 => Some(Target::Table(id)),
            _ => None,
        }
    }

    /// The id written on the wire.
    pub fn wire_id(self) -> TableId {
        match self {
            Target::All => BROADCAST_TARGET,
            Target::Table(id) => id,
        }
    }
}

/// One decoded protocol line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// A `T` line: set `target` to `color`.
    Command { target: Target, color: Color },
    /// An `S` or `RS` line: device `table` is now showing `color`.
    Status {
        table: TableId,
        color: Color,
        relayed: bool,
    },
    /// An `RT` line.  Its payload is not inspected.
    Echo,
}
