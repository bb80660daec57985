//! Beacon colors and their wire indices.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The three states a classroom beacon can show.
///
/// On the serial wire a color travels as its index (`0`, `1`, `2`); in the
/// observer-facing JSON it travels as its lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    /// Everything is fine (index 0).  New tables start green.
    #[default]
    Green,
    /// The table would like attention soon (index 1).
    Orange,
    /// The table needs help now (index 2).
    Red,
}

impl Color {
    /// All colors in wire-index order.
    pub const ALL: [Color; 3] = [Color::Green, Color::Orange, Color::Red];

    /// Returns the wire index used in `ROLE,tableId,colorIndex` lines.
    pub fn index(self) -> u8 {
        match self {
            Color::Green => 0,
            Color::Orange => 1,
            Color::Red => 2,
        }
    }

    /// Maps a wire index back to a color.
    ///
    /// Returns `None` for anything outside `{0, 1, 2}`.
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(Color::Green),
            1 => Some(Color::Orange),
            2 => Some(Color::Red),
            _ => None,
        }
    }

    /// Returns the lowercase name used in JSON and log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Color::Green => "green",
            Color::Orange => "orange",
            Color::Red => "red",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of tables currently showing each color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColorCounts {
    pub green: usize,
    pub orange: usize,
    pub red: usize,
}

impl ColorCounts {
    /// Tallies an iterator of colors.
    pub fn tally<I: IntoIterator<Item = Color>>(colors: I) -> Self {
        colors.into_iter().fold(Self::default(), |mut counts, color| {
            match color {
                Color::Green => counts.green += 1,
                Color::Orange => counts.orange += 1,
                Color::Red => counts.red += 1,
            }
            counts
        })
    }

    /// Total number of tables counted.
    pub fn total(&self) -> usize {
        self.green + self.orange + self.red
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
