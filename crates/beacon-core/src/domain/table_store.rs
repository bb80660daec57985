//! The authoritative, thread-safe table state store.
//!
//! [`TableStore`] holds one entry per classroom table: its current [`Color`]
//! and, while the table is red, the instant it turned red.  Every public
//! method takes the store's single lock for a short critical section and
//! returns a ready-to-broadcast payload ([`TableSnapshot`] or
//! [`TableChange`]), so callers never have to lock twice to build a message.
//!
//! # Red-duration bookkeeping
//!
//! ```text
//! green ──► red          red_since = now
//! red   ──► red          red_since unchanged  (first entry wins)
//! red   ──► green/orange red_since = None
//! ```
//!
//! Invariant: `red_since.is_some()` exactly when `color == Red`.
//!
//! # Unknown ids
//!
//! The store never rejects a table id.  An update for an id outside the
//! configured range creates the entry on the fly (green, not red), then
//! applies the update.  Only [`TableStore::reconfigure_range`] removes
//! entries.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::domain::clock::{Clock, SystemClock};
use crate::domain::color::{Color, ColorCounts};

/// Identifier of a classroom table (the beacon's configured device id).
pub type TableId = i32;

/// How many entries the "longest on red" list carries in every payload.
pub const DEFAULT_RED_LIMIT: usize = 10;

/// Errors reported by [`TableStore`] operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The requested range is empty or starts at a non-positive id.
    #[error("invalid table range {start}-{end}: start must be positive and end must not be below start")]
    InvalidRange { start: TableId, end: TableId },
}

// ── Payload types ─────────────────────────────────────────────────────────────

/// An inclusive, validated range of table ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableRange {
    start: TableId,
    end: TableId,
}

impl TableRange {
    /// Validates and builds a range.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRange`] when `start <= 0` or `end < start`.
    pub fn new(start: TableId, end: TableId) -> Result<Self, StoreError> {
        if start <= 0 || end < start {
            return Err(StoreError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// First table id (inclusive).
    pub fn start(&self) -> TableId {
        self.start
    }

    /// Last table id (inclusive).
    pub fn end(&self) -> TableId {
        self.end
    }

    /// Number of tables in the range.
    pub fn len(&self) -> usize {
        // `end >= start > 0`, so the difference is non-negative and fits.
        (i64::from(self.end) - i64::from(self.start) + 1) as usize
    }

    /// Always `false`: a valid range holds at least one table.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns `true` if `table` lies inside the range.
    pub fn contains(&self, table: TableId) -> bool {
        (self.start..=self.end).contains(&table)
    }

    /// Iterates every id in the range.
    pub fn ids(&self) -> RangeInclusive<TableId> {
        self.start..=self.end
    }
}

impl Default for TableRange {
    /// Tables 1 through 50.
    fn default() -> Self {
        Self { start: 1, end: 50 }
    }
}

/// One table and its color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableColor {
    pub table: TableId,
    pub color: Color,
}

/// How long one table has been red, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RedDuration {
    pub table: TableId,
    pub seconds: u64,
}

/// The full state of every table, sent on connect and after bulk changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    /// Every known table, sorted by id.
    pub tables: Vec<TableColor>,
    pub counts: ColorCounts,
    pub range: TableRange,
    /// Longest-red tables first, at most [`DEFAULT_RED_LIMIT`] entries.
    pub red_durations: Vec<RedDuration>,
}

/// A single-table change plus the refreshed aggregates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableChange {
    /// The table that changed and its new color.
    pub table: TableColor,
    pub counts: ColorCounts,
    pub range: TableRange,
    pub red_durations: Vec<RedDuration>,
}

// ── Store internals ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
struct TableEntry {
    color: Color,
    red_since: Option<Instant>,
}

impl TableEntry {
    /// Applies a new color, keeping `red_since` consistent with it.
    fn apply(&mut self, color: Color, now: Instant) {
        if color == Color::Red {
            // Entering red starts the timer; staying red keeps the first entry.
            if self.red_since.is_none() {
                self.red_since = Some(now);
            }
        } else {
            self.red_since = None;
        }
        self.color = color;
    }
}

#[derive(Debug)]
struct Tables {
    range: TableRange,
    entries: BTreeMap<TableId, TableEntry>,
}

impl Tables {
    fn fresh(range: TableRange) -> Self {
        Self {
            range,
            entries: range.ids().map(|id| (id, TableEntry::default())).collect(),
        }
    }

    fn counts(&self) -> ColorCounts {
        ColorCounts::tally(self.entries.values().map(|entry| entry.color))
    }

    fn red_durations(&self, now: Instant, limit: usize) -> Vec<RedDuration> {
        let mut durations: Vec<RedDuration> = self
            .entries
            .iter()
            .filter_map(|(&table, entry)| {
                entry.red_since.map(|since| RedDuration {
                    table,
                    seconds: now.saturating_duration_since(since).as_secs(),
                })
            })
            .collect();
        durations.sort_by(|a, b| b.seconds.cmp(&a.seconds).then(a.table.cmp(&b.table)));
        durations.truncate(limit);
        durations
    }

    fn snapshot(&self, now: Instant) -> TableSnapshot {
        TableSnapshot {
            tables: self
                .entries
                .iter()
                .map(|(&table, entry)| TableColor {
                    table,
                    color: entry.color,
                })
                .collect(),
            counts: self.counts(),
            range: self.range,
            red_durations: self.red_durations(now, DEFAULT_RED_LIMIT),
        }
    }
}

// ── TableStore ────────────────────────────────────────────────────────────────

/// Thread-safe map of table id → color and red-since timestamp.
///
/// Share it between components as an `Arc<TableStore>`; all methods take
/// `&self`.
///
/// # Example
///
/// ```rust
/// use beacon_core::{Color, TableRange, TableStore};
///
/// let store = TableStore::new(TableRange::new(1, 5).unwrap());
/// let change = store.update(3, Color::Orange);
/// assert_eq!(change.counts.green, 4);
/// assert_eq!(change.counts.orange, 1);
/// ```
pub struct TableStore {
    state: Mutex<Tables>,
    clock: Arc<dyn Clock>,
}

impl TableStore {
    /// Creates a store with every table in `range` green, using the system clock.
    pub fn new(range: TableRange) -> Self {
        Self::with_clock(range, Arc::new(SystemClock))
    }

    /// Creates a store that reads time from `clock`.
    pub fn with_clock(range: TableRange, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(Tables::fresh(range)),
            clock,
        }
    }

    /// Returns the full current state.  Pure read.
    pub fn snapshot(&self) -> TableSnapshot {
        let now = self.clock.now();
        self.lock().snapshot(now)
    }

    /// Sets one table's color and returns the change payload.
    ///
    /// Unknown ids are adopted.  Re-applying red to a red table does not
    /// reset its red timer.
    pub fn update(&self, table: TableId, color: Color) -> TableChange {
        let now = self.clock.now();
        let mut tables = self.lock();
        tables.entries.entry(table).or_default().apply(color, now);
        debug!("table {table} -> {color}");
        TableChange {
            table: TableColor { table, color },
            counts: tables.counts(),
            range: tables.range,
            red_durations: tables.red_durations(now, DEFAULT_RED_LIMIT),
        }
    }

    /// Sets every known table to `color` and returns the new snapshot.
    pub fn fill(&self, color: Color) -> TableSnapshot {
        let now = self.clock.now();
        let mut tables = self.lock();
        for entry in tables.entries.values_mut() {
            entry.apply(color, now);
        }
        tables.snapshot(now)
    }

    /// Turns every known table green and clears every red timer.
    pub fn reset_all(&self) -> TableSnapshot {
        self.fill(Color::Green)
    }

    /// Replaces the whole table set with `start..=end`, all green.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRange`] (and leaves the store untouched)
    /// when `start <= 0` or `end < start`.
    pub fn reconfigure_range(
        &self,
        start: TableId,
        end: TableId,
    ) -> Result<TableSnapshot, StoreError> {
        let range = TableRange::new(start, end)?;
        let now = self.clock.now();
        let mut tables = self.lock();
        *tables = Tables::fresh(range);
        Ok(tables.snapshot(now))
    }

    /// Lists red tables by time spent red, longest first.
    ///
    /// Ties are broken by ascending table id.  At most `limit` entries.
    pub fn top_red_durations(&self, limit: usize) -> Vec<RedDuration> {
        let now = self.clock.now();
        self.lock().red_durations(now, limit)
    }

    /// The configured range.
    pub fn range(&self) -> TableRange {
        self.lock().range
    }

    /// Current color of `table`, or `None` if the store has never seen it.
    pub fn color(&self, table: TableId) -> Option<Color> {
        self.lock().entries.get(&table).map(|entry| entry.color)
    }

    /// Instant `table` turned red, or `None` when it is not red.
    pub fn red_since(&self, table: TableId) -> Option<Instant> {
        self.lock()
            .entries
            .get(&table)
            .and_then(|entry| entry.red_since)
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A panic while holding the lock cannot leave a half-applied entry
        // (each mutation is a single assignment), so the data stays usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
