//! Integration tests for beacon-core.
//!
//! These tests feed raw serial lines through the public codec into a
//! [`TableStore`] driven by a [`ManualClock`], the same way the bridge's link
//! worker does, and check the resulting payloads.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::{
    parse_line, Color, ColorCounts, Frame, ManualClock, Target, TableRange, TableStore,
};

/// Applies one line to the store, returning `true` if state changed.
fn feed(store: &TableStore, line: &str) -> bool {
    match parse_line(line) {
        Ok(Frame::Status { table, color, .. }) => {
            store.update(table, color);
            true
        }
        Ok(Frame::Command {
            target: Target::Table(table),
            color,
        }) => {
            store.update(table, color);
            true
        }
        Ok(Frame::Command {
            target: Target::All,
            color,
        }) => {
            store.fill(color);
            true
        }
        Ok(Frame::Echo) | Err(_) => false,
    }
}

fn make_store(start: i32, end: i32) -> (TableStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let store = TableStore::with_clock(
        TableRange::new(start, end).expect("valid range"),
        clock.clone(),
    );
    (store, clock)
}

#[test]
fn test_classroom_session_from_orange_to_red_to_green() {
    // Arrange
    let (store, clock) = make_store(1, 5);

    // Act / Assert: table 3 asks a question
    assert!(feed(&store, "S,3,1\n"));
    let snapshot = store.snapshot();
    assert_eq!(
        snapshot.counts,
        ColorCounts {
            green: 4,
            orange: 1,
            red: 0
        }
    );

    // Table 3 escalates and waits ten seconds
    assert!(feed(&store, "S,3,2\n"));
    clock.advance(Duration::from_secs(10));
    let top = store.top_red_durations(10);
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].table, 3);
    assert_eq!(top[0].seconds, 10);

    // The teacher arrives and the beacon goes back to green
    assert!(feed(&store, "S,3,0\n"));
    let snapshot = store.snapshot();
    assert_eq!(snapshot.counts.green, 5);
    assert!(snapshot.red_durations.is_empty());
    assert_eq!(store.red_since(3), None);
}

#[test]
fn test_echo_lines_never_change_state() {
    let (store, _clock) = make_store(1, 5);
    let before = store.snapshot();

    for line in ["RT,2,2", "RT,-1,1", "RT,not,numbers", "RT,1"] {
        assert!(!feed(&store, line), "{line} must be discarded");
    }

    assert_eq!(store.snapshot(), before);
}

#[test]
fn test_malformed_lines_never_change_state() {
    let (store, _clock) = make_store(1, 5);
    let before = store.snapshot();

    for line in [
        "",
        "garbage",
        "S,1",
        "S,1,2,3",
        "Q,1,2",
        "S,x,1",
        "S,1,7",
        "S,0,1",
        "T,-5,1",
    ] {
        assert!(!feed(&store, line), "{line:?} must be rejected");
    }

    assert_eq!(store.snapshot(), before);
}

#[test]
fn test_relayed_status_is_applied_like_direct_status() {
    let (store, _clock) = make_store(1, 5);

    assert!(feed(&store, "RS,4,2"));

    assert_eq!(store.color(4), Some(Color::Red));
}

#[test]
fn test_inbound_broadcast_command_fills_every_table() {
    let (store, _clock) = make_store(1, 5);
    feed(&store, "S,2,2");

    assert!(feed(&store, "T,-1,1"));

    let snapshot = store.snapshot();
    assert_eq!(snapshot.counts.orange, 5);
    assert_eq!(store.red_since(2), None);
}

#[test]
fn test_status_for_table_outside_range_is_adopted() {
    let (store, _clock) = make_store(1, 5);

    assert!(feed(&store, "S,60,1"));

    let snapshot = store.snapshot();
    assert_eq!(snapshot.tables.len(), 6);
    assert_eq!(snapshot.tables.last().map(|t| t.table), Some(60));
}
