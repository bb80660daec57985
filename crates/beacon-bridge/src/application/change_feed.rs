//! Ordered feed of state changes toward the broadcast hub.
//!
//! Both the serial worker and observer requests mutate the [`TableStore`].
//! Every mutation goes through [`ChangeFeed`], which applies it and enqueues
//! the resulting [`StateEvent`] under one lock.  The queue therefore holds
//! events in the order the store applied them, and the hub pump replays that
//! order to every observer.
//!
//! Enqueueing uses `blocking_send`.  Call the feed from a plain thread or from
//! inside `tokio::task::spawn_blocking`, never directly from async code.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use beacon_core::{Color, StoreError, TableChange, TableId, TableSnapshot, TableStore};
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::messages::{LinkStatus, PushMessage};

/// Capacity of the queue between the writers and the hub pump.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// One change to broadcast, in application order.
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    /// A single table changed.
    TableChanged(TableChange),
    /// Many tables changed at once (fill, reset, new range).
    Snapshot(TableSnapshot),
    /// The serial link connected, disconnected or changed preference.
    StatusChanged(LinkStatus),
}

impl From<StateEvent> for PushMessage {
    fn from(event: StateEvent) -> Self {
        match event {
            StateEvent::TableChanged(change) => PushMessage::TableUpdate(change),
            StateEvent::Snapshot(snapshot) => PushMessage::Snapshot(snapshot),
            StateEvent::StatusChanged(status) => PushMessage::SerialStatus(status),
        }
    }
}

/// The only write path into the shared [`TableStore`].
pub struct ChangeFeed {
    store: Arc<TableStore>,
    events: mpsc::Sender<StateEvent>,
    order: Mutex<()>,
}

impl ChangeFeed {
    pub fn new(store: Arc<TableStore>, events: mpsc::Sender<StateEvent>) -> Self {
        Self {
            store,
            events,
            order: Mutex::new(()),
        }
    }

    /// Read access for queries; writes must use the methods below.
    pub fn store(&self) -> &TableStore {
        &self.store
    }

    pub fn update(&self, table: TableId, color: Color) -> TableChange {
        let _order = self.lock_order();
        let change = self.store.update(table, color);
        self.send(StateEvent::TableChanged(change.clone()));
        change
    }

    /// Sets every known table to `color`.
    pub fn fill(&self, color: Color) -> TableSnapshot {
        let _order = self.lock_order();
        let snapshot = self.store.fill(color);
        self.send(StateEvent::Snapshot(snapshot.clone()));
        snapshot
    }

    pub fn reset_all(&self) -> TableSnapshot {
        let _order = self.lock_order();
        let snapshot = self.store.reset_all();
        self.send(StateEvent::Snapshot(snapshot.clone()));
        snapshot
    }

    /// Replaces the table set.  Nothing is enqueued when the range is
    /// rejected.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidRange`] when `start <= 0` or `end < start`.
    pub fn reconfigure_range(
        &self,
        start: TableId,
        end: TableId,
    ) -> Result<TableSnapshot, StoreError> {
        let _order = self.lock_order();
        let snapshot = self.store.reconfigure_range(start, end)?;
        self.send(StateEvent::Snapshot(snapshot.clone()));
        Ok(snapshot)
    }

    pub fn publish_status(&self, status: LinkStatus) {
        let _order = self.lock_order();
        self.send(StateEvent::StatusChanged(status));
    }

    fn send(&self, event: StateEvent) {
        if self.events.blocking_send(event).is_err() {
            debug!("event queue closed; dropping state event");
        }
    }

    fn lock_order(&self) -> MutexGuard<'_, ()> {
        self.order.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::TableRange;

    fn make_feed(capacity: usize) -> (Arc<ChangeFeed>, mpsc::Receiver<StateEvent>) {
        let store = Arc::new(TableStore::new(TableRange::new(1, 5).unwrap()));
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(ChangeFeed::new(store, tx)), rx)
    }

    fn drain(events: &mut mpsc::Receiver<StateEvent>) -> Vec<StateEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn test_update_mutates_store_and_enqueues_one_change() {
        // Arrange
        let (feed, mut rx) = make_feed(8);

        // Act
        let change = feed.update(3, Color::Red);

        // Assert
        assert_eq!(feed.store().color(3), Some(Color::Red));
        assert_eq!(drain(&mut rx), vec![StateEvent::TableChanged(change)]);
    }

    #[test]
    fn test_events_follow_mutation_order() {
        let (feed, mut rx) = make_feed(8);

        feed.update(2, Color::Red);
        feed.reset_all();
        feed.update(2, Color::Orange);

        let kinds: Vec<&'static str> = drain(&mut rx)
            .into_iter()
            .map(|event| PushMessage::from(event).type_name())
            .collect();
        assert_eq!(kinds, vec!["table_update", "snapshot", "table_update"]);
    }

    #[test]
    fn test_rejected_range_enqueues_nothing() {
        let (feed, mut rx) = make_feed(8);

        let result = feed.reconfigure_range(9, 2);

        assert!(result.is_err());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_fill_enqueues_snapshot() {
        let (feed, mut rx) = make_feed(8);

        feed.fill(Color::Orange);

        match drain(&mut rx).as_slice() {
            [StateEvent::Snapshot(snapshot)] => assert_eq!(snapshot.counts.orange, 5),
            other => panic!("expected one snapshot, got {other:?}"),
        }
    }

    #[test]
    fn test_concurrent_writers_leave_last_event_matching_store() {
        // Arrange: two writers fight over table 1
        let (feed, mut rx) = make_feed(2048);
        let writers: Vec<_> = [Color::Red, Color::Green]
            .into_iter()
            .map(|color| {
                let feed = Arc::clone(&feed);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        feed.update(1, color);
                    }
                })
            })
            .collect();

        // Act
        for writer in writers {
            writer.join().unwrap();
        }

        // Assert: the last queued change is the state the store ended in
        let last = drain(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                StateEvent::TableChanged(change) => Some(change),
                _ => None,
            })
            .last()
            .unwrap();
        assert_eq!(Some(last.table.color), feed.store().color(1));
        assert_eq!(last.counts, feed.store().snapshot().counts);
    }

    #[test]
    fn test_state_event_converts_to_push_message() {
        let status = LinkStatus::default();
        let message = PushMessage::from(StateEvent::StatusChanged(status.clone()));
        assert_eq!(message, PushMessage::SerialStatus(status));
    }
}
