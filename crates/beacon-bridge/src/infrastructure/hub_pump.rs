//! Moves queued state events into the broadcast hub.
//!
//! Writers never call the hub directly: the [`ChangeFeed`] pushes
//! [`StateEvent`]s into a bounded channel with `blocking_send`, and this task
//! drains the channel on the tokio runtime.  A single FIFO queue keeps
//! per-table order intact.
//!
//! [`ChangeFeed`]: crate::application::change_feed::ChangeFeed

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::application::broadcast_hub::BroadcastHub;
use crate::application::change_feed::StateEvent;
use crate::domain::messages::PushMessage;

/// Broadcasts every event until every sender of the channel is dropped.
pub async fn run_hub_pump(mut events: mpsc::Receiver<StateEvent>, hub: Arc<BroadcastHub>) {
    while let Some(event) = events.recv().await {
        let message = PushMessage::from(event);
        let reached = hub.broadcast(&message);
        debug!("pumped {} to {reached} observer(s)", message.type_name());
    }
    info!("state event queue closed; hub pump stopped");
}

/// Spawns [`run_hub_pump`] on the current runtime.
pub fn spawn_hub_pump(events: mpsc::Receiver<StateEvent>, hub: Arc<BroadcastHub>) -> JoinHandle<()> {
    tokio::spawn(run_hub_pump(events, hub))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::broadcast_hub::{DeliveryError, Observer};
    use crate::application::change_feed::EVENT_QUEUE_CAPACITY;
    use beacon_core::{Color, TableRange, TableStore};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collector(Mutex<Vec<String>>);

    impl Observer for Arc<Collector> {
        fn deliver(&self, text: &str) -> Result<(), DeliveryError> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_pump_broadcasts_events_in_order_and_stops_when_sender_drops() {
        // Arrange
        let hub = Arc::new(BroadcastHub::new());
        let collector = Arc::new(Collector::default());
        hub.register(Box::new(collector.clone()));
        let store = TableStore::new(TableRange::new(1, 3).unwrap());
        let (tx, rx) = mpsc::channel(8);

        // Act
        tx.send(StateEvent::TableChanged(store.update(1, Color::Orange)))
            .await
            .unwrap();
        tx.send(StateEvent::TableChanged(store.update(1, Color::Red)))
            .await
            .unwrap();
        tx.send(StateEvent::Snapshot(store.snapshot())).await.unwrap();
        drop(tx);
        run_hub_pump(rx, hub).await;

        // Assert
        let received = collector.0.lock().unwrap().clone();
        assert_eq!(received.len(), 3);
        assert!(received[0].contains(r#""color":"orange""#));
        assert!(received[1].contains(r#""color":"red""#));
        assert!(received[2].starts_with(r#"{"type":"snapshot""#));
    }

    #[test]
    fn test_pump_drains_events_sent_from_a_plain_thread() {
        // Arrange: the worker side uses blocking_send outside the runtime
        let hub = Arc::new(BroadcastHub::new());
        let collector = Arc::new(Collector::default());
        hub.register(Box::new(collector.clone()));
        let store = TableStore::new(TableRange::new(1, 2).unwrap());
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let sender = std::thread::spawn(move || {
            for table in 1..=2 {
                tx.blocking_send(StateEvent::TableChanged(store.update(table, Color::Red)))
                    .unwrap();
            }
        });
        sender.join().unwrap();

        // Act
        tokio_test::block_on(run_hub_pump(rx, hub.clone()));

        // Assert
        assert_eq!(collector.0.lock().unwrap().len(), 2);
        assert_eq!(hub.len(), 1);
    }
}
