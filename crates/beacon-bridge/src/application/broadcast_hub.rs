//! Fan-out of push messages to every connected observer.
//!
//! The hub owns one [`Observer`] per live connection, keyed by a random
//! [`ObserverId`].  [`BroadcastHub::broadcast`] serializes a message once and
//! hands the same text to every observer.  An observer whose delivery fails
//! is removed on the spot; the remaining observers still receive the
//! message, and the caller never sees an error.
//!
//! Delivery is best-effort: there is no retry and no replay.  A reconnecting
//! observer catches up through the snapshot it receives on connect.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

use crate::domain::messages::PushMessage;

/// Identifier of a registered observer.
pub type ObserverId = Uuid;

/// Why one observer could not take a message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The observer's outbound queue has been closed.
    #[error("observer channel closed")]
    Closed,
}

/// Something that accepts serialized push messages.
///
/// Implementations must not block: the hub calls `deliver` while holding its
/// lock.
pub trait Observer: Send + Sync {
    fn deliver(&self, text: &str) -> Result<(), DeliveryError>;
}

/// Registry of live observers.
#[derive(Default)]
pub struct BroadcastHub {
    observers: Mutex<HashMap<ObserverId, Box<dyn Observer>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer and returns its id.  Registering the same underlying
    /// connection twice yields two independent registrations.
    pub fn register(&self, observer: Box<dyn Observer>) -> ObserverId {
        let id = Uuid::new_v4();
        let mut observers = self.lock();
        observers.insert(id, observer);
        debug!("observer {id} registered ({} total)", observers.len());
        id
    }

    /// Removes an observer.  Unknown ids are ignored.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            debug!("observer {id} unregistered");
        }
        removed
    }

    /// Delivers `message` to every observer and returns how many took it.
    ///
    /// Observers that fail are dropped from the hub.
    pub fn broadcast(&self, message: &PushMessage) -> usize {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                error!("failed to serialize {} push: {e}", message.type_name());
                return 0;
            }
        };

        let mut observers = self.lock();
        let mut failed = Vec::new();
        for (id, observer) in observers.iter() {
            if let Err(e) = observer.deliver(&text) {
                debug!("dropping observer {id}: {e}");
                failed.push(*id);
            }
        }
        for id in &failed {
            observers.remove(id);
        }

        let reached = observers.len();
        debug!(
            "broadcast {} to {reached} observer(s), dropped {}",
            message.type_name(),
            failed.len()
        );
        reached
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ObserverId, Box<dyn Observer>>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
