//! Application layer for beacon-bridge.
//!
//! The application layer knows *what* to do with a request or a state
//! change, but delegates *how* (serial I/O, sockets) to the infrastructure
//! layer through the [`CommandLink`] and [`Observer`] traits.  Every state
//! change flows through the [`ChangeFeed`] so observers see it in order.

pub mod broadcast_hub;
pub mod change_feed;
pub mod command_link;
pub mod request_service;

pub use broadcast_hub::{BroadcastHub, DeliveryError, Observer, ObserverId};
pub use change_feed::{ChangeFeed, StateEvent, EVENT_QUEUE_CAPACITY};
pub use command_link::{CommandLink, LinkError};
pub use request_service::RequestService;
