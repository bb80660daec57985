//! Translates observer requests into store mutations, serial commands and
//! broadcasts.
//!
//! Commands that must reach a device (`set_table`, `reset`) are written to
//! the serial link first.  Only a successful write mutates the store, so
//! observers never see a color the classroom does not.  Nothing is queued for
//! later when the link is down.
//!
//! State changes go through the [`ChangeFeed`] like the serial worker's, so
//! observers receive one ordered stream of changes.
//!
//! [`RequestService::handle`] performs blocking serial I/O and blocking
//! enqueues; async callers run it inside `tokio::task::spawn_blocking`.

use std::sync::Arc;

use beacon_core::Target;
use tracing::{debug, info, warn};

use crate::application::change_feed::ChangeFeed;
use crate::application::command_link::{CommandLink, LinkError};
use crate::domain::config::normalize_port;
use crate::domain::messages::{ErrorCode, ObserverRequest, PushMessage};

/// Executes [`ObserverRequest`]s.
pub struct RequestService {
    feed: Arc<ChangeFeed>,
    link: Arc<dyn CommandLink>,
}

impl RequestService {
    pub fn new(feed: Arc<ChangeFeed>, link: Arc<dyn CommandLink>) -> Self {
        Self { feed, link }
    }

    /// Handles one request.
    ///
    /// State changes reach every observer through the feed.  The
    /// returned message, if any, is meant for the requesting observer only
    /// (query results and errors).
    pub fn handle(&self, request: ObserverRequest) -> Option<PushMessage> {
        debug!("handling {} request", request.type_name());
        match request {
            ObserverRequest::SetTable { table, color } => {
                if table <= 0 {
                    return Some(PushMessage::error(
                        ErrorCode::InvalidTarget,
                        format!("table id must be positive, got {table}"),
                    ));
                }
                if let Err(e) = self.link.send_command(Target::Table(table), color) {
                    return Some(link_error_push(&e));
                }
                self.feed.update(table, color);
                None
            }

            ObserverRequest::Reset => {
                if let Err(e) = self.link.reset_command() {
                    return Some(link_error_push(&e));
                }
                self.feed.reset_all();
                info!("all tables reset to green");
                None
            }

            ObserverRequest::SetRange { start, end } => {
                match self.feed.reconfigure_range(start, end) {
                    Ok(_) => {
                        info!("table range set to {start}-{end}");
                        None
                    }
                    Err(e) => Some(PushMessage::error(ErrorCode::InvalidRange, e.to_string())),
                }
            }

            ObserverRequest::SetPort { port } => {
                let port = normalize_port(port.as_deref());
                info!(
                    "serial port set to {}",
                    port.as_deref().unwrap_or("auto-detect")
                );
                self.link.set_port(port);
                self.feed.publish_status(self.link.status());
                None
            }

            ObserverRequest::GetSnapshot => {
                Some(PushMessage::Snapshot(self.feed.store().snapshot()))
            }

            ObserverRequest::GetSerialStatus => Some(PushMessage::SerialStatus(self.link.status())),
        }
    }
}

fn link_error_push(error: &LinkError) -> PushMessage {
    let code = match error {
        LinkError::LinkUnavailable => ErrorCode::LinkUnavailable,
        _ => ErrorCode::Transport,
    };
    warn!("command rejected: {error}");
    PushMessage::error(code, error.to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
