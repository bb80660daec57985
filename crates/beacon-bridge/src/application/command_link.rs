//! The seam between request handling and the serial link.
//!
//! [`RequestService`](super::request_service::RequestService) only needs to
//! push commands onto the wire and inspect the link; it does not care how the
//! port is opened or read.  The production implementation is
//! [`LinkManager`](crate::infrastructure::serial::link_manager::LinkManager);
//! unit tests use the `mockall`-generated `MockCommandLink`.

use beacon_core::{Color, Target};
use thiserror::Error;

use crate::domain::messages::LinkStatus;

/// Errors from the serial link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// A command was issued while no device is connected.
    #[error("no serial device is connected")]
    LinkUnavailable,

    /// Writing to or reading from the open port failed.
    #[error("serial transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// The port could not be opened.
    #[error("failed to open serial port {port}: {reason}")]
    Open { port: String, reason: String },

    /// Serial ports could not be listed.
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(String),
}

/// Operations observers can trigger on the serial link.
#[cfg_attr(test, mockall::automock)]
pub trait CommandLink: Send + Sync {
    /// Writes one `T,<id>,<colorIndex>` command line.
    ///
    /// # Errors
    ///
    /// [`LinkError::LinkUnavailable`] when nothing is connected,
    /// [`LinkError::Transport`] when the write fails.
    fn send_command(&self, target: Target, color: Color) -> Result<(), LinkError>;

    /// Commands every device back to green.
    fn reset_command(&self) -> Result<(), LinkError> {
        self.send_command(Target::All, Color::Green)
    }

    /// Pins the serial port (`None` or blank means auto-detect) and forces a
    /// reconnect.
    fn set_port(&self, port: Option<String>);

    /// Current configured port, open port and enumerated ports.
    fn status(&self) -> LinkStatus;
}
