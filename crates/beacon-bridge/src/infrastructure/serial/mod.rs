//! Serial port access for the beacon receiver.
//!
//! # Layers
//!
//! ```text
//! LinkManager / LinkWorker     connection lifecycle, protocol, store updates
//!         │
//! SerialBackend (trait)        list ports, open one
//!   ├── native::NativeSerialBackend   the `serialport` crate
//!   └── mock::MockSerialBackend       scripted ports for tests
//!         │
//! LineSource (trait)           one line per call, with read timeouts
//!   └── BufferedLineSource<R>  any `Read` (serial port, byte slice, ...)
//! ```
//!
//! # Testability
//!
//! The `SerialBackend` trait lets the link worker run against
//! [`mock::MockSerialBackend`] without any hardware attached.

use std::io::{self, Read, Write};
use std::time::Duration;

use crate::application::command_link::LinkError;
use crate::domain::messages::PortInfo;

pub mod link_manager;
pub mod mock;
pub mod native;

/// Result of one [`LineSource::next_line`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete line, without its terminator.
    Line(String),
    /// The read timed out before a full line arrived.
    Idle,
    /// This many bytes arrived without a line break and were thrown away.
    Overflow(usize),
    /// The device went away (end of stream).
    Closed,
}

/// A blocking source of protocol lines.
pub trait LineSource: Send {
    /// Blocks for at most one read timeout.
    ///
    /// # Errors
    ///
    /// Any I/O error other than a timeout.  The caller treats it as a
    /// disconnect.
    fn next_line(&mut self) -> io::Result<ReadOutcome>;
}

/// The two halves of an open serial connection.
pub struct SerialHandles {
    pub reader: Box<dyn LineSource>,
    pub writer: Box<dyn Write + Send>,
}

/// Lists and opens serial ports.
pub trait SerialBackend: Send + Sync {
    /// Enumerates the serial ports present right now.
    fn available_ports(&self) -> Result<Vec<PortInfo>, LinkError>;

    /// Opens `port` at `baud_rate`.  Reads on the returned handles time out
    /// after `read_timeout`.
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<SerialHandles, LinkError>;
}

/// Picks the first port whose description contains one of `tokens`
/// (case-insensitive).
pub fn select_port<'a>(ports: &'a [PortInfo], tokens: &[String]) -> Option<&'a PortInfo> {
    ports.iter().find(|port| {
        let description = port.description.to_lowercase();
        tokens
            .iter()
            .any(|token| description.contains(&token.to_lowercase()))
    })
}

// ── BufferedLineSource ────────────────────────────────────────────────────────

/// Longest unterminated run kept while waiting for a line break.
pub const MAX_LINE_BYTES: usize = 1024;

/// Splits a byte stream into lines.
///
/// Bytes received before a read timeout are kept, so a line split across two
/// reads comes out whole.  Invalid UTF-8 is replaced, not rejected.  A run
/// longer than [`MAX_LINE_BYTES`] without a line break (noise at the wrong
/// baud rate, for example) is dropped and reported as
/// [`ReadOutcome::Overflow`].
pub struct BufferedLineSource<R> {
    reader: R,
    pending: Vec<u8>,
}

impl<R: Read + Send> BufferedLineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::with_capacity(64),
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        Some(decode(&line[..end]))
    }
}

impl<R: Read + Send> LineSource for BufferedLineSource<R> {
    fn next_line(&mut self) -> io::Result<ReadOutcome> {
        let mut buf = [0u8; 256];
        loop {
            if let Some(line) = self.take_line() {
                return Ok(ReadOutcome::Line(line));
            }
            if self.pending.len() > MAX_LINE_BYTES {
                let discarded = self.pending.len();
                self.pending.clear();
                return Ok(ReadOutcome::Overflow(discarded));
            }
            match self.reader.read(&mut buf) {
                Ok(0) => {
                    if self.pending.is_empty() {
                        return Ok(ReadOutcome::Closed);
                    }
                    // Flush an unterminated last line before reporting EOF.
                    let rest = std::mem::take(&mut self.pending);
                    return Ok(ReadOutcome::Line(decode(&rest)));
                }
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if is_timeout_error(&e) => return Ok(ReadOutcome::Idle),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\r')
        .to_string()
}

/// Returns `true` if `e` is a read timeout rather than a real failure.
pub(crate) fn is_timeout_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
