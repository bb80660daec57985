//! Serial connection lifecycle: discovery, reading, command writes.
//!
//! # Two halves
//!
//! - [`LinkManager`] is shared (`Arc`) and callable from any thread.  It owns
//!   the open connection's *writer* behind a mutex and implements
//!   [`CommandLink`] for observer requests.
//! - [`LinkWorker`] runs on a dedicated OS thread named `beacon-serial`.  It
//!   owns the connection's *reader* and applies every accepted line through
//!   the [`ChangeFeed`], which queues one [`StateEvent`] per change for the
//!   async side.
//!
//! # State machine
//!
//! ```text
//!            ┌────────────── error / EOF / port change ─────────────┐
//!            ▼                                                      │
//!  Idle ──► Searching ── port found, opened ──► Connected ── line ──┤
//!            │    ▲                                  ▲              │
//!            └────┘ nothing found: wait retry        └──────────────┘
//! ```
//!
//! [`LinkWorker::step`] performs exactly one transition, which keeps every
//! edge testable in isolation.  [`LinkWorker::run`] calls it in a loop while
//! the shared `running` flag is set.
//!
//! A session the device ends (EOF or read error) is followed by one retry
//! interval before the next search.
//!
//! # Port changes
//!
//! [`LinkManager::set_port`] closes the current connection immediately and
//! bumps a generation counter.  The worker records the counter before it
//! picks a port.  Handles opened under an older generation are discarded
//! instead of installed, and a reader whose generation is stale is dropped on
//! its next step.  Either way the worker goes back to `Idle` and reconnects
//! using the new preference without waiting.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use beacon_core::{encode_command, parse_line, Color, Frame, Target};
use tracing::{debug, info, warn};

use super::{select_port, LineSource, ReadOutcome, SerialBackend};
use crate::application::change_feed::ChangeFeed;
use crate::application::command_link::{CommandLink, LinkError};
use crate::domain::config::{normalize_port, BridgeConfig};
use crate::domain::messages::LinkStatus;

/// Longest single sleep while waiting out the retry interval, so shutdown
/// is noticed promptly.
const RETRY_SLICE: Duration = Duration::from_millis(100);

// ── Settings and diagnostics ──────────────────────────────────────────────────

/// Fixed serial parameters, taken from [`BridgeConfig`] at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSettings {
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub retry_interval: Duration,
    pub device_tokens: Vec<String>,
}

impl From<&BridgeConfig> for LinkSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            baud_rate: config.baud_rate,
            read_timeout: config.read_timeout,
            retry_interval: config.retry_interval,
            device_tokens: config.device_tokens.clone(),
        }
    }
}

/// Counters describing what the link has seen since startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkDiagnostics {
    /// Lines that changed the store.
    pub lines_applied: u64,
    /// `RT` echo lines discarded.
    pub echoes_dropped: u64,
    /// Lines rejected by the codec, plus over-long runs without a newline.
    pub malformed_lines: u64,
    /// Successful port opens.
    pub connections_opened: u64,
}

#[derive(Debug, Default)]
struct Counters {
    lines_applied: AtomicU64,
    echoes_dropped: AtomicU64,
    malformed_lines: AtomicU64,
    connections_opened: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// ── LinkManager ───────────────────────────────────────────────────────────────

struct ActiveConnection {
    port: String,
    writer: Box<dyn Write + Send>,
    generation: u64,
}

/// Shared handle to the serial link.
pub struct LinkManager {
    backend: Arc<dyn SerialBackend>,
    settings: LinkSettings,
    configured_port: Mutex<Option<String>>,
    connection: Mutex<Option<ActiveConnection>>,
    generation: AtomicU64,
    counters: Counters,
}

impl LinkManager {
    /// Creates a manager with no open connection.
    ///
    /// `configured_port` pins a port; `None` auto-detects by description.
    pub fn new(
        backend: Arc<dyn SerialBackend>,
        settings: LinkSettings,
        configured_port: Option<String>,
    ) -> Self {
        Self {
            backend,
            settings,
            configured_port: Mutex::new(normalize_port(configured_port.as_deref())),
            connection: Mutex::new(None),
            generation: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    /// Writes `T,<id>,<colorIndex>\n` on the open connection.
    ///
    /// A failed write closes the connection so the worker reconnects.
    ///
    /// # Errors
    ///
    /// [`LinkError::LinkUnavailable`] when nothing is open,
    /// [`LinkError::Transport`] when the write fails.
    pub fn send_command(&self, target: Target, color: Color) -> Result<(), LinkError> {
        let line = encode_command(target, color);
        let mut connection = self.lock_connection();
        let active = connection.as_mut().ok_or(LinkError::LinkUnavailable)?;

        let written = active
            .writer
            .write_all(line.as_bytes())
            .and_then(|()| active.writer.flush());
        match written {
            Ok(()) => {
                debug!("sent {:?} on {}", line.trim_end(), active.port);
                Ok(())
            }
            Err(e) => {
                warn!("write to {} failed: {e}; closing connection", active.port);
                *connection = None;
                self.generation.fetch_add(1, Ordering::SeqCst);
                Err(LinkError::Transport(e))
            }
        }
    }

    /// Commands every device back to green.
    pub fn reset_command(&self) -> Result<(), LinkError> {
        self.send_command(Target::All, Color::Green)
    }

    /// Pins a port (`None` or blank means auto-detect) and tears down the
    /// current connection so the worker reconnects with the new preference.
    pub fn set_port(&self, port: Option<String>) {
        let port = normalize_port(port.as_deref());
        *self.lock_configured() = port;

        let mut connection = self.lock_connection();
        if let Some(active) = connection.take() {
            info!("closing {} after port change", active.port);
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Configured port, open port and the ports present right now.
    ///
    /// Enumeration failures yield an empty list.
    pub fn status(&self) -> LinkStatus {
        let available_ports = match self.backend.available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!("{e}");
                Vec::new()
            }
        };
        LinkStatus {
            configured_port: self.lock_configured().clone(),
            active_port: self.active_port(),
            available_ports,
        }
    }

    /// Port currently open, if any.
    pub fn active_port(&self) -> Option<String> {
        self.lock_connection()
            .as_ref()
            .map(|active| active.port.clone())
    }

    pub fn diagnostics(&self) -> LinkDiagnostics {
        LinkDiagnostics {
            lines_applied: self.counters.lines_applied.load(Ordering::Relaxed),
            echoes_dropped: self.counters.echoes_dropped.load(Ordering::Relaxed),
            malformed_lines: self.counters.malformed_lines.load(Ordering::Relaxed),
            connections_opened: self.counters.connections_opened.load(Ordering::Relaxed),
        }
    }

    // ── Worker-side helpers ───────────────────────────────────────────────────

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// The port to try next: the configured one, or the first port whose
    /// description matches a device token.
    fn choose_port(&self) -> Option<String> {
        if let Some(port) = self.lock_configured().clone() {
            return Some(port);
        }
        let ports = match self.backend.available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!("{e}");
                return None;
            }
        };
        select_port(&ports, &self.settings.device_tokens).map(|port| port.device.clone())
    }

    /// Opens `port` and installs its writer under `generation`.
    ///
    /// Returns `Ok(None)` when the port preference changed while the port was
    /// opening; the fresh handles are dropped and nothing is installed.
    fn connect(
        &self,
        port: &str,
        generation: u64,
    ) -> Result<Option<Box<dyn LineSource>>, LinkError> {
        let handles = self
            .backend
            .open(port, self.settings.baud_rate, self.settings.read_timeout)?;

        let mut connection = self.lock_connection();
        if self.current_generation() != generation {
            return Ok(None);
        }
        *connection = Some(ActiveConnection {
            port: port.to_string(),
            writer: handles.writer,
            generation,
        });
        bump(&self.counters.connections_opened);
        Ok(Some(handles.reader))
    }

    /// Drops the installed writer if it still belongs to `generation`.
    fn disconnect(&self, generation: u64) {
        let mut connection = self.lock_connection();
        if connection
            .as_ref()
            .is_some_and(|active| active.generation == generation)
        {
            *connection = None;
        }
    }

    fn lock_connection(&self) -> MutexGuard<'_, Option<ActiveConnection>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_configured(&self) -> MutexGuard<'_, Option<String>> {
        self.configured_port
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommandLink for LinkManager {
    fn send_command(&self, target: Target, color: Color) -> Result<(), LinkError> {
        LinkManager::send_command(self, target, color)
    }

    fn reset_command(&self) -> Result<(), LinkError> {
        LinkManager::reset_command(self)
    }

    fn set_port(&self, port: Option<String>) {
        LinkManager::set_port(self, port)
    }

    fn status(&self) -> LinkStatus {
        LinkManager::status(self)
    }
}

// ── LinkWorker ────────────────────────────────────────────────────────────────

/// Lifecycle state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No connection.  Any stale reader is dropped on entry.
    Idle,
    /// Looking for a port to open.
    Searching,
    /// Reading lines from an open port.
    Connected,
}

struct Session {
    port: String,
    reader: Box<dyn LineSource>,
    generation: u64,
}

/// The blocking side of the link.  Owns the reader.
pub struct LinkWorker {
    manager: Arc<LinkManager>,
    feed: Arc<ChangeFeed>,
    running: Arc<AtomicBool>,
    session: Option<Session>,
}

impl LinkWorker {
    pub fn new(manager: Arc<LinkManager>, feed: Arc<ChangeFeed>, running: Arc<AtomicBool>) -> Self {
        Self {
            manager,
            feed,
            running,
            session: None,
        }
    }

    /// Starts [`run`](Self::run) on a thread named `beacon-serial`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("beacon-serial".to_string())
            .spawn(move || self.run())
    }

    /// Steps the state machine until the `running` flag is cleared.
    pub fn run(mut self) {
        info!("serial worker started");
        let mut state = LinkState::Idle;
        while self.running.load(Ordering::Relaxed) {
            state = self.step(state);
        }
        self.end_session();
        info!("serial worker stopped");
    }

    /// Performs one transition and returns the next state.
    pub fn step(&mut self, state: LinkState) -> LinkState {
        match state {
            LinkState::Idle => {
                self.end_session();
                LinkState::Searching
            }
            LinkState::Searching => self.search(),
            LinkState::Connected => self.read_one(),
        }
    }

    /// Whether the worker currently holds a reader.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn search(&mut self) -> LinkState {
        let generation = self.manager.current_generation();
        let Some(port) = self.manager.choose_port() else {
            debug!(
                "no beacon receiver found; retrying in {:?}",
                self.manager.settings.retry_interval
            );
            self.pause();
            return LinkState::Searching;
        };

        match self.manager.connect(&port, generation) {
            Ok(Some(reader)) => {
                info!("connected to {port} at {} baud", self.manager.settings.baud_rate);
                self.session = Some(Session {
                    port,
                    reader,
                    generation,
                });
                self.feed.publish_status(self.manager.status());
                LinkState::Connected
            }
            Ok(None) => {
                info!("port preference changed while opening {port}; searching again");
                LinkState::Idle
            }
            Err(e) => {
                warn!("{e}; retrying in {:?}", self.manager.settings.retry_interval);
                self.pause();
                LinkState::Idle
            }
        }
    }

    fn read_one(&mut self) -> LinkState {
        let Some(session) = self.session.as_mut() else {
            return LinkState::Idle;
        };
        if session.generation != self.manager.current_generation() {
            info!("leaving {} after port change", session.port);
            return LinkState::Idle;
        }

        match session.reader.next_line() {
            Ok(ReadOutcome::Line(line)) => {
                self.handle_line(&line);
                LinkState::Connected
            }
            Ok(ReadOutcome::Idle) => LinkState::Connected,
            Ok(ReadOutcome::Overflow(discarded)) => {
                debug!("discarded {discarded} bytes without a line break");
                bump(&self.manager.counters.malformed_lines);
                LinkState::Connected
            }
            Ok(ReadOutcome::Closed) => {
                warn!("{} closed by device", session.port);
                self.back_off()
            }
            Err(e) => {
                warn!("read from {} failed: {e}", session.port);
                self.back_off()
            }
        }
    }

    /// Applies one inbound line: at most one store mutation and one event.
    fn handle_line(&self, line: &str) {
        let counters = &self.manager.counters;
        match parse_line(line) {
            Ok(Frame::Echo) => {
                debug!("ignoring echo {line:?}");
                bump(&counters.echoes_dropped);
                return;
            }
            Ok(Frame::Status {
                table,
                color,
                relayed,
            }) => {
                if relayed {
                    debug!("status for table {table} arrived through a repeater");
                }
                self.feed.update(table, color);
            }
            Ok(Frame::Command {
                target: Target::Table(table),
                color,
            }) => {
                self.feed.update(table, color);
            }
            Ok(Frame::Command {
                target: Target::All,
                color,
            }) => {
                self.feed.fill(color);
            }
            Err(e) => {
                debug!("dropping malformed line {line:?}: {e}");
                bump(&counters.malformed_lines);
                return;
            }
        }
        debug!("applied {line:?}");
        bump(&counters.lines_applied);
    }

    /// Ends a session the device dropped and waits one retry interval before
    /// searching again.
    fn back_off(&mut self) -> LinkState {
        self.end_session();
        debug!(
            "searching again in {:?}",
            self.manager.settings.retry_interval
        );
        self.pause();
        LinkState::Idle
    }

    /// Drops the reader and the matching writer, announcing the disconnect.
    fn end_session(&mut self) {
        if let Some(session) = self.session.take() {
            self.manager.disconnect(session.generation);
            info!("disconnected from {}", session.port);
            self.feed.publish_status(self.manager.status());
        }
    }

    /// Sleeps for the retry interval in short slices while running.
    fn pause(&self) {
        let deadline = Instant::now() + self.manager.settings.retry_interval;
        while self.running.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(RETRY_SLICE));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
