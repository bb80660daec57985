//! Scripted serial backend for unit and integration tests.
//!
//! Tests add fake ports, queue the lines the "device" will send, and inspect
//! what the bridge wrote back, without any hardware attached.
//!
//! ```rust
//! use beacon_bridge::infrastructure::serial::mock::MockSerialBackend;
//!
//! let backend = MockSerialBackend::new();
//! backend.add_port("/dev/ttyACM0", "mbed Serial Port");
//! backend.queue_lines(&["S,3,1", "RT,3,1"]);
//! ```

use std::collections::{HashSet, VecDeque};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{LineSource, ReadOutcome, SerialBackend, SerialHandles};
use crate::application::command_link::LinkError;
use crate::domain::messages::PortInfo;

/// What the fake device does on the next read.
#[derive(Debug, Clone)]
enum Scripted {
    Line(String),
    Overflow(usize),
    Disconnect,
    Fail,
}

#[derive(Default)]
struct MockState {
    ports: Vec<PortInfo>,
    enumerate_fails: bool,
    unopenable: HashSet<String>,
    opened: Vec<String>,
    incoming: VecDeque<Scripted>,
    written: Vec<u8>,
    fail_writes: bool,
}

/// A [`SerialBackend`] driven entirely by the test.
#[derive(Clone, Default)]
pub struct MockSerialBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockSerialBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a port show up in enumeration.
    pub fn add_port(&self, device: &str, description: &str) {
        self.lock().ports.push(PortInfo {
            device: device.to_string(),
            description: description.to_string(),
        });
    }

    /// Removes a port from enumeration (the device was unplugged).
    pub fn remove_port(&self, device: &str) {
        self.lock().ports.retain(|port| port.device != device);
    }

    /// Makes enumeration fail until cleared.
    pub fn set_enumerate_fails(&self, fails: bool) {
        self.lock().enumerate_fails = fails;
    }

    /// Makes every attempt to open `device` fail.
    pub fn fail_open(&self, device: &str) {
        self.lock().unopenable.insert(device.to_string());
    }

    /// Queues lines for the open connection to read, in order.
    pub fn queue_lines(&self, lines: &[&str]) {
        let mut state = self.lock();
        for line in lines {
            state.incoming.push_back(Scripted::Line(line.to_string()));
        }
    }

    /// Queues `bytes` of noise that never contain a line break.
    pub fn queue_overflow(&self, bytes: usize) {
        self.lock().incoming.push_back(Scripted::Overflow(bytes));
    }

    /// Queues an end-of-stream after any lines already queued.
    pub fn queue_disconnect(&self) {
        self.lock().incoming.push_back(Scripted::Disconnect);
    }

    /// Queues a read error after any lines already queued.
    pub fn queue_read_error(&self) {
        self.lock().incoming.push_back(Scripted::Fail);
    }

    /// Makes every write fail until cleared.
    pub fn set_fail_writes(&self, fails: bool) {
        self.lock().fail_writes = fails;
    }

    /// Everything the bridge has written, split into lines.
    pub fn written_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.lock().written)
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Ports successfully opened so far, in order.
    pub fn opened_ports(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SerialBackend for MockSerialBackend {
    fn available_ports(&self) -> Result<Vec<PortInfo>, LinkError> {
        let state = self.lock();
        if state.enumerate_fails {
            return Err(LinkError::Enumerate("mock enumeration failure".into()));
        }
        Ok(state.ports.clone())
    }

    fn open(
        &self,
        port: &str,
        _baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<SerialHandles, LinkError> {
        let mut state = self.lock();
        if state.unopenable.contains(port) {
            return Err(LinkError::Open {
                port: port.to_string(),
                reason: "mock open failure".into(),
            });
        }
        state.opened.push(port.to_string());
        Ok(SerialHandles {
            reader: Box::new(MockLineSource {
                backend: self.clone(),
                read_timeout,
            }),
            writer: Box::new(MockWriter {
                backend: self.clone(),
            }),
        })
    }
}

struct MockLineSource {
    backend: MockSerialBackend,
    read_timeout: Duration,
}

impl LineSource for MockLineSource {
    fn next_line(&mut self) -> io::Result<ReadOutcome> {
        let next = self.backend.lock().incoming.pop_front();
        match next {
            Some(Scripted::Line(line)) => Ok(ReadOutcome::Line(line)),
            Some(Scripted::Overflow(bytes)) => Ok(ReadOutcome::Overflow(bytes)),
            Some(Scripted::Disconnect) => Ok(ReadOutcome::Closed),
            Some(Scripted::Fail) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock read failure",
            )),
            None => {
                // Behave like a silent device: wait out the read timeout.
                std::thread::sleep(self.read_timeout);
                Ok(ReadOutcome::Idle)
            }
        }
    }
}

struct MockWriter {
    backend: MockSerialBackend,
}

impl Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.backend.lock();
        if state.fail_writes {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock write failure",
            ));
        }
        state.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
