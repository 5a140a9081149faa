//! Scripted collaborators for exercising the reactor without sockets.
//!
//! - [`ScriptedConnection`] - a connection with fixed interest and scripted
//!   read/write outcomes
//! - [`ScriptedFactory`] - hands out a prototype connection and exposes a
//!   readiness toggle
//! - [`ScriptedProbe`] - replays queued probe outcomes, then reports every
//!   requested read and write as ready
//! - [`RecordingNotifier`] - captures host notifications
//!
//! Every collaborator appends to a shared [`CallLog`], so one log shows the
//! exact order in which the reactor touched them.
//!
//! # Example
//!
//! ```rust
//! use collab_mux::connection::Interest;
//! use collab_mux::reactor::Reactor;
//! use collab_mux::testing::{Call, CallLog, RecordingNotifier, ScriptedConnection, ScriptedFactory, ScriptedProbe};
//!
//! let log = CallLog::new();
//! let mut reactor = Reactor::with_probe(ScriptedProbe::new(log.clone()), RecordingNotifier::new());
//!
//! let conn = ScriptedConnection::new(1, 10, log.clone()).with_interest(Interest::readable());
//! reactor.connect(ScriptedFactory::new(1, conn, log.clone()), "localhost", 3448, false);
//! reactor.tick().unwrap();
//!
//! assert_eq!(log.count(&Call::Read(1)), 1);
//! ```

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::connection::{Connection, Interest};
use crate::handler::Factory;
use crate::reactor::{HostNotifier, InterestSets, Readiness, ReadinessProbe};

/// One observed interaction; the `usize` is the collaborator's label
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Build {
        label: usize,
        host: String,
        port: u16,
        secure: bool,
    },
    Connect(usize),
    Reconnect(usize),
    Stop(usize),
    Read(usize),
    Write(usize),
    FactoryTick(usize),
    Probe(InterestSets),
}

/// Shared, ordered record of calls
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Occurrences of exactly `call`
    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    /// Number of probes issued
    pub fn probes(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::Probe(_)))
            .count()
    }

    /// Position of the first occurrence of `call`
    pub fn position(&self, call: &Call) -> Option<usize> {
        self.calls.lock().iter().position(|c| c == call)
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// Connection with fixed interest and scripted I/O outcomes
#[derive(Debug, Clone)]
pub struct ScriptedConnection {
    label: usize,
    fd: Option<RawFd>,
    interest: Interest,
    connect_error: Option<io::ErrorKind>,
    read_error: Option<io::ErrorKind>,
    write_error: Option<io::ErrorKind>,
    retry_error: Option<io::ErrorKind>,
    log: CallLog,
}

impl ScriptedConnection {
    /// Connection `label` owning descriptor `fd`, with no interest
    pub fn new(label: usize, fd: RawFd, log: CallLog) -> Self {
        Self {
            label,
            fd: Some(fd),
            interest: Interest::NONE,
            connect_error: None,
            read_error: None,
            write_error: None,
            retry_error: None,
            log,
        }
    }

    pub fn with_interest(mut self, interest: Interest) -> Self {
        self.interest = interest;
        self
    }

    pub fn without_descriptor(mut self) -> Self {
        self.fd = None;
        self
    }

    pub fn failing_connect(mut self, kind: io::ErrorKind) -> Self {
        self.connect_error = Some(kind);
        self
    }

    pub fn failing_reads(mut self, kind: io::ErrorKind) -> Self {
        self.read_error = Some(kind);
        self
    }

    pub fn failing_writes(mut self, kind: io::ErrorKind) -> Self {
        self.write_error = Some(kind);
        self
    }

    /// Report one self-recovered failure on the next pass
    pub fn failing_retry(mut self, kind: io::ErrorKind) -> Self {
        self.retry_error = Some(kind);
        self
    }
}

impl Connection for ScriptedConnection {
    fn connect(&mut self) -> io::Result<()> {
        self.log.record(Call::Connect(self.label));
        match self.connect_error {
            Some(kind) => Err(io::Error::new(kind, "scripted connect failure")),
            None => Ok(()),
        }
    }

    fn reconnect(&mut self) {
        self.log.record(Call::Reconnect(self.label));
    }

    fn stop(&mut self) {
        self.log.record(Call::Stop(self.label));
    }

    fn classify_interest(&mut self) -> Interest {
        self.interest
    }

    fn descriptor(&self) -> Option<RawFd> {
        self.fd
    }

    fn read_once(&mut self) -> io::Result<usize> {
        self.log.record(Call::Read(self.label));
        match self.read_error {
            Some(kind) => Err(io::Error::new(kind, "scripted read failure")),
            None => Ok(1),
        }
    }

    fn write_once(&mut self) -> io::Result<usize> {
        self.log.record(Call::Write(self.label));
        match self.write_error {
            Some(kind) => Err(io::Error::new(kind, "scripted write failure")),
            None => Ok(1),
        }
    }

    fn take_failure(&mut self) -> Option<io::Error> {
        self.retry_error
            .take()
            .map(|kind| io::Error::new(kind, "scripted retry failure"))
    }
}

/// Readiness toggle shared between a test and its [`ScriptedFactory`]
#[derive(Debug, Clone, Default)]
pub struct ReadyFlag(Arc<AtomicBool>);

impl ReadyFlag {
    pub fn set(&self, ready: bool) {
        self.0.store(ready, Ordering::SeqCst);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Factory that hands out clones of a prototype connection
pub struct ScriptedFactory {
    label: usize,
    prototype: ScriptedConnection,
    ready: ReadyFlag,
    log: CallLog,
}

impl ScriptedFactory {
    pub fn new(label: usize, prototype: ScriptedConnection, log: CallLog) -> Self {
        Self {
            label,
            prototype,
            ready: ReadyFlag::default(),
            log,
        }
    }

    /// Handle for flipping this factory's readiness
    pub fn readiness(&self) -> ReadyFlag {
        self.ready.clone()
    }
}

impl Factory for ScriptedFactory {
    fn build_connection(&mut self, host: &str, port: u16, secure: bool) -> Box<dyn Connection> {
        self.log.record(Call::Build {
            label: self.label,
            host: host.to_string(),
            port,
            secure,
        });
        Box::new(self.prototype.clone())
    }

    fn tick(&mut self) {
        self.log.record(Call::FactoryTick(self.label));
    }

    fn is_ready(&self) -> bool {
        self.ready.get()
    }
}

enum ProbeStep {
    Ready(Readiness),
    Fail(io::ErrorKind),
}

/// Probe that replays queued outcomes, then reports all requested reads and writes ready
pub struct ScriptedProbe {
    script: VecDeque<ProbeStep>,
    log: CallLog,
}

impl ScriptedProbe {
    pub fn new(log: CallLog) -> Self {
        Self {
            script: VecDeque::new(),
            log,
        }
    }

    /// Next probe reports exactly `readiness`
    pub fn then_ready(mut self, readiness: Readiness) -> Self {
        self.script.push_back(ProbeStep::Ready(readiness));
        self
    }

    /// Next probe fails as a whole
    pub fn then_fail(mut self, kind: io::ErrorKind) -> Self {
        self.script.push_back(ProbeStep::Fail(kind));
        self
    }
}

impl ReadinessProbe for ScriptedProbe {
    fn probe(&mut self, interest: &InterestSets) -> io::Result<Readiness> {
        self.log.record(Call::Probe(interest.clone()));
        match self.script.pop_front() {
            Some(ProbeStep::Ready(readiness)) => Ok(readiness),
            Some(ProbeStep::Fail(kind)) => Err(io::Error::new(kind, "scripted probe failure")),
            None => Ok(Readiness::from(interest)),
        }
    }
}

/// Host notification as seen by the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Status(String),
    Error(String),
}

/// Notifier that keeps every message
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.notices
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notice::Error(message) => Some(message.clone()),
                Notice::Status(_) => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.notices
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notice::Status(message) => Some(message.clone()),
                Notice::Error(_) => None,
            })
            .collect()
    }
}

impl HostNotifier for RecordingNotifier {
    fn status_message(&self, message: &str) {
        self.notices.lock().push(Notice::Status(message.to_string()));
    }

    fn error_message(&self, message: &str) {
        self.notices.lock().push(Notice::Error(message.to_string()));
    }
}
