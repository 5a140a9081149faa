//! Connection contract
//!
//! The reactor only ever talks to a connection through [`Connection`].
//! Transport details, retry counts and backoff all live behind it.

mod policy;
mod state;
mod tcp;
mod tls;

pub use policy::{Backoff, ReconnectPolicy};
pub use state::{ConnectionId, ConnectionPhase, ConnectionStats};
pub use tcp::TcpConnection;
pub use tls::build_client_config;

use std::io;
use std::os::unix::io::RawFd;

/// Interest a connection declares for one poll pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Interest {
    pub readable: bool,
    pub writable: bool,
    pub errorable: bool,
}

impl Interest {
    /// No interest at all; the connection sits this pass out
    pub const NONE: Interest = Interest {
        readable: false,
        writable: false,
        errorable: false,
    };

    pub fn readable() -> Self {
        Self {
            readable: true,
            errorable: true,
            ..Self::NONE
        }
    }

    pub fn writable() -> Self {
        Self {
            writable: true,
            errorable: true,
            ..Self::NONE
        }
    }

    /// Add write interest on top of the current flags
    pub fn with_writable(mut self, writable: bool) -> Self {
        self.writable |= writable;
        self
    }

    pub fn is_none(&self) -> bool {
        !self.readable && !self.writable && !self.errorable
    }
}

/// One multiplexed, non-blocking endpoint
pub trait Connection {
    /// Initiate the underlying transport
    fn connect(&mut self) -> io::Result<()>;

    /// Re-establish the transport, applying the connection's own retry policy
    fn reconnect(&mut self);

    /// Release the transport immediately
    fn stop(&mut self);

    /// Declare interest for the current pass
    fn classify_interest(&mut self) -> Interest;

    /// Descriptor of the live transport, if any
    fn descriptor(&self) -> Option<RawFd>;

    /// Perform exactly one non-blocking read
    fn read_once(&mut self) -> io::Result<usize>;

    /// Perform exactly one non-blocking write
    fn write_once(&mut self) -> io::Result<usize>;

    /// Failure the connection recovered from on its own since the last call,
    /// e.g. a reconnect attempt started during `classify_interest`
    fn take_failure(&mut self) -> Option<io::Error> {
        None
    }
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn connect(&mut self) -> io::Result<()> {
        (**self).connect()
    }

    fn reconnect(&mut self) {
        (**self).reconnect()
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn classify_interest(&mut self) -> Interest {
        (**self).classify_interest()
    }

    fn descriptor(&self) -> Option<RawFd> {
        (**self).descriptor()
    }

    fn read_once(&mut self) -> io::Result<usize> {
        (**self).read_once()
    }

    fn write_once(&mut self) -> io::Result<usize> {
        (**self).write_once()
    }

    fn take_failure(&mut self) -> Option<io::Error> {
        (**self).take_failure()
    }
}
