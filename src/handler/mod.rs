//! Factory/handler contract
//!
//! A factory owns one connection's application lifecycle: it builds the
//! connection, reports when its session is ready and runs protocol
//! housekeeping once per reactor tick.

mod link;
mod session;

pub use link::{Link, LinkEvent};
pub use session::{Outbox, SessionHooks, StreamHandler};

use crate::connection::Connection;

/// Builder and lifecycle owner for one connection
pub trait Factory {
    /// Build a connection bound to this factory's handler
    fn build_connection(&mut self, host: &str, port: u16, secure: bool) -> Box<dyn Connection>;

    /// One unit of protocol housekeeping; must not block
    fn tick(&mut self);

    /// Whether this handler's session handshake has completed
    fn is_ready(&self) -> bool;
}

impl<F: Factory + ?Sized> Factory for Box<F> {
    fn build_connection(&mut self, host: &str, port: u16, secure: bool) -> Box<dyn Connection> {
        (**self).build_connection(host, port, secure)
    }

    fn tick(&mut self) {
        (**self).tick()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}
