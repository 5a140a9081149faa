//! collab-mux - cooperative connection multiplexer for collaboration clients
//!
//! A [`Reactor`] owns every connection of one collaboration session. The host
//! calls [`Reactor::tick`] on its own schedule; each tick runs factory
//! housekeeping and one zero-timeout poll-and-dispatch pass, so nothing in
//! this crate ever blocks or spawns a thread.

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod reactor;
pub mod util;

/// Only compiled for tests or with the `testing` feature.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::Config;
pub use connection::{Connection, Interest, ReconnectPolicy, TcpConnection};
pub use error::ReactorError;
pub use handler::{Factory, Link, SessionHooks, StreamHandler};
pub use reactor::{HostNotifier, Reactor};

/// Crate version for display
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
