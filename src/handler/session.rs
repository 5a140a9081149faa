//! Stream session handler
//!
//! [`StreamHandler`] is the stock [`Factory`]: it builds a
//! [`TcpConnection`], and on every tick turns the transport events queued on
//! its [`Link`] into calls on user-supplied [`SessionHooks`].

use std::sync::Arc;
use tracing::debug;

use super::link::{Link, LinkEvent};
use super::Factory;
use crate::connection::{Connection, ReconnectPolicy, TcpConnection};

/// Write side handed to hooks
pub struct Outbox<'a> {
    link: &'a Link,
}

impl Outbox<'_> {
    /// Queue bytes for the peer
    pub fn send(&mut self, data: &[u8]) {
        self.link.send(data);
    }

    pub fn pending(&self) -> usize {
        self.link.pending_outbound()
    }
}

/// Application callbacks for one session
pub trait SessionHooks {
    /// Transport is up; typically sends the greeting or auth request
    fn on_connect(&mut self, _outbox: &mut Outbox<'_>) {}

    /// Bytes arrived from the peer
    fn on_data(&mut self, data: &[u8], outbox: &mut Outbox<'_>);

    /// Transport dropped; a reconnect may follow
    fn on_disconnect(&mut self) {}

    /// Advance protocol timers; runs after pending events every tick
    fn on_tick(&mut self, _outbox: &mut Outbox<'_>) {}

    /// Session readiness given whether the transport is established
    fn is_ready(&self, established: bool) -> bool {
        established
    }
}

/// Factory that drives a [`TcpConnection`] through [`SessionHooks`]
pub struct StreamHandler<H> {
    hooks: H,
    link: Link,
    policy: ReconnectPolicy,
    tls_config: Option<Arc<rustls::ClientConfig>>,
    established: bool,
}

impl<H: SessionHooks> StreamHandler<H> {
    pub fn new(hooks: H) -> Self {
        Self {
            hooks,
            link: Link::new(),
            policy: ReconnectPolicy::default(),
            tls_config: None,
            established: false,
        }
    }

    /// Reconnect policy given to every connection this handler builds
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_tls_config(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Handle for queueing outbound data from the host
    pub fn link(&self) -> Link {
        self.link.clone()
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn is_established(&self) -> bool {
        self.established
    }
}

impl<H: SessionHooks> Factory for StreamHandler<H> {
    fn build_connection(&mut self, host: &str, port: u16, secure: bool) -> Box<dyn Connection> {
        let mut connection = TcpConnection::new(host, port, secure, self.link.clone(), &self.policy);
        if let Some(config) = &self.tls_config {
            connection = connection.with_tls_config(config.clone());
        }
        Box::new(connection)
    }

    fn tick(&mut self) {
        for event in self.link.drain_events() {
            let mut outbox = Outbox { link: &self.link };
            match event {
                LinkEvent::Established => {
                    self.established = true;
                    self.hooks.on_connect(&mut outbox);
                }
                LinkEvent::Data(data) => self.hooks.on_data(&data, &mut outbox),
                LinkEvent::Closed => {
                    debug!("Session transport closed");
                    self.established = false;
                    self.hooks.on_disconnect();
                }
            }
        }

        let mut outbox = Outbox { link: &self.link };
        self.hooks.on_tick(&mut outbox);
    }

    fn is_ready(&self) -> bool {
        self.hooks.is_ready(self.established)
    }
}
