//! Poll-and-dispatch loop
//!
//! Within one pass, descriptors reported in error are resolved first, then
//! writable ones, then readable ones. A failure on one descriptor turns into
//! a reconnect request on that connection and never stops the rest of the
//! pass. The single exception is a failed probe shared by several
//! connections: its origin cannot be identified, so it is surfaced to the
//! caller as [`ReactorError::UnattributedProbe`].

use std::collections::{BTreeMap, HashMap};
use std::os::unix::io::RawFd;
use tracing::{debug, error, info, warn};

use super::notify::{HostNotifier, LogNotifier};
use super::probe::{InterestSets, PollProbe, ReadinessProbe};
use crate::connection::{Connection, ConnectionId};
use crate::error::{ReactorError, Result};
use crate::handler::Factory;
use crate::metrics::METRICS;

struct Registration {
    connection: Box<dyn Connection>,
    factory: Box<dyn Factory>,
}

/// Cooperative multiplexer for one collaboration session
pub struct Reactor<P: ReadinessProbe = PollProbe> {
    registrations: BTreeMap<ConnectionId, Registration>,
    next_id: u64,
    probe: P,
    notifier: Box<dyn HostNotifier>,
}

impl Reactor<PollProbe> {
    /// Reactor using `poll(2)` and logging host notifications
    pub fn new() -> Self {
        Self::with_probe(PollProbe, LogNotifier)
    }
}

impl Default for Reactor<PollProbe> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ReadinessProbe> Reactor<P> {
    pub fn with_probe<N: HostNotifier + 'static>(probe: P, notifier: N) -> Self {
        Self {
            registrations: BTreeMap::new(),
            next_id: 1,
            probe,
            notifier: Box::new(notifier),
        }
    }

    /// Register a new connection built by `factory` and start connecting it.
    ///
    /// A failed initial connect is reported to the host, not returned; the
    /// connection stays registered and its own policy decides what follows.
    pub fn connect<F>(&mut self, mut factory: F, host: &str, port: u16, secure: bool) -> ConnectionId
    where
        F: Factory + 'static,
    {
        let mut connection = factory.build_connection(host, port, secure);
        let id = ConnectionId::from_raw(self.next_id);
        self.next_id += 1;

        info!(conn_id = %id, host, port, secure, "Connecting");
        if let Err(e) = connection.connect() {
            self.report(id, &format!("Couldn't connect to {}:{}: {}", host, port, e));
        }

        self.registrations.insert(
            id,
            Registration {
                connection,
                factory: Box::new(factory),
            },
        );
        id
    }

    /// Stop every connection and forget the whole session
    pub fn stop(&mut self) {
        for (id, registration) in self.registrations.iter_mut() {
            debug!(conn_id = %id, "Stopping connection");
            registration.connection.stop();
        }
        let stopped = self.registrations.len();
        self.registrations.clear();

        info!(connections = stopped, "Disconnected.");
        self.notifier.status_message("Disconnected.");
    }

    /// True once every registered factory reports ready
    pub fn is_ready(&self) -> bool {
        !self.registrations.is_empty()
            && self
                .registrations
                .values()
                .all(|registration| registration.factory.is_ready())
    }

    /// Run factory housekeeping, then one poll-and-dispatch pass
    pub fn tick(&mut self) -> Result<()> {
        METRICS.tick();
        for registration in self.registrations.values_mut() {
            registration.factory.tick();
        }
        self.poll_once()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.registrations.contains_key(&id)
    }

    /// Registered ids in registration order
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.registrations.keys().copied().collect()
    }

    fn poll_once(&mut self) -> Result<()> {
        if self.registrations.is_empty() {
            return Ok(());
        }
        METRICS.pass();

        let mut interest = InterestSets::default();
        let mut lookup: HashMap<RawFd, ConnectionId> = HashMap::with_capacity(self.registrations.len());
        let mut recovered = Vec::new();

        for (id, registration) in self.registrations.iter_mut() {
            let wanted = registration.connection.classify_interest();
            if let Some(e) = registration.connection.take_failure() {
                recovered.push((*id, e));
            }
            if wanted.is_none() {
                continue;
            }
            let Some(fd) = registration.connection.descriptor() else {
                debug!(conn_id = %id, "Interest without a descriptor, skipping");
                continue;
            };
            if let Some(owner) = lookup.get(&fd) {
                warn!(conn_id = %id, fd, owner = %owner, "Descriptor already claimed this pass, skipping");
                continue;
            }
            lookup.insert(fd, *id);
            interest.insert(fd, wanted);
        }

        for (id, e) in recovered {
            self.report(id, &format!("Couldn't reconnect: {}", e));
        }

        if interest.is_idle() {
            return Ok(());
        }

        METRICS.probe();
        let mut ready = match self.probe.probe(&interest) {
            Ok(ready) => ready,
            Err(e) => {
                METRICS.probe_failed();
                let participants = interest.participants();
                if let [fd] = participants.as_slice() {
                    if let Some(&id) = lookup.get(fd) {
                        self.trigger_reconnect(id);
                        self.report(id, &format!("Error in readiness probe: {}", e));
                        return Ok(());
                    }
                }

                error!(participants = participants.len(), error = %e, "Readiness probe failed across connections");
                self.notifier
                    .error_message(&format!("Error in readiness probe: {}", e));
                return Err(ReactorError::UnattributedProbe {
                    participants: participants.len(),
                    source: e,
                });
            }
        };

        for fd in std::mem::take(&mut ready.errorable) {
            let Some(&id) = lookup.get(&fd) else {
                warn!(fd, "Probe reported an unknown descriptor");
                continue;
            };
            ready.discard_readable(fd);
            ready.discard_writable(fd);
            METRICS.error_event();
            warn!(conn_id = %id, fd, "Descriptor in error, reconnecting");
            self.trigger_reconnect(id);
        }

        for fd in std::mem::take(&mut ready.writable) {
            let Some(&id) = lookup.get(&fd) else {
                warn!(fd, "Probe reported an unknown descriptor");
                continue;
            };
            let Some(registration) = self.registrations.get_mut(&id) else {
                continue;
            };
            match registration.connection.write_once() {
                Ok(written) => METRICS.write(written as u64),
                Err(e) => {
                    METRICS.write_failed();
                    self.report(id, &format!("Couldn't write to socket: {}", e));
                    ready.discard_readable(fd);
                    self.trigger_reconnect(id);
                }
            }
        }

        for fd in std::mem::take(&mut ready.readable) {
            let Some(&id) = lookup.get(&fd) else {
                warn!(fd, "Probe reported an unknown descriptor");
                continue;
            };
            let Some(registration) = self.registrations.get_mut(&id) else {
                continue;
            };
            match registration.connection.read_once() {
                Ok(read) => METRICS.read(read as u64),
                Err(e) => {
                    METRICS.read_failed();
                    self.report(id, &format!("Couldn't read from socket: {}", e));
                    self.trigger_reconnect(id);
                }
            }
        }

        Ok(())
    }

    fn trigger_reconnect(&mut self, id: ConnectionId) {
        if let Some(registration) = self.registrations.get_mut(&id) {
            METRICS.reconnect_triggered();
            registration.connection.reconnect();
        }
    }

    fn report(&self, id: ConnectionId, message: &str) {
        error!(conn_id = %id, "{}", message);
        self.notifier.error_message(message);
    }
}
