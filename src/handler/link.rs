//! Handler/connection mailbox
//!
//! A `Link` is shared between a [`StreamHandler`](super::StreamHandler) and
//! the connection it built. The connection pushes transport events in and
//! drains outbound bytes; the handler does the opposite on each tick.

use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

/// Transport event delivered to the handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Transport (and TLS, if any) is up
    Established,
    /// Bytes received from the peer
    Data(Bytes),
    /// Transport dropped or was stopped
    Closed,
}

#[derive(Debug, Default)]
struct LinkState {
    outbound: BytesMut,
    events: VecDeque<LinkEvent>,
}

/// Shared mailbox between one handler and one connection
#[derive(Debug, Clone, Default)]
pub struct Link {
    inner: Arc<Mutex<LinkState>>,
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the peer
    pub fn send(&self, data: &[u8]) {
        self.inner.lock().outbound.extend_from_slice(data);
    }

    /// Number of queued outbound bytes
    pub fn pending_outbound(&self) -> usize {
        self.inner.lock().outbound.len()
    }

    pub fn has_outbound(&self) -> bool {
        self.pending_outbound() > 0
    }

    /// Hand the queued bytes to `write`, consuming as many as it reports written
    pub(crate) fn write_outbound<F>(&self, write: F) -> io::Result<usize>
    where
        F: FnOnce(&[u8]) -> io::Result<usize>,
    {
        let mut state = self.inner.lock();
        if state.outbound.is_empty() {
            return Ok(0);
        }
        let written = write(&state.outbound)?;
        let queued = state.outbound.len();
        state.outbound.advance(written.min(queued));
        Ok(written)
    }

    /// Take every queued outbound byte
    #[cfg(test)]
    pub(crate) fn take_outbound(&self) -> Bytes {
        self.inner.lock().outbound.split().freeze()
    }

    /// Drop outbound bytes queued for a transport that no longer exists
    pub(crate) fn clear_outbound(&self) {
        self.inner.lock().outbound.clear();
    }

    pub(crate) fn push_event(&self, event: LinkEvent) {
        self.inner.lock().events.push_back(event);
    }

    /// Drain pending transport events in arrival order
    pub fn drain_events(&self) -> Vec<LinkEvent> {
        self.inner.lock().events.drain(..).collect()
    }
}
