//! Readiness probe
//!
//! One zero-timeout readiness check across the interest sets of a pass.

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::io;
use std::os::fd::BorrowedFd;
use std::os::unix::io::RawFd;

use crate::connection::Interest;

/// Descriptors each interest category wants probed this pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestSets {
    pub readable: Vec<RawFd>,
    pub writable: Vec<RawFd>,
    pub errorable: Vec<RawFd>,
}

impl InterestSets {
    /// Place `fd` in every set `interest` asks for
    pub fn insert(&mut self, fd: RawFd, interest: Interest) {
        if interest.readable && !self.readable.contains(&fd) {
            self.readable.push(fd);
        }
        if interest.writable && !self.writable.contains(&fd) {
            self.writable.push(fd);
        }
        if interest.errorable && !self.errorable.contains(&fd) {
            self.errorable.push(fd);
        }
    }

    /// Nothing to read or write; only error interest (or none) declared
    pub fn is_idle(&self) -> bool {
        self.readable.is_empty() && self.writable.is_empty()
    }

    /// Distinct descriptors taking part, in first-seen order
    pub fn participants(&self) -> Vec<RawFd> {
        let mut seen = Vec::new();
        for &fd in self.readable.iter().chain(&self.writable).chain(&self.errorable) {
            if !seen.contains(&fd) {
                seen.push(fd);
            }
        }
        seen
    }
}

/// Probe results for one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: Vec<RawFd>,
    pub writable: Vec<RawFd>,
    pub errorable: Vec<RawFd>,
}

impl Readiness {
    pub fn new(readable: Vec<RawFd>, writable: Vec<RawFd>, errorable: Vec<RawFd>) -> Self {
        Self {
            readable,
            writable,
            errorable,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.readable.is_empty() && self.writable.is_empty() && self.errorable.is_empty()
    }

    pub(crate) fn discard_readable(&mut self, fd: RawFd) {
        self.readable.retain(|&r| r != fd);
    }

    pub(crate) fn discard_writable(&mut self, fd: RawFd) {
        self.writable.retain(|&w| w != fd);
    }
}

impl From<&InterestSets> for Readiness {
    /// Every requested read and write is ready; no descriptor is in error
    fn from(interest: &InterestSets) -> Self {
        Self {
            readable: interest.readable.clone(),
            writable: interest.writable.clone(),
            errorable: Vec::new(),
        }
    }
}

/// Non-blocking readiness check across all interest sets
pub trait ReadinessProbe {
    /// Probe once with a zero timeout
    fn probe(&mut self, interest: &InterestSets) -> io::Result<Readiness>;
}

impl<P: ReadinessProbe + ?Sized> ReadinessProbe for Box<P> {
    fn probe(&mut self, interest: &InterestSets) -> io::Result<Readiness> {
        (**self).probe(interest)
    }
}

/// `poll(2)` backed probe
///
/// An invalid descriptor anywhere in the set fails the whole probe with
/// `EBADF`, the same aggregate failure `select(2)` reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct PollProbe;

impl ReadinessProbe for PollProbe {
    fn probe(&mut self, interest: &InterestSets) -> io::Result<Readiness> {
        let fds = interest.participants();

        let mut pollfds: Vec<PollFd<'_>> = fds
            .iter()
            .map(|&fd| {
                let mut events = PollFlags::empty();
                if interest.readable.contains(&fd) {
                    events |= PollFlags::POLLIN;
                }
                if interest.writable.contains(&fd) {
                    events |= PollFlags::POLLOUT;
                }
                if interest.errorable.contains(&fd) {
                    events |= PollFlags::POLLPRI;
                }
                // SAFETY: every descriptor belongs to a connection the reactor
                // keeps alive for the duration of this call.
                PollFd::new(unsafe { BorrowedFd::borrow_raw(fd) }, events)
            })
            .collect();

        match poll(&mut pollfds, PollTimeout::ZERO) {
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(Readiness::default()),
            Err(e) => return Err(e.into()),
        }

        let mut ready = Readiness::default();
        for (&fd, pollfd) in fds.iter().zip(&pollfds) {
            let revents = pollfd.revents().unwrap_or_else(PollFlags::empty);

            if revents.contains(PollFlags::POLLNVAL) {
                return Err(io::Error::from_raw_os_error(libc::EBADF));
            }
            if revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP)
                && interest.readable.contains(&fd)
            {
                ready.readable.push(fd);
            }
            if revents.contains(PollFlags::POLLOUT) && interest.writable.contains(&fd) {
                ready.writable.push(fd);
            }
            if revents.intersects(PollFlags::POLLPRI | PollFlags::POLLERR) {
                ready.errorable.push(fd);
            }
        }

        Ok(ready)
    }
}
