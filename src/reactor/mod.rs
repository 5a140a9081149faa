//! Connection multiplexer
//!
//! The reactor holds every registered connection together with its factory
//! and, on each host-driven `tick()`, runs factory housekeeping followed by
//! exactly one non-blocking poll-and-dispatch pass.

mod dispatch;
mod notify;
mod probe;

pub use dispatch::Reactor;
pub use notify::{HostNotifier, LogNotifier};
pub use probe::{InterestSets, PollProbe, Readiness, ReadinessProbe};
