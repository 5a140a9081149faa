//! Reactor error types

use std::io;
use thiserror::Error;

/// Failures `Reactor::tick` cannot recover from locally
#[derive(Error, Debug)]
pub enum ReactorError {
    /// The shared readiness probe failed while several connections took part,
    /// so the failing descriptor cannot be identified.
    #[error("readiness probe failed across {participants} connections: {source}")]
    UnattributedProbe {
        participants: usize,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ReactorError>;
