//! Host notifications
//!
//! Human-readable status and error messages surfaced to the host UI layer.

use std::sync::Arc;
use tracing::{error, info};

/// Sink for messages meant for the user
pub trait HostNotifier {
    /// Short status line, e.g. "Disconnected."
    fn status_message(&self, message: &str);

    /// Recovered or fatal I/O failure
    fn error_message(&self, message: &str);
}

impl<N: HostNotifier + ?Sized> HostNotifier for Arc<N> {
    fn status_message(&self, message: &str) {
        (**self).status_message(message)
    }

    fn error_message(&self, message: &str) {
        (**self).error_message(message)
    }
}

/// Notifier for hosts without a UI; forwards everything to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl HostNotifier for LogNotifier {
    fn status_message(&self, message: &str) {
        info!(target: "collab_mux::host", "{}", message);
    }

    fn error_message(&self, message: &str) {
        error!(target: "collab_mux::host", "{}", message);
    }
}
