use std::io;

use thiserror::Error;

/// Errors returned by the tether engine.
///
/// Transfer-level failures (DNS, connect, TLS, timeouts, an aborting sink) are
/// not errors of the engine: they are reported per transfer through
/// [`TransferStatus`](crate::TransferStatus).
#[derive(Debug, Error)]
pub enum Error {
    /// The transport or its session cache could not be allocated.
    #[error("allocation failed: {0}")]
    Allocation(String),
    /// The transport did not accept a new transfer. The caller may retry later.
    #[error("transfer rejected: {0}")]
    Rejected(String),
    /// The transport reported an internal error (bad handle, bad socket,
    /// out of memory). Indicates a defect, not a network condition.
    #[error("internal transport error in {context}: {message}")]
    Internal {
        /// Operation that failed.
        context: &'static str,
        /// Transport-supplied description.
        message: String,
    },
    /// Event loop registration failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    Config(String),
    /// `destroy()` was called while transfers were still in flight.
    #[error("{0} transfers still active")]
    TransfersActive(usize),
    /// Transport or session cache teardown failed.
    #[error("teardown: {0}")]
    Teardown(String),
}

impl Error {
    /// Build an [`Error::Internal`] for the given operation.
    pub fn internal(context: &'static str, message: impl Into<String>) -> Self {
        Error::Internal {
            context,
            message: message.into(),
        }
    }

    /// Whether this error indicates a programming defect rather than a
    /// resource or network condition.
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Internal { .. })
    }
}
