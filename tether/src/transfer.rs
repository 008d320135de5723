//! Per-transfer state.

use std::fmt;
use std::time::Instant;

use thiserror::Error;

use crate::sink::SinkHandle;

/// Opaque handle for a submitted transfer.
///
/// Tokens are slab indices and are reused once a transfer has been reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferToken(pub usize);

/// Broad classification of a transfer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Host name could not be resolved.
    Resolve,
    /// TCP connect failed or was refused.
    Connect,
    /// TLS handshake or certificate verification failed.
    Tls,
    /// Connect timeout or minimum-throughput guard tripped.
    TimedOut,
    /// The sink consumed fewer bytes than it was given.
    Aborted,
    /// Redirect limit exceeded.
    TooManyRedirects,
    /// Malformed or truncated response.
    Protocol,
    /// Anything else.
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Resolve => "resolve",
            FailureKind::Connect => "connect",
            FailureKind::Tls => "tls",
            FailureKind::TimedOut => "timed out",
            FailureKind::Aborted => "aborted by sink",
            FailureKind::TooManyRedirects => "too many redirects",
            FailureKind::Protocol => "protocol",
            FailureKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// Why a transfer did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {diagnostic}")]
pub struct TransferFailure {
    pub kind: FailureKind,
    /// Transport-supplied diagnostic text.
    pub diagnostic: String,
}

impl TransferFailure {
    pub fn new(kind: FailureKind, diagnostic: impl Into<String>) -> Self {
        Self {
            kind,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Final outcome of a transfer, delivered to
/// [`StreamSink::on_complete`](crate::StreamSink::on_complete).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    /// The response was received in full.
    Completed {
        /// HTTP status code, when the transport reports one.
        response_code: Option<u32>,
    },
    /// The transfer ended early.
    Failed(TransferFailure),
}

impl TransferStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferStatus::Completed { .. })
    }

    pub fn failure(&self) -> Option<&TransferFailure> {
        match self {
            TransferStatus::Failed(f) => Some(f),
            TransferStatus::Completed { .. } => None,
        }
    }
}

/// Lifecycle of a transfer. Transitions happen only inside drive and reap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    /// Added to the transport; no drive call has run since.
    Submitted,
    /// The transport has been driven at least once with this transfer attached.
    Active,
    /// Reaped with the given status. The context is freed right after.
    Finished(TransferStatus),
}

/// Engine-side record of one transfer.
pub(crate) struct TransferContext<H> {
    pub(crate) url: String,
    /// Engine's end of the sink; receives the completion.
    pub(crate) sink: SinkHandle,
    /// Transport handle. Taken exactly once, when the transfer is detached.
    pub(crate) handle: Option<H>,
    pub(crate) state: TransferState,
    /// Diagnostic text captured at reap time.
    pub(crate) error: Option<String>,
    pub(crate) submitted_at: Instant,
}

impl<H> TransferContext<H> {
    pub(crate) fn new(url: String, sink: SinkHandle, handle: H) -> Self {
        TransferContext {
            url,
            sink,
            handle: Some(handle),
            state: TransferState::Submitted,
            error: None,
            submitted_at: Instant::now(),
        }
    }

    /// Move `Submitted` to `Active`. Other states are left alone.
    pub(crate) fn activate(&mut self) {
        if self.state == TransferState::Submitted {
            self.state = TransferState::Active;
        }
    }

    pub(crate) fn finish(&mut self, status: TransferStatus) {
        if let TransferStatus::Failed(f) = &status {
            self.error = Some(f.diagnostic.clone());
        }
        self.state = TransferState::Finished(status);
    }
}
