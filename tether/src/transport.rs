//! Boundary contract with the multi-transfer engine.
//!
//! A transport owns sockets and protocol state, and feeds each transfer's
//! [`SinkHandle`] while the transfer is attached. It
//! never blocks: it is driven by [`drive_socket`](Transport::drive_socket)
//! and [`drive_timeout`](Transport::drive_timeout), and it reports what it
//! wants watched through [`Notification`]s buffered until the engine drains
//! them. Hooks fired from inside a drive call only push to that buffer.

use std::os::fd::RawFd;
use std::time::Duration;

use crate::config::{Config, SessionCacheConfig, TransferOptions};
use crate::error::Error;
use crate::interest::{Interest, Readiness};
use crate::sink::SinkHandle;
use crate::transfer::{TransferFailure, TransferToken};

/// Request from the transport to change event-loop registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// Watch `fd` for `interest`, replacing any previous interest.
    Watch { fd: RawFd, interest: Interest },
    /// Stop watching `fd`.
    Unwatch { fd: RawFd },
    /// Drive the transport after this delay regardless of socket activity.
    /// `None` means no timer is needed.
    Timeout(Option<Duration>),
}

/// Entry of the transport's finished queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    pub token: TransferToken,
    pub outcome: Result<(), TransferFailure>,
}

/// What a transport reports when a transfer is detached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detached {
    /// URL after redirects.
    pub effective_url: Option<String>,
    pub response_code: Option<u32>,
    /// Error buffer contents, when the transport keeps one.
    pub diagnostic: Option<String>,
}

/// A readiness-driven multi-transfer engine.
pub trait Transport {
    /// Per-transfer handle.
    type Handle;
    /// Session cache shared by every transfer.
    type Session;

    /// Allocate the transport and install its interest and timeout hooks.
    fn open(config: &Config) -> Result<Self, Error>
    where
        Self: Sized;

    /// Allocate the shared session cache.
    fn open_session(&mut self, config: &SessionCacheConfig) -> Result<Self::Session, Error>;

    /// Configure and attach a transfer. `token` must be reported back in
    /// [`Finished`] for this transfer. Body chunks go to `sink`; completion is
    /// delivered by the engine. On error nothing is attached.
    fn add(
        &mut self,
        token: TransferToken,
        url: &str,
        options: &TransferOptions,
        session: &Self::Session,
        sink: SinkHandle,
    ) -> Result<Self::Handle, Error>;

    /// Feed readiness of `fd`. Returns the number of transfers still running.
    fn drive_socket(&mut self, fd: RawFd, readiness: Readiness) -> Result<usize, Error>;

    /// Feed a timeout expiry. Returns the number of transfers still running.
    fn drive_timeout(&mut self) -> Result<usize, Error>;

    /// Move buffered notifications into `out`, oldest first.
    fn drain_notifications(&mut self, out: &mut Vec<Notification>);

    /// Move finished transfers into `out`.
    fn drain_finished(&mut self, out: &mut Vec<Finished>);

    /// Detach a transfer and release its handle. The handle is consumed even
    /// on error.
    fn remove(&mut self, handle: Self::Handle) -> Result<Detached, Error>;

    /// Release the transport, then the session cache.
    fn close(self, session: Self::Session) -> Result<(), Error>
    where
        Self: Sized;
}
