//! Descriptor → socket watcher table.

use std::collections::HashMap;
use std::os::fd::RawFd;

use tracing::{debug, trace};

use crate::error::Error;
use crate::event_loop::{EventLoop, WatchKey};
use crate::interest::Interest;
use crate::metrics;

/// One live event-loop registration on behalf of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SocketWatcher {
    pub(crate) fd: RawFd,
    pub(crate) interest: Interest,
    pub(crate) registration: WatchKey,
}

/// Socket watchers keyed by descriptor.
///
/// Watchers are created, changed and removed only in reaction to transport
/// notifications. Each watcher holds exactly one loop registration.
#[derive(Default)]
pub(crate) struct WatcherTable {
    watchers: HashMap<RawFd, SocketWatcher>,
}

impl WatcherTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Watch `fd` for `interest`. An existing watcher with another interest
    /// has its registration released before the new one is made.
    pub(crate) fn watch<L: EventLoop>(
        &mut self,
        ev: &mut L,
        fd: RawFd,
        interest: Interest,
    ) -> Result<(), Error> {
        if let Some(existing) = self.watchers.get(&fd).copied() {
            if existing.interest == interest {
                trace!(fd, ?interest, "interest unchanged");
                return Ok(());
            }
            debug!(fd, from = ?existing.interest, to = ?interest, "changing socket interest");
            ev.unwatch(existing.registration, fd);
            return match ev.watch(fd, interest) {
                Ok(registration) => {
                    self.watchers.insert(
                        fd,
                        SocketWatcher {
                            fd,
                            interest,
                            registration,
                        },
                    );
                    Ok(())
                }
                Err(e) => {
                    // Old registration is gone; do not keep a watcher without one.
                    self.watchers.remove(&fd);
                    metrics::SOCKETS_WATCHED.decrement();
                    Err(e.into())
                }
            };
        }

        debug!(fd, ?interest, "watching socket");
        let registration = ev.watch(fd, interest)?;
        self.watchers.insert(
            fd,
            SocketWatcher {
                fd,
                interest,
                registration,
            },
        );
        metrics::SOCKETS_WATCHED.increment();
        Ok(())
    }

    /// Stop watching `fd`. Returns false when there was no watcher.
    pub(crate) fn unwatch<L: EventLoop>(&mut self, ev: &mut L, fd: RawFd) -> bool {
        match self.watchers.remove(&fd) {
            Some(watcher) => {
                debug!(fd, "unwatching socket");
                ev.unwatch(watcher.registration, watcher.fd);
                metrics::SOCKETS_WATCHED.decrement();
                true
            }
            None => {
                trace!(fd, "unwatch for unknown socket");
                false
            }
        }
    }

    /// Whether `key` is the live registration for `fd`.
    pub(crate) fn is_current(&self, fd: RawFd, key: WatchKey) -> bool {
        self.watchers
            .get(&fd)
            .is_some_and(|w| w.registration == key)
    }

    pub(crate) fn get(&self, fd: RawFd) -> Option<&SocketWatcher> {
        self.watchers.get(&fd)
    }

    /// Release every registration.
    pub(crate) fn clear<L: EventLoop>(&mut self, ev: &mut L) {
        for (fd, watcher) in self.watchers.drain() {
            ev.unwatch(watcher.registration, fd);
            metrics::SOCKETS_WATCHED.decrement();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.watchers.len()
    }
}
