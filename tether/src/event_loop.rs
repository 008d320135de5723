//! Boundary contract with the event loop.
//!
//! The engine never owns the loop. Every engine operation that may change
//! registrations borrows it as `&mut impl EventLoop`, and the loop hands
//! readiness and timer expiry back as [`LoopEvent`] values passed to
//! [`Engine::dispatch`](crate::Engine::dispatch).

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use crate::interest::{Interest, Readiness};

/// Identifies one descriptor registration with the event loop.
///
/// A new key is issued for every registration; keys of released
/// registrations must not be reused while events for them may still be
/// queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchKey(pub u64);

/// Identifies one armed one-shot timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey(pub u64);

/// Notification delivered by the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    /// A watched descriptor became ready.
    Ready {
        key: WatchKey,
        fd: RawFd,
        readiness: Readiness,
    },
    /// A one-shot timer expired. The registration is gone once delivered.
    Timer(TimerKey),
}

/// Registration surface of a single-threaded event loop.
pub trait EventLoop {
    /// Register interest in `fd`. The loop must not hold a second
    /// registration for the same descriptor; callers release the previous
    /// one first.
    fn watch(&mut self, fd: RawFd, interest: Interest) -> io::Result<WatchKey>;

    /// Release a registration. Unknown keys are ignored.
    fn unwatch(&mut self, key: WatchKey, fd: RawFd);

    /// Arm a one-shot timer firing after `delay`. Zero fires on the next
    /// loop iteration.
    fn arm_timer(&mut self, delay: Duration) -> TimerKey;

    /// Disarm a timer. Unknown or already fired keys are ignored.
    fn cancel_timer(&mut self, key: TimerKey);
}
