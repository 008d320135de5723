//! Single-slot timer bridge.

use std::time::Duration;

use tracing::trace;

use crate::event_loop::{EventLoop, TimerKey};
use crate::metrics;

/// The one timer the transport may have outstanding.
#[derive(Default)]
pub(crate) struct TimerBridge {
    registration: Option<TimerKey>,
    delay: Option<Duration>,
}

impl TimerBridge {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arm for `delay`, cancelling the current registration first.
    pub(crate) fn arm<L: EventLoop>(&mut self, ev: &mut L, delay: Duration) {
        if let Some(old) = self.registration.take() {
            ev.cancel_timer(old);
        }
        trace!(delay_ms = delay.as_millis() as u64, "arming transport timer");
        self.registration = Some(ev.arm_timer(delay));
        self.delay = Some(delay);
        metrics::TIMERS_ARMED.increment();
    }

    /// Cancel the current registration, if any.
    pub(crate) fn cancel<L: EventLoop>(&mut self, ev: &mut L) {
        if let Some(old) = self.registration.take() {
            trace!("cancelling transport timer");
            ev.cancel_timer(old);
        }
        self.delay = None;
    }

    /// Accept a fired timer. Returns false for a key that is not the armed
    /// registration; the bridge is disarmed otherwise.
    pub(crate) fn fire(&mut self, key: TimerKey) -> bool {
        if self.registration == Some(key) {
            self.registration = None;
            self.delay = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.registration.is_some()
    }

    pub(crate) fn delay(&self) -> Option<Duration> {
        self.delay
    }
}
