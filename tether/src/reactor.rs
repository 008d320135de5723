//! A mio-backed [`EventLoop`] for running an engine on the current thread.
//!
//! mio reports readiness edge-triggered. The transport expects to be told
//! again about a descriptor that is still readable after a partial read, so
//! every registration that fired in one batch is re-registered at the start of
//! the next poll, which makes the kernel re-evaluate its readiness.

use std::io;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

use mio::unix::SourceFd;
use mio::{Events, Poll, Token};
use slab::Slab;
use tracing::trace;

use crate::engine::Engine;
use crate::error::Error;
use crate::event_loop::{EventLoop, LoopEvent, TimerKey, WatchKey};
use crate::interest::{Interest, Readiness};
use crate::transport::Transport;

const EVENT_CAPACITY: usize = 256;

struct Registration {
    fd: RawFd,
    interest: Interest,
    key: WatchKey,
}

/// Single-threaded poller with one-shot timers.
pub struct Reactor {
    poll: Poll,
    events: Events,
    /// Indexed by mio token.
    registrations: Slab<Registration>,
    timers: Vec<(TimerKey, Instant)>,
    /// Tokens to re-register before the next poll.
    rearm: Vec<usize>,
    next_key: u64,
}

impl Reactor {
    pub fn new() -> io::Result<Self> {
        Ok(Reactor {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENT_CAPACITY),
            registrations: Slab::new(),
            timers: Vec::new(),
            rearm: Vec::new(),
            next_key: 0,
        })
    }

    /// Wait for readiness or timer expiry and append the resulting events to
    /// `out`. `timeout` caps the wait; armed timers shorten it.
    pub fn poll(&mut self, out: &mut Vec<LoopEvent>, timeout: Option<Duration>) -> io::Result<()> {
        self.rearm_fired()?;

        let now = Instant::now();
        let until_timer = self
            .timers
            .iter()
            .map(|(_, deadline)| deadline.saturating_duration_since(now))
            .min();
        let wait = match (timeout, until_timer) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        match self.poll.poll(&mut self.events, wait) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }

        for event in self.events.iter() {
            let Token(index) = event.token();
            let Some(reg) = self.registrations.get(index) else {
                continue;
            };
            let readiness = Readiness {
                readable: event.is_readable() || event.is_read_closed(),
                writable: event.is_writable() || event.is_write_closed(),
                error: event.is_error(),
            };
            out.push(LoopEvent::Ready {
                key: reg.key,
                fd: reg.fd,
                readiness,
            });
            self.rearm.push(index);
        }

        let now = Instant::now();
        self.timers.retain(|&(key, deadline)| {
            if deadline <= now {
                out.push(LoopEvent::Timer(key));
                false
            } else {
                true
            }
        });
        Ok(())
    }

    /// Whether nothing is registered: a poll without a timeout would block
    /// forever.
    pub fn is_idle(&self) -> bool {
        self.registrations.is_empty() && self.timers.is_empty()
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    fn rearm_fired(&mut self) -> io::Result<()> {
        for index in self.rearm.drain(..) {
            let Some(reg) = self.registrations.get(index) else {
                continue;
            };
            self.poll.registry().reregister(
                &mut SourceFd(&reg.fd),
                Token(index),
                mio_interest(reg.interest),
            )?;
        }
        Ok(())
    }

    fn next_key(&mut self) -> u64 {
        self.next_key += 1;
        self.next_key
    }
}

impl EventLoop for Reactor {
    fn watch(&mut self, fd: RawFd, interest: Interest) -> io::Result<WatchKey> {
        let key = WatchKey(self.next_key());
        let entry = self.registrations.vacant_entry();
        let token = Token(entry.key());
        self.poll
            .registry()
            .register(&mut SourceFd(&fd), token, mio_interest(interest))?;
        entry.insert(Registration { fd, interest, key });
        trace!(fd, ?interest, token = token.0, "registered");
        Ok(key)
    }

    fn unwatch(&mut self, key: WatchKey, fd: RawFd) {
        let found = self
            .registrations
            .iter()
            .find(|(_, reg)| reg.key == key && reg.fd == fd)
            .map(|(index, _)| index);
        let Some(index) = found else {
            return;
        };
        self.registrations.remove(index);
        // The transport may already have closed the descriptor.
        if let Err(e) = self.poll.registry().deregister(&mut SourceFd(&fd)) {
            trace!(fd, error = %e, "deregister failed");
        }
    }

    fn arm_timer(&mut self, delay: Duration) -> TimerKey {
        let key = TimerKey(self.next_key());
        self.timers.push((key, Instant::now() + delay));
        key
    }

    fn cancel_timer(&mut self, key: TimerKey) {
        self.timers.retain(|(k, _)| *k != key);
    }
}

fn mio_interest(interest: Interest) -> mio::Interest {
    match interest {
        Interest::Readable => mio::Interest::READABLE,
        Interest::Writable => mio::Interest::WRITABLE,
        Interest::Both => mio::Interest::READABLE.add(mio::Interest::WRITABLE),
    }
}

/// Poll and dispatch until the engine has no transfers left.
///
/// Transfer failures are reported through the sinks; an error here means the
/// loop or the transport itself failed.
pub fn run_until_idle<T: Transport>(
    reactor: &mut Reactor,
    engine: &mut Engine<T>,
) -> Result<(), Error> {
    let mut events = Vec::new();
    while engine.active_count() > 0 {
        if reactor.is_idle() {
            return Err(Error::internal(
                "run_until_idle",
                format!(
                    "{} transfers active with nothing registered",
                    engine.active_count()
                ),
            ));
        }
        reactor.poll(&mut events, None)?;
        for event in events.drain(..) {
            engine.dispatch(reactor, event)?;
        }
    }
    Ok(())
}
