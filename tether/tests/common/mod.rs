//! Scripted transport and virtual-clock event loop shared by the engine tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

use tether::{
    Config, ConfigBuilder, Detached, Engine, Error, EventLoop, FailureKind, Finished, Interest,
    LoopEvent, Notification, Readiness, SessionCacheConfig, SinkHandle, StreamSink, TimerKey,
    TransferFailure,
    TransferOptions, TransferStatus, TransferToken, Transport, WatchKey,
};

// ── Clock ───────────────────────────────────────────────────────────

/// Virtual time shared by the fake transport and the fake loop.
#[derive(Clone, Default)]
pub struct Clock(Rc<Cell<Duration>>);

impl Clock {
    pub fn now(&self) -> Duration {
        self.0.get()
    }

    pub fn advance(&self, by: Duration) {
        self.0.set(self.0.get() + by);
    }
}

// ── Transport ───────────────────────────────────────────────────────

/// How the fake server behaves for a URL.
#[derive(Clone)]
pub enum Plan {
    /// Accept the connection and send these chunks, one per readable drive.
    Respond(Vec<&'static str>),
    /// Never connect; the transfer times out after the connect timeout.
    Unreachable,
}

/// Knobs and observations shared with the test body after the transport has
/// moved into the engine.
#[derive(Default)]
pub struct Control {
    pub fail_drive: Cell<bool>,
    /// Drive normally, then report an internal error anyway.
    pub fail_after_drive: Cell<bool>,
    /// Release the transfer on `remove` but report an internal error.
    pub fail_remove: Cell<bool>,
    pub session_open: Cell<bool>,
    pub closed: Cell<bool>,
    /// Handles still attached when the transport was closed.
    pub attached_at_close: Cell<usize>,
    pub removed: Cell<usize>,
    /// Descriptors that never become ready.
    pub blackholed: RefCell<HashSet<RawFd>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connecting,
    Reading,
    Done,
}

struct FakeTransfer {
    token: TransferToken,
    url: String,
    phase: Phase,
    chunks: VecDeque<&'static str>,
    sink: SinkHandle,
    deadline: Option<Duration>,
    outcome: Option<Result<(), TransferFailure>>,
}

pub struct FakeHandle(RawFd);

pub struct FakeSession;

pub struct FakeTransport {
    clock: Clock,
    control: Rc<Control>,
    plans: HashMap<String, Plan>,
    next_fd: RawFd,
    transfers: HashMap<RawFd, FakeTransfer>,
    notifications: Vec<Notification>,
    finished: Vec<Finished>,
}

impl FakeTransport {
    pub fn new(clock: Clock) -> Self {
        FakeTransport {
            clock,
            control: Rc::new(Control::default()),
            plans: HashMap::new(),
            next_fd: 100,
            transfers: HashMap::new(),
            notifications: Vec::new(),
            finished: Vec::new(),
        }
    }

    pub fn plan(mut self, url: &str, plan: Plan) -> Self {
        self.plans.insert(url.to_string(), plan);
        self
    }

    pub fn control(&self) -> Rc<Control> {
        Rc::clone(&self.control)
    }

    fn running(&self) -> usize {
        self.transfers
            .values()
            .filter(|t| t.phase != Phase::Done)
            .count()
    }

    fn check_fault(&self) -> Result<(), Error> {
        if self.control.fail_drive.get() {
            return Err(Error::internal("fake", "injected drive failure"));
        }
        Ok(())
    }

    fn drive_result(&self) -> Result<usize, Error> {
        if self.control.fail_after_drive.get() {
            return Err(Error::internal("fake", "injected failure after drive"));
        }
        Ok(self.running())
    }
}

fn finish(
    fd: RawFd,
    transfer: &mut FakeTransfer,
    outcome: Result<(), TransferFailure>,
    notifications: &mut Vec<Notification>,
    finished: &mut Vec<Finished>,
) {
    transfer.phase = Phase::Done;
    transfer.outcome = Some(outcome.clone());
    notifications.push(Notification::Unwatch { fd });
    finished.push(Finished {
        token: transfer.token,
        outcome,
    });
}

impl Transport for FakeTransport {
    type Handle = FakeHandle;
    type Session = FakeSession;

    fn open(_config: &Config) -> Result<Self, Error> {
        Ok(FakeTransport::new(Clock::default()))
    }

    fn open_session(&mut self, _config: &SessionCacheConfig) -> Result<FakeSession, Error> {
        self.control.session_open.set(true);
        Ok(FakeSession)
    }

    fn add(
        &mut self,
        token: TransferToken,
        url: &str,
        options: &TransferOptions,
        _session: &FakeSession,
        sink: SinkHandle,
    ) -> Result<FakeHandle, Error> {
        if url.starts_with("reject:") {
            return Err(Error::Rejected(format!("unsupported scheme in {url}")));
        }
        let fd = self.next_fd;
        self.next_fd += 1;

        let plan = self
            .plans
            .get(url)
            .cloned()
            .unwrap_or(Plan::Respond(Vec::new()));
        let (chunks, deadline) = match plan {
            Plan::Respond(chunks) => (chunks.into_iter().collect(), None),
            Plan::Unreachable => {
                self.control.blackholed.borrow_mut().insert(fd);
                (VecDeque::new(), Some(self.clock.now() + options.connect_timeout))
            }
        };
        self.transfers.insert(
            fd,
            FakeTransfer {
                token,
                url: url.to_string(),
                phase: Phase::Connecting,
                chunks,
                sink,
                deadline,
                outcome: None,
            },
        );
        self.notifications.push(Notification::Watch {
            fd,
            interest: Interest::Writable,
        });
        self.notifications
            .push(Notification::Timeout(Some(Duration::ZERO)));
        Ok(FakeHandle(fd))
    }

    fn drive_socket(&mut self, fd: RawFd, readiness: Readiness) -> Result<usize, Error> {
        self.check_fault()?;
        if let Some(t) = self.transfers.get_mut(&fd) {
            match t.phase {
                Phase::Connecting if readiness.writable => {
                    t.phase = Phase::Reading;
                    self.notifications.push(Notification::Watch {
                        fd,
                        interest: Interest::Readable,
                    });
                }
                Phase::Reading if readiness.readable => match t.chunks.pop_front() {
                    Some(chunk) => {
                        let consumed = t.sink.on_data(chunk.as_bytes());
                        if consumed < chunk.len() {
                            let failure = TransferFailure::new(
                                FailureKind::Aborted,
                                "failure writing output to destination",
                            );
                            finish(fd, t, Err(failure), &mut self.notifications, &mut self.finished);
                        } else if t.chunks.is_empty() {
                            finish(fd, t, Ok(()), &mut self.notifications, &mut self.finished);
                        }
                    }
                    None => finish(fd, t, Ok(()), &mut self.notifications, &mut self.finished),
                },
                _ => {}
            }
        }
        self.drive_result()
    }

    fn drive_timeout(&mut self) -> Result<usize, Error> {
        self.check_fault()?;
        let now = self.clock.now();
        for (&fd, t) in self.transfers.iter_mut() {
            if t.phase != Phase::Done && t.deadline.is_some_and(|d| d <= now) {
                let failure = TransferFailure::new(
                    FailureKind::TimedOut,
                    format!("connection timed out after {} ms", now.as_millis()),
                );
                finish(fd, t, Err(failure), &mut self.notifications, &mut self.finished);
            }
        }
        let next = self
            .transfers
            .values()
            .filter(|t| t.phase != Phase::Done)
            .filter_map(|t| t.deadline)
            .min()
            .map(|d| d.saturating_sub(now));
        self.notifications.push(Notification::Timeout(next));
        self.drive_result()
    }

    fn drain_notifications(&mut self, out: &mut Vec<Notification>) {
        out.append(&mut self.notifications);
    }

    fn drain_finished(&mut self, out: &mut Vec<Finished>) {
        out.append(&mut self.finished);
    }

    fn remove(&mut self, handle: FakeHandle) -> Result<Detached, Error> {
        let fd = handle.0;
        let t = self
            .transfers
            .remove(&fd)
            .ok_or_else(|| Error::internal("remove", format!("unknown handle {fd}")))?;
        if t.phase != Phase::Done {
            self.notifications.push(Notification::Unwatch { fd });
        }
        self.control.removed.set(self.control.removed.get() + 1);
        if self.control.fail_remove.get() {
            return Err(Error::internal("remove", format!("detach of {fd} failed")));
        }

        let mut detached = Detached {
            effective_url: Some(t.url),
            ..Detached::default()
        };
        match t.outcome {
            Some(Ok(())) => detached.response_code = Some(200),
            Some(Err(failure)) => detached.diagnostic = Some(failure.diagnostic),
            None => {}
        }
        Ok(detached)
    }

    fn close(self, _session: FakeSession) -> Result<(), Error> {
        self.control.attached_at_close.set(self.transfers.len());
        self.control.closed.set(true);
        Ok(())
    }
}

// ── Event loop ──────────────────────────────────────────────────────

/// Event loop that never blocks: readiness is produced on request and
/// timers fire when the clock is advanced past them.
pub struct FakeLoop {
    pub clock: Clock,
    next_key: u64,
    pub live: HashMap<WatchKey, (RawFd, Interest)>,
    /// Deadlines on the virtual clock.
    pub timers: HashMap<TimerKey, Duration>,
    pub max_timers: usize,
    pub fail_watch: bool,
}

impl FakeLoop {
    pub fn new(clock: Clock) -> Self {
        FakeLoop {
            clock,
            next_key: 0,
            live: HashMap::new(),
            timers: HashMap::new(),
            max_timers: 0,
            fail_watch: false,
        }
    }

    pub fn registration(&self, fd: RawFd) -> Option<(WatchKey, Interest)> {
        self.live
            .iter()
            .find(|(_, (f, _))| *f == fd)
            .map(|(key, (_, interest))| (*key, *interest))
    }

    /// Readiness event for the live registration of `fd`.
    pub fn ready(&self, fd: RawFd) -> Option<LoopEvent> {
        self.registration(fd).map(|(key, interest)| LoopEvent::Ready {
            key,
            fd,
            readiness: Readiness::from_interest(interest),
        })
    }

    /// Readiness for every registration that is not blackholed, in
    /// registration order.
    pub fn ready_events(&self, control: &Control) -> Vec<LoopEvent> {
        let blackholed = control.blackholed.borrow();
        let mut keys: Vec<_> = self
            .live
            .iter()
            .filter(|(_, (fd, _))| !blackholed.contains(fd))
            .map(|(key, _)| *key)
            .collect();
        keys.sort_by_key(|k| k.0);
        keys.into_iter()
            .map(|key| {
                let (fd, interest) = self.live[&key];
                LoopEvent::Ready {
                    key,
                    fd,
                    readiness: Readiness::from_interest(interest),
                }
            })
            .collect()
    }

    /// Move the clock forward and collect the timers that expired.
    pub fn advance(&mut self, by: Duration) -> Vec<LoopEvent> {
        self.clock.advance(by);
        let now = self.clock.now();
        let mut expired: Vec<_> = self
            .timers
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| *key)
            .collect();
        expired.sort_by_key(|k| k.0);
        for key in &expired {
            self.timers.remove(key);
        }
        expired.into_iter().map(LoopEvent::Timer).collect()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.values().min().copied()
    }
}

impl EventLoop for FakeLoop {
    fn watch(&mut self, fd: RawFd, interest: Interest) -> io::Result<WatchKey> {
        if self.fail_watch {
            return Err(io::Error::other("watch refused"));
        }
        assert!(
            self.registration(fd).is_none(),
            "fd {fd} registered twice"
        );
        self.next_key += 1;
        let key = WatchKey(self.next_key);
        self.live.insert(key, (fd, interest));
        Ok(key)
    }

    fn unwatch(&mut self, key: WatchKey, _fd: RawFd) {
        self.live.remove(&key);
    }

    fn arm_timer(&mut self, delay: Duration) -> TimerKey {
        self.next_key += 1;
        let key = TimerKey(self.next_key);
        self.timers.insert(key, self.clock.now() + delay);
        self.max_timers = self.max_timers.max(self.timers.len());
        key
    }

    fn cancel_timer(&mut self, key: TimerKey) {
        self.timers.remove(&key);
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

pub fn test_config() -> Config {
    ConfigBuilder::new()
        .connect_timeout(Duration::from_secs(30))
        .build()
        .unwrap()
}

/// Engine over a scripted transport plus a loop sharing its clock.
pub fn setup(transport: FakeTransport) -> (Engine<FakeTransport>, FakeLoop, Rc<Control>) {
    setup_with(transport, test_config())
}

pub fn setup_with(
    transport: FakeTransport,
    config: Config,
) -> (Engine<FakeTransport>, FakeLoop, Rc<Control>) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let ev = FakeLoop::new(transport.clock.clone());
    let control = transport.control();
    let engine = Engine::with_transport(transport, config).unwrap();
    (engine, ev, control)
}

/// Dispatch due timers and every ready socket until no transfer is left,
/// jumping the clock to the next timer whenever nothing is ready.
pub fn run_to_idle(engine: &mut Engine<FakeTransport>, ev: &mut FakeLoop, control: &Control) {
    for _ in 0..10_000 {
        if engine.active_count() == 0 {
            return;
        }
        let mut events = ev.advance(Duration::ZERO);
        events.extend(ev.ready_events(control));
        if events.is_empty() {
            let deadline = ev.next_deadline().unwrap_or_else(|| {
                panic!("stalled with {} active transfers", engine.active_count())
            });
            let wait = deadline.saturating_sub(ev.clock.now());
            events = ev.advance(wait);
        }
        for event in events {
            engine.dispatch(ev, event).unwrap();
        }
    }
    panic!("engine did not go idle");
}

/// Sink recording every chunk and the completion it receives.
#[derive(Clone, Default)]
pub struct Recorder {
    pub chunks: Rc<RefCell<Vec<Vec<u8>>>>,
    pub completions: Rc<RefCell<Vec<TransferStatus>>>,
    pub dropped: Rc<Cell<bool>>,
    /// Bytes to accept per chunk; `None` accepts everything.
    pub accept: Option<usize>,
}

impl Recorder {
    pub fn accepting(n: usize) -> Self {
        Recorder {
            accept: Some(n),
            ..Recorder::default()
        }
    }

    pub fn sink(&self) -> RecorderSink {
        RecorderSink(self.clone())
    }

    pub fn body(&self) -> Vec<u8> {
        self.chunks.borrow().concat()
    }

    pub fn status(&self) -> Option<TransferStatus> {
        self.completions.borrow().last().cloned()
    }
}

pub struct RecorderSink(Recorder);

impl StreamSink for RecorderSink {
    fn on_data(&mut self, chunk: &[u8]) -> usize {
        let n = self.0.accept.map_or(chunk.len(), |a| a.min(chunk.len()));
        self.0.chunks.borrow_mut().push(chunk[..n].to_vec());
        n
    }

    fn on_complete(&mut self, status: &TransferStatus) {
        self.0.completions.borrow_mut().push(status.clone());
    }
}

impl Drop for RecorderSink {
    fn drop(&mut self) {
        self.0.dropped.set(true);
    }
}
