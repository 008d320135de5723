//! The engine context: transfers, watchers and the timer around one transport.

use std::os::fd::RawFd;

use slab::Slab;
use tracing::{debug, error, trace, warn};

use crate::config::{Config, TransferOptions};
use crate::error::Error;
use crate::event_loop::{EventLoop, LoopEvent, TimerKey, WatchKey};
use crate::interest::{Interest, Readiness};
use crate::metrics;
use crate::sink::{MeteredSink, SinkHandle, StreamSink};
use crate::timer::TimerBridge;
use crate::transfer::{
    FailureKind, TransferContext, TransferFailure, TransferState, TransferStatus, TransferToken,
};
use crate::transport::{Detached, Finished, Notification, Transport};
use crate::watcher::WatcherTable;

/// Per-engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Transfers accepted by the transport (contexts created).
    pub submitted: u64,
    /// Submissions refused.
    pub rejected: u64,
    /// Transfers detached and freed.
    pub reaped: u64,
    /// Reaped with a complete response.
    pub completed: u64,
    /// Reaped with a failure.
    pub failed: u64,
    /// Drives triggered by socket readiness.
    pub socket_drives: u64,
    /// Drives triggered by the timer.
    pub timeout_drives: u64,
}

/// Runs many HTTP transfers on one event loop thread.
///
/// The engine owns the transport, its session cache, the table of live
/// transfers, the socket watchers and the transport timer. The event loop is
/// borrowed by every operation that can touch registrations.
///
/// # Example
///
/// ```rust,ignore
/// let mut reactor = Reactor::new()?;
/// let mut engine: Engine<CurlTransport> = Engine::create(Config::default())?;
///
/// let (sink, body) = BodyCollector::new();
/// engine.submit(&mut reactor, "https://example.com/", sink)?;
///
/// run_until_idle(&mut reactor, &mut engine)?;
/// println!("{:?}", body.status());
/// engine.destroy(&mut reactor)?;
/// ```
pub struct Engine<T: Transport> {
    // Field order is drop order: transfer handles go before the transport,
    // the transport before its session cache.
    transfers: Slab<TransferContext<T::Handle>>,
    watchers: WatcherTable,
    timer: TimerBridge,
    transport: T,
    session: T::Session,
    config: Config,
    options: TransferOptions,
    /// Transfer count last reported by the transport.
    running: usize,
    /// Submitted since the last drive.
    pending_activation: Vec<TransferToken>,
    notifications: Vec<Notification>,
    finished: Vec<Finished>,
    stats: EngineStats,
}

impl<T: Transport> Engine<T> {
    /// Open a transport and its session cache.
    pub fn create(config: Config) -> Result<Self, Error> {
        config.validate()?;
        let transport = T::open(&config)?;
        Self::with_transport(transport, config)
    }

    /// Build an engine around an already opened transport.
    pub fn with_transport(mut transport: T, config: Config) -> Result<Self, Error> {
        config.validate()?;
        let session = transport.open_session(&config.session_cache)?;
        debug!(
            max_transfers = config.max_transfers,
            connect_timeout_ms = config.connect_timeout.as_millis() as u64,
            "engine created"
        );
        Ok(Engine {
            transfers: Slab::new(),
            watchers: WatcherTable::new(),
            timer: TimerBridge::new(),
            transport,
            session,
            options: config.transfer_options(),
            config,
            running: 0,
            pending_activation: Vec::new(),
            notifications: Vec::new(),
            finished: Vec::new(),
            stats: EngineStats::default(),
        })
    }

    // ── Submission ───────────────────────────────────────────────────

    /// Start a GET of `url`, streaming the body into `sink`.
    ///
    /// Returns as soon as the transfer is attached; all I/O happens in later
    /// [`dispatch`](Self::dispatch) calls. On error the sink is dropped
    /// without a completion notification.
    pub fn submit<L, S>(&mut self, ev: &mut L, url: &str, sink: S) -> Result<TransferToken, Error>
    where
        L: EventLoop,
        S: StreamSink + 'static,
    {
        if url.is_empty() {
            return Err(self.rejected(url, "empty url".into()));
        }
        if self.transfers.len() >= self.config.max_transfers {
            return Err(self.rejected(url, "transfer limit reached".into()));
        }

        let entry = self.transfers.vacant_entry();
        let token = TransferToken(entry.key());
        let sink = SinkHandle::new(MeteredSink::boxed(Box::new(sink)));
        match self
            .transport
            .add(token, url, &self.options, &self.session, sink.clone())
        {
            Ok(handle) => {
                entry.insert(TransferContext::new(url.to_string(), sink, handle));
            }
            Err(e) => {
                self.stats.rejected += 1;
                metrics::TRANSFERS_REJECTED.increment();
                warn!(url, error = %e, "transport refused transfer");
                return Err(e);
            }
        }

        self.pending_activation.push(token);
        self.stats.submitted += 1;
        metrics::TRANSFERS_SUBMITTED.increment();
        metrics::TRANSFERS_ACTIVE.increment();
        debug!(token = token.0, url, active = self.transfers.len(), "transfer submitted");

        // The transfer is attached at this point; a registration failure here
        // surfaces as a stalled transfer that the transport times out.
        if let Err(e) = self.apply_notifications(ev) {
            warn!(token = token.0, error = %e, "failed to apply registrations after submit");
        }
        Ok(token)
    }

    fn rejected(&mut self, url: &str, reason: String) -> Error {
        self.stats.rejected += 1;
        metrics::TRANSFERS_REJECTED.increment();
        debug!(url, %reason, "submission rejected");
        Error::Rejected(reason)
    }

    // ── Event dispatch ───────────────────────────────────────────────

    /// Feed one event-loop notification to the transport.
    ///
    /// Only [`Error::Internal`] and [`Error::Io`] are returned; transfer
    /// failures are reported through the sinks.
    pub fn dispatch<L: EventLoop>(&mut self, ev: &mut L, event: LoopEvent) -> Result<(), Error> {
        match event {
            LoopEvent::Ready { key, fd, readiness } => self.on_socket_ready(ev, key, fd, readiness),
            LoopEvent::Timer(key) => self.on_timer(ev, key),
        }
    }

    /// A watched descriptor became ready.
    pub fn on_socket_ready<L: EventLoop>(
        &mut self,
        ev: &mut L,
        key: WatchKey,
        fd: RawFd,
        readiness: Readiness,
    ) -> Result<(), Error> {
        if !self.watchers.is_current(fd, key) {
            trace!(fd, ?key, "readiness for stale or unknown registration");
            return Ok(());
        }

        self.activate_submitted();
        self.stats.socket_drives += 1;
        metrics::SOCKET_DRIVES.increment();
        trace!(fd, ?readiness, "driving socket");

        let driven = internal_or(self.transport.drive_socket(fd, readiness), "drive_socket");
        self.after_drive(ev, driven)
    }

    /// A timer expired.
    pub fn on_timer<L: EventLoop>(&mut self, ev: &mut L, key: TimerKey) -> Result<(), Error> {
        if !self.timer.fire(key) {
            trace!(?key, "stale timer");
            return Ok(());
        }

        self.activate_submitted();
        self.stats.timeout_drives += 1;
        metrics::TIMEOUT_DRIVES.increment();
        trace!("driving timeout");

        let driven = internal_or(self.transport.drive_timeout(), "drive_timeout");
        self.after_drive(ev, driven)
    }

    /// Apply notifications and reap whatever finished, even when the drive
    /// itself failed. Returns the first error in that order.
    fn after_drive<L: EventLoop>(
        &mut self,
        ev: &mut L,
        driven: Result<usize, Error>,
    ) -> Result<(), Error> {
        let applied = self.apply_notifications(ev);
        let driven = driven.map(|running| self.running = running);
        let reaped = self.reap(ev);
        if driven.is_err() {
            // A failed drive reports no count; assume every live transfer runs.
            self.running = self.transfers.len();
        }
        if self.running == 0 && self.timer.is_armed() {
            debug!("last transfer done, cancelling timer");
            self.timer.cancel(ev);
        }
        driven.and(applied).and(reaped)
    }

    fn activate_submitted(&mut self) {
        for token in self.pending_activation.drain(..) {
            if let Some(ctx) = self.transfers.get_mut(token.0) {
                ctx.activate();
            }
        }
    }

    /// Apply buffered transport notifications to the loop. Every notification
    /// is applied; the first registration error is returned.
    fn apply_notifications<L: EventLoop>(&mut self, ev: &mut L) -> Result<(), Error> {
        self.transport.drain_notifications(&mut self.notifications);
        let mut first_err = None;
        for notification in self.notifications.drain(..) {
            let result = match notification {
                Notification::Watch { fd, interest } => self.watchers.watch(ev, fd, interest),
                Notification::Unwatch { fd } => {
                    self.watchers.unwatch(ev, fd);
                    Ok(())
                }
                Notification::Timeout(Some(delay)) => {
                    self.timer.arm(ev, delay);
                    Ok(())
                }
                Notification::Timeout(None) => {
                    self.timer.cancel(ev);
                    Ok(())
                }
            };
            if let Err(e) = result {
                warn!(?notification, error = %e, "event loop registration failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    // ── Completion scan ──────────────────────────────────────────────

    /// Detach and free every transfer the transport reports finished.
    fn reap<L: EventLoop>(&mut self, ev: &mut L) -> Result<(), Error> {
        self.transport.drain_finished(&mut self.finished);
        if self.finished.is_empty() {
            return Ok(());
        }

        let mut finished = std::mem::take(&mut self.finished);
        let mut first_err = None;
        for Finished { token, outcome } in finished.drain(..) {
            let Some(mut ctx) = self.transfers.try_remove(token.0) else {
                warn!(token = token.0, "finished transfer not found");
                continue;
            };
            self.stats.reaped += 1;
            metrics::TRANSFERS_ACTIVE.decrement();

            let removed = match ctx.handle.take() {
                Some(handle) => self.transport.remove(handle),
                None => Err(Error::internal("reap", "transfer handle already released")),
            };
            let (status, effective_url) = match removed {
                Ok(detached) => (final_status(outcome, &detached), detached.effective_url),
                Err(e) => {
                    error!(token = token.0, url = %ctx.url, error = %e, "failed to detach transfer");
                    let failure = TransferFailure::new(FailureKind::Other, e.to_string());
                    first_err.get_or_insert(e);
                    (TransferStatus::Failed(failure), None)
                }
            };
            ctx.finish(status.clone());
            self.record(token, &ctx, effective_url.as_deref(), &status);
            ctx.sink.complete(&status);
        }
        self.finished = finished;

        // Detaching may release sockets.
        let applied = self.apply_notifications(ev);
        first_err.map_or(applied, Err)
    }

    fn record(
        &mut self,
        token: TransferToken,
        ctx: &TransferContext<T::Handle>,
        effective_url: Option<&str>,
        status: &TransferStatus,
    ) {
        let elapsed_ms = ctx.submitted_at.elapsed().as_millis() as u64;
        let effective_url = effective_url.unwrap_or(&ctx.url);
        match status {
            TransferStatus::Completed { response_code } => {
                self.stats.completed += 1;
                metrics::TRANSFERS_COMPLETED.increment();
                debug!(
                    token = token.0,
                    url = %ctx.url,
                    effective_url,
                    response_code,
                    elapsed_ms,
                    remaining = self.transfers.len(),
                    "transfer completed"
                );
            }
            TransferStatus::Failed(failure) => {
                self.stats.failed += 1;
                metrics::TRANSFERS_FAILED.increment();
                debug!(
                    token = token.0,
                    url = %ctx.url,
                    effective_url,
                    kind = %failure.kind,
                    diagnostic = ctx.error.as_deref().unwrap_or(""),
                    elapsed_ms,
                    remaining = self.transfers.len(),
                    "transfer failed"
                );
            }
        }
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Release every registration, the transport and the session cache.
    ///
    /// Transfers still in flight are dropped without a completion
    /// notification and reported as [`Error::TransfersActive`].
    pub fn destroy<L: EventLoop>(self, ev: &mut L) -> Result<(), Error> {
        let Engine {
            transfers,
            mut watchers,
            mut timer,
            transport,
            session,
            ..
        } = self;

        timer.cancel(ev);
        watchers.clear(ev);

        let active = transfers.len();
        if active > 0 {
            warn!(active, "destroying engine with active transfers");
            for _ in 0..active {
                metrics::TRANSFERS_ACTIVE.decrement();
            }
        }
        // Handles must go while the transport is still alive.
        drop(transfers);

        let closed = transport.close(session);
        if let Err(e) = &closed {
            warn!(error = %e, "transport teardown failed");
        }
        debug!("engine destroyed");
        if active > 0 {
            return Err(Error::TransfersActive(active));
        }
        closed
    }

    // ── Diagnostics ──────────────────────────────────────────────────

    /// Transfers submitted and not yet reaped.
    pub fn active_count(&self) -> usize {
        self.transfers.len()
    }

    /// Transfers the transport reported running after the last drive.
    pub fn running(&self) -> usize {
        self.running
    }

    /// Descriptors currently watched on the transport's behalf.
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Interest currently registered for `fd`.
    pub fn watched_interest(&self, fd: RawFd) -> Option<Interest> {
        self.watchers.get(fd).map(|w| w.interest)
    }

    pub fn timer_armed(&self) -> bool {
        self.timer.is_armed()
    }

    /// Delay of the currently armed timer.
    pub fn timer_delay(&self) -> Option<std::time::Duration> {
        self.timer.delay()
    }

    /// Lifecycle state of a live transfer. `None` once reaped.
    pub fn state(&self, token: TransferToken) -> Option<&TransferState> {
        self.transfers.get(token.0).map(|ctx| &ctx.state)
    }

    /// Target URL of a live transfer.
    pub fn url(&self, token: TransferToken) -> Option<&str> {
        self.transfers.get(token.0).map(|ctx| ctx.url.as_str())
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

fn internal_or(result: Result<usize, Error>, context: &'static str) -> Result<usize, Error> {
    result.map_err(|e| {
        error!(context, error = %e, "transport drive failed");
        match e {
            Error::Internal { .. } => e,
            other => Error::internal(context, other.to_string()),
        }
    })
}

fn final_status(outcome: Result<(), TransferFailure>, detached: &Detached) -> TransferStatus {
    match outcome {
        Ok(()) => TransferStatus::Completed {
            response_code: detached.response_code,
        },
        Err(mut failure) => {
            if let Some(text) = detached.diagnostic.as_deref().filter(|t| !t.is_empty()) {
                failure.diagnostic = text.to_string();
            }
            TransferStatus::Failed(failure)
        }
    }
}
