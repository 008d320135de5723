//! [`Transport`] over a libcurl multi handle in socket-action mode.

use std::os::fd::RawFd;

use crossbeam_channel::{Receiver, Sender};
use curl::easy::Easy2;
use curl::multi::{Easy2Handle, Events, Multi};
use tether::{
    Config, Detached, Error, Finished, Interest, Notification, Readiness, SessionCacheConfig,
    SinkHandle, TransferOptions, TransferToken, Transport,
};
use tracing::{debug, trace, warn};

use crate::failure::{classify, internal};
use crate::handler::SinkHandler;
use crate::share::SessionCache;

/// libcurl multi-socket transport.
///
/// The socket and timer hooks run inside `curl_multi_socket_action` and only
/// queue [`Notification`]s; the engine applies them once the call returns.
pub struct CurlTransport {
    multi: Multi,
    notifications: Receiver<Notification>,
}

/// An attached easy handle.
pub struct CurlHandle(Easy2Handle<SinkHandler>);

impl CurlTransport {
    /// Multi handle with its hooks installed. Connections across all hosts
    /// are capped at `config.max_transfers`.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut multi = Multi::new();
        install_hooks(&mut multi, tx)?;
        multi
            .set_max_total_connections(config.max_transfers)
            .map_err(|e| Error::Allocation(format!("connection limit: {e}")))?;
        Ok(CurlTransport {
            multi,
            notifications: rx,
        })
    }
}

fn install_hooks(multi: &mut Multi, tx: Sender<Notification>) -> Result<(), Error> {
    let sockets = tx.clone();
    multi
        .socket_function(move |fd, events, _| {
            let notification = if events.remove() {
                Notification::Unwatch { fd }
            } else {
                let both = events.input_and_output();
                match Interest::from_flags(events.input() || both, events.output() || both) {
                    Some(interest) => Notification::Watch { fd, interest },
                    None => return,
                }
            };
            // The receiver lives as long as the multi handle.
            let _ = sockets.send(notification);
        })
        .map_err(|e| Error::Allocation(format!("socket hook: {e}")))?;

    multi
        .timer_function(move |timeout| {
            let _ = tx.send(Notification::Timeout(timeout));
            true
        })
        .map_err(|e| Error::Allocation(format!("timer hook: {e}")))?;
    Ok(())
}

fn configure(
    easy: &mut Easy2<SinkHandler>,
    url: &str,
    options: &TransferOptions,
) -> Result<(), curl::Error> {
    easy.url(url)?;
    easy.get(true)?;
    easy.signal(false)?;
    easy.connect_timeout(options.connect_timeout)?;
    easy.low_speed_limit(options.low_speed_limit)?;
    easy.low_speed_time(options.low_speed_time)?;
    easy.follow_location(options.follow_redirects)?;
    if let Some(max) = options.max_redirects {
        easy.max_redirections(max)?;
    }
    if let Some(agent) = &options.user_agent {
        easy.useragent(agent)?;
    }
    easy.verbose(options.verbose)?;
    easy.progress(options.progress)?;
    Ok(())
}

impl Transport for CurlTransport {
    type Handle = CurlHandle;
    type Session = SessionCache;

    fn open(config: &Config) -> Result<Self, Error> {
        let transport = Self::new(config)?;
        debug!(
            max_connections = config.max_transfers,
            verbose = config.verbose,
            "curl multi handle created"
        );
        Ok(transport)
    }

    fn open_session(&mut self, config: &SessionCacheConfig) -> Result<SessionCache, Error> {
        SessionCache::new(config)
    }

    fn add(
        &mut self,
        token: TransferToken,
        url: &str,
        options: &TransferOptions,
        session: &SessionCache,
        sink: SinkHandle,
    ) -> Result<Self::Handle, Error> {
        let mut easy = Easy2::new(SinkHandler::new(token, sink));
        configure(&mut easy, url, options)
            .map_err(|e| Error::Rejected(format!("{url}: {}", e.description())))?;
        session.attach(&mut easy)?;

        let mut handle = self
            .multi
            .add2(easy)
            .map_err(|e| Error::Rejected(format!("{url}: {e}")))?;
        handle
            .set_token(token.0)
            .map_err(|e| Error::internal("set_token", e.to_string()))?;
        trace!(token = token.0, url, "easy handle attached");
        Ok(CurlHandle(handle))
    }

    fn drive_socket(&mut self, fd: RawFd, readiness: Readiness) -> Result<usize, Error> {
        let mut events = Events::new();
        events
            .input(readiness.readable)
            .output(readiness.writable)
            .error(readiness.error);
        let running = self
            .multi
            .action(fd, &events)
            .map_err(internal("curl_multi_socket_action"))?;
        Ok(running as usize)
    }

    fn drive_timeout(&mut self) -> Result<usize, Error> {
        let running = self
            .multi
            .timeout()
            .map_err(internal("curl_multi_socket_action(timeout)"))?;
        Ok(running as usize)
    }

    fn drain_notifications(&mut self, out: &mut Vec<Notification>) {
        out.extend(self.notifications.try_iter());
    }

    fn drain_finished(&mut self, out: &mut Vec<Finished>) {
        self.multi.messages(|message| {
            let Some(result) = message.result() else {
                return;
            };
            let token = match message.token() {
                Ok(token) => TransferToken(token),
                Err(e) => {
                    warn!(error = %e, "finished transfer without token");
                    return;
                }
            };
            out.push(Finished {
                token,
                outcome: result.map_err(|e| classify(&e)),
            });
        });
    }

    fn remove(&mut self, handle: Self::Handle) -> Result<Detached, Error> {
        let easy = self
            .multi
            .remove2(handle.0)
            .map_err(internal("curl_multi_remove_handle"))?;

        let effective_url = easy.effective_url().ok().flatten().map(str::to_owned);
        let response_code = easy.response_code().ok().filter(|code| *code != 0);
        let diagnostic = easy.take_error_buf();

        Ok(Detached {
            effective_url,
            response_code,
            diagnostic,
        })
    }

    fn close(self, session: SessionCache) -> Result<(), Error> {
        drop(self.multi);
        session.close()
    }
}
