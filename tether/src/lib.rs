//! tether: drive many HTTP transfers from a single-threaded event loop.
//!
//! A readiness-driven multi-transfer engine (a [`Transport`]) owns sockets
//! and protocol state but never blocks. tether bridges it onto an event loop:
//! the transport says which descriptors it cares about and when it wants a
//! timeout, the [`Engine`] keeps exactly one loop registration per
//! descriptor and one timer, feeds readiness back into the transport, and
//! reaps finished transfers.
//!
//! Response bodies stream into a [`StreamSink`] per transfer. Consuming fewer
//! bytes than offered aborts that transfer.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tether::{run_until_idle, BodyCollector, Config, Engine, Reactor};
//! use tether_curl::CurlTransport;
//!
//! fn main() -> Result<(), tether::Error> {
//!     let mut reactor = Reactor::new()?;
//!     let mut engine: Engine<CurlTransport> = Engine::create(Config::default())?;
//!
//!     let (sink, body) = BodyCollector::new();
//!     engine.submit(&mut reactor, "http://example.com/", sink)?;
//!     run_until_idle(&mut reactor, &mut engine)?;
//!
//!     println!("{:?} {} bytes", body.status(), body.body().map_or(0, |b| b.len()));
//!     engine.destroy(&mut reactor)
//! }
//! ```

// ── Internal modules ────────────────────────────────────────────────────
pub(crate) mod metrics;
pub(crate) mod timer;
pub(crate) mod watcher;

// ── Public modules ──────────────────────────────────────────────────────
pub mod config;
pub mod engine;
pub mod error;
pub mod event_loop;
pub mod interest;
pub mod reactor;
pub mod sink;
pub mod transfer;
pub mod transport;

// ── Re-exports ──────────────────────────────────────────────────────────
pub use config::{Config, ConfigBuilder, SessionCacheConfig, TransferOptions};
pub use engine::{Engine, EngineStats};
pub use error::Error;
pub use event_loop::{EventLoop, LoopEvent, TimerKey, WatchKey};
pub use interest::{Interest, Readiness};
pub use reactor::{Reactor, run_until_idle};
pub use sink::{BodyCollector, CollectedBody, SinkHandle, StreamSink};
pub use transfer::{FailureKind, TransferFailure, TransferState, TransferStatus, TransferToken};
pub use transport::{Detached, Finished, Notification, Transport};
