//! libcurl transport for tether.
//!
//! [`CurlTransport`] drives a curl multi handle in socket-action mode. Every
//! transfer is a plain GET with redirects followed, a connect timeout and a
//! minimum-throughput guard taken from [`tether::Config`]. TLS sessions (and
//! optionally DNS results) are shared through one [`SessionCache`].
//!
//! ```rust,ignore
//! use tether::{Engine, Config};
//! use tether_curl::CurlTransport;
//!
//! let engine: Engine<CurlTransport> = Engine::create(Config::default())?;
//! ```

pub(crate) mod failure;
pub(crate) mod handler;
pub mod share;
pub mod transport;

pub use share::SessionCache;
pub use transport::{CurlHandle, CurlTransport};
