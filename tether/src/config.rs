use std::time::Duration;

use crate::error::Error;

/// What the shared session cache keeps between transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCacheConfig {
    /// Reuse TLS sessions across transfers.
    pub ssl_sessions: bool,
    /// Share the DNS cache across transfers.
    pub dns: bool,
}

impl Default for SessionCacheConfig {
    fn default() -> Self {
        Self {
            ssl_sessions: true,
            dns: false,
        }
    }
}

/// Configuration for an [`Engine`](crate::Engine).
///
/// The per-transfer fields are copied into [`TransferOptions`] at submission
/// time and enforced by the transport.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum time allowed for the connect phase (DNS + TCP + TLS).
    pub connect_timeout: Duration,
    /// Minimum average throughput in bytes per second. A transfer slower than
    /// this for `low_speed_time` is failed. 0 disables the guard.
    pub low_speed_limit: u32,
    /// Window over which `low_speed_limit` is measured.
    pub low_speed_time: Duration,
    /// Follow `Location:` redirects.
    pub follow_redirects: bool,
    /// Redirect limit when `follow_redirects` is set. `None` = transport default.
    pub max_redirects: Option<u32>,
    /// `User-Agent` header. `None` = none sent.
    pub user_agent: Option<String>,
    /// Ask the transport to trace protocol chatter.
    pub verbose: bool,
    /// Report transfer progress at trace level.
    pub progress: bool,
    /// Maximum number of transfers in flight. Submissions beyond this are
    /// rejected.
    pub max_transfers: usize,
    /// Session cache sharing.
    pub session_cache: SessionCacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_limit: 1,
            low_speed_time: Duration::from_secs(30),
            follow_redirects: true,
            max_redirects: Some(10),
            user_agent: Some(concat!("tether/", env!("CARGO_PKG_VERSION")).to_string()),
            verbose: false,
            progress: false,
            max_transfers: 1024,
            session_cache: SessionCacheConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values. Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<(), Error> {
        if self.connect_timeout.is_zero() {
            return Err(Error::Config("connect_timeout must be > 0".into()));
        }
        if self.low_speed_limit > 0 && self.low_speed_time.is_zero() {
            return Err(Error::Config(
                "low_speed_time must be > 0 when low_speed_limit is set".into(),
            ));
        }
        if self.max_transfers == 0 {
            return Err(Error::Config("max_transfers must be > 0".into()));
        }
        if self.max_redirects == Some(0) && self.follow_redirects {
            return Err(Error::Config(
                "max_redirects must be > 0 when follow_redirects is set".into(),
            ));
        }
        Ok(())
    }

    /// Per-transfer options derived from this config.
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            connect_timeout: self.connect_timeout,
            low_speed_limit: self.low_speed_limit,
            low_speed_time: self.low_speed_time,
            follow_redirects: self.follow_redirects,
            max_redirects: self.max_redirects,
            user_agent: self.user_agent.clone(),
            verbose: self.verbose,
            progress: self.progress,
        }
    }
}

/// Options applied by the transport to a single transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOptions {
    pub connect_timeout: Duration,
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
    pub follow_redirects: bool,
    pub max_redirects: Option<u32>,
    pub user_agent: Option<String>,
    pub verbose: bool,
    pub progress: bool,
}

/// Builder for [`Config`] with discoverable methods and `build()` validation.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tether::ConfigBuilder;
///
/// let config = ConfigBuilder::default()
///     .connect_timeout(Duration::from_secs(10))
///     .low_speed(1, Duration::from_secs(20))
///     .max_transfers(64)
///     .build()
///     .expect("invalid config");
/// ```
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default config values.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Transfer guards ──────────────────────────────────────────────

    /// Set the connect-phase timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the minimum-throughput guard. A `limit` of 0 disables it.
    pub fn low_speed(mut self, limit: u32, time: Duration) -> Self {
        self.config.low_speed_limit = limit;
        self.config.low_speed_time = time;
        self
    }

    // ── Redirects ────────────────────────────────────────────────────

    /// Enable or disable redirect following.
    pub fn follow_redirects(mut self, enable: bool) -> Self {
        self.config.follow_redirects = enable;
        self
    }

    /// Set the redirect limit.
    pub fn max_redirects(mut self, n: u32) -> Self {
        self.config.max_redirects = Some(n);
        self
    }

    // ── Request settings ─────────────────────────────────────────────

    /// Set the `User-Agent` header. An empty string sends none.
    pub fn user_agent(mut self, agent: &str) -> Self {
        self.config.user_agent = (!agent.is_empty()).then(|| agent.to_string());
        self
    }

    /// Enable transport-level protocol tracing.
    pub fn verbose(mut self, enable: bool) -> Self {
        self.config.verbose = enable;
        self
    }

    /// Enable progress reporting.
    pub fn progress(mut self, enable: bool) -> Self {
        self.config.progress = enable;
        self
    }

    // ── Engine limits ────────────────────────────────────────────────

    /// Set the maximum number of transfers in flight.
    pub fn max_transfers(mut self, n: usize) -> Self {
        self.config.max_transfers = n;
        self
    }

    /// Set session cache sharing.
    pub fn session_cache(mut self, ssl_sessions: bool, dns: bool) -> Self {
        self.config.session_cache = SessionCacheConfig { ssl_sessions, dns };
        self
    }

    // ── Terminal ─────────────────────────────────────────────────────

    /// Validate and build the final [`Config`].
    pub fn build(self) -> Result<Config, Error> {
        self.config.validate()?;
        Ok(self.config)
    }
}
