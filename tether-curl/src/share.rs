//! Shared session cache: one libcurl share handle for every transfer.
//!
//! The `curl` crate does not wrap share handles, so this goes through
//! `curl-sys` directly.

use curl::easy::{Easy2, Handler};
use curl_sys::{
    CURL_LOCK_DATA_DNS, CURL_LOCK_DATA_SSL_SESSION, CURLOPT_SHARE, CURLSHE_OK, CURLSHOPT_SHARE,
    curl_lock_data,
};
use tether::{Error, SessionCacheConfig};
use tracing::debug;

/// Owns a `CURLSH` handle.
///
/// Every transfer attached to it must be gone before it is closed.
pub struct SessionCache {
    raw: *mut curl_sys::CURLSH,
}

impl SessionCache {
    pub fn new(config: &SessionCacheConfig) -> Result<Self, Error> {
        curl::init();
        // SAFETY: curl_share_init has no preconditions once the library is initialised.
        let raw = unsafe { curl_sys::curl_share_init() };
        if raw.is_null() {
            return Err(Error::Allocation("curl_share_init returned null".into()));
        }
        let cache = SessionCache { raw };
        if config.ssl_sessions {
            cache.share(CURL_LOCK_DATA_SSL_SESSION, "ssl sessions")?;
        }
        if config.dns {
            cache.share(CURL_LOCK_DATA_DNS, "dns")?;
        }
        debug!(
            ssl_sessions = config.ssl_sessions,
            dns = config.dns,
            "session cache created"
        );
        Ok(cache)
    }

    fn share(&self, data: curl_lock_data, what: &str) -> Result<(), Error> {
        // SAFETY: `raw` is a live share handle; CURLSHOPT_SHARE takes a lock data value.
        let rc = unsafe { curl_sys::curl_share_setopt(self.raw, CURLSHOPT_SHARE, data) };
        if rc != CURLSHE_OK {
            return Err(Error::Allocation(format!(
                "sharing {what} failed with code {rc}"
            )));
        }
        Ok(())
    }

    /// Point a transfer at this cache.
    pub(crate) fn attach<H: Handler>(&self, easy: &mut Easy2<H>) -> Result<(), Error> {
        // SAFETY: both handles are live and the cache outlives every transfer
        // attached to it.
        let rc = unsafe { curl_sys::curl_easy_setopt(easy.raw(), CURLOPT_SHARE, self.raw) };
        if rc != curl_sys::CURLE_OK {
            return Err(Error::Rejected(format!(
                "attaching session cache failed with code {rc}"
            )));
        }
        Ok(())
    }

    /// Release the share handle, reporting a failure instead of ignoring it.
    pub fn close(mut self) -> Result<(), Error> {
        let raw = std::mem::replace(&mut self.raw, std::ptr::null_mut());
        // SAFETY: `raw` is live and no longer reachable from `self`.
        let rc = unsafe { curl_sys::curl_share_cleanup(raw) };
        if rc != CURLSHE_OK {
            return Err(Error::Teardown(format!(
                "session cache cleanup failed with code {rc}"
            )));
        }
        debug!("session cache released");
        Ok(())
    }
}

impl Drop for SessionCache {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            // SAFETY: `raw` is live; close() nulls it after cleanup.
            unsafe {
                curl_sys::curl_share_cleanup(self.raw);
            }
        }
    }
}
