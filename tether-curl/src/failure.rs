//! libcurl result codes → tether failure kinds.

use curl::MultiError;
use tether::{Error, FailureKind, TransferFailure};

/// Classify a finished transfer's error.
pub(crate) fn classify(err: &curl::Error) -> TransferFailure {
    let kind = if err.is_couldnt_resolve_host() || err.is_couldnt_resolve_proxy() {
        FailureKind::Resolve
    } else if err.is_couldnt_connect() {
        FailureKind::Connect
    } else if err.is_operation_timedout() {
        FailureKind::TimedOut
    } else if err.is_ssl_connect_error()
        || err.is_peer_failed_verification()
        || err.is_ssl_certproblem()
        || err.is_ssl_cacert()
    {
        FailureKind::Tls
    } else if err.is_write_error() || err.is_aborted_by_callback() {
        FailureKind::Aborted
    } else if err.is_too_many_redirects() {
        FailureKind::TooManyRedirects
    } else if err.is_partial_file()
        || err.is_got_nothing()
        || err.is_recv_error()
        || err.is_send_error()
        || err.is_http2_error()
        || err.is_unsupported_protocol()
        || err.is_url_malformed()
    {
        FailureKind::Protocol
    } else {
        FailureKind::Other
    };
    let diagnostic = err.extra_description().unwrap_or(err.description());
    TransferFailure::new(kind, diagnostic)
}

/// Multi-handle errors mean a bad handle, bad socket or exhausted memory.
pub(crate) fn internal(context: &'static str) -> impl FnOnce(MultiError) -> Error {
    move |e| Error::internal(context, e.to_string())
}
