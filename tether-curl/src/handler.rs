//! Per-transfer libcurl callbacks.

use curl::easy::{Handler, InfoType, WriteError};
use tether::{SinkHandle, TransferToken};
use tracing::trace;

/// Routes body bytes into the transfer's sink. Protocol chatter and progress
/// go to the log.
pub(crate) struct SinkHandler {
    token: TransferToken,
    sink: SinkHandle,
}

impl SinkHandler {
    pub(crate) fn new(token: TransferToken, sink: SinkHandle) -> Self {
        SinkHandler { token, sink }
    }
}

impl Handler for SinkHandler {
    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        // Returning less than `data.len()` makes libcurl fail the transfer
        // with a write error.
        Ok(self.sink.on_data(data))
    }

    fn progress(&mut self, dltotal: f64, dlnow: f64, _ultotal: f64, _ulnow: f64) -> bool {
        trace!(
            token = self.token.0,
            received = dlnow as u64,
            total = dltotal as u64,
            "progress"
        );
        true
    }

    fn debug(&mut self, kind: InfoType, data: &[u8]) {
        match kind {
            InfoType::Text | InfoType::HeaderIn | InfoType::HeaderOut => {
                let text = String::from_utf8_lossy(data);
                trace!(token = self.token.0, ?kind, "{}", text.trim_end());
            }
            _ => {}
        }
    }
}
