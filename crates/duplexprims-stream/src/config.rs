use std::time::Duration;

use duplexprims_transport::NORMAL_CLOSURE;
use tokio_util::sync::CancellationToken;

/// Configuration for a duplex message stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Status sent with every close message. Default: `NORMAL_CLOSURE`.
    pub close_status: u16,
    /// Reason sent with every close message. Default: empty.
    pub close_reason: String,
    /// Upper bound on a single read.
    pub read_timeout: Option<Duration>,
    /// Upper bound on a single write, including waiting for other writers.
    pub write_timeout: Option<Duration>,
    /// Upper bound on each close handshake step.
    pub close_timeout: Option<Duration>,
    /// Cancels in-flight and future reads, writes and half-closes.
    ///
    /// `dispose()` ignores it so teardown always runs.
    pub cancellation: Option<CancellationToken>,
    /// Also report a connection reset as end of stream when the transport is
    /// already aborted. Default: false (only abort-class errors are benign).
    pub reset_as_eof: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            close_status: NORMAL_CLOSURE,
            close_reason: String::new(),
            read_timeout: None,
            write_timeout: None,
            close_timeout: None,
            cancellation: None,
            reset_as_eof: false,
        }
    }
}
