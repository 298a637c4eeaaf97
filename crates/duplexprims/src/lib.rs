//! Byte streams with half-close over message-oriented transports.
//!
//! duplexprims lets code written against ordinary byte streams (attach/exec
//! consoles, `tokio::io::copy`, `std::io::Read`) run over a WebSocket-style
//! connection that speaks discrete messages and a close handshake.
//!
//! # Crate Structure
//!
//! - [`transport`]: the consumed transport contract (state, send/receive, close handshake)
//! - [`stream`]: the byte-stream adapter and its `tokio::io`/`std::io` bridges

/// Re-export transport types.
pub mod transport {
    pub use duplexprims_transport::*;
}

/// Re-export stream types.
pub mod stream {
    pub use duplexprims_stream::*;
}

pub use duplexprims_stream::{DuplexMessageStream, StreamConfig, StreamError};
pub use duplexprims_transport::{MessageTransport, TransportState};
