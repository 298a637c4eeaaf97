//! Byte-stream adapter over a message-oriented transport.
//!
//! [`DuplexMessageStream`] turns a [`MessageTransport`] into something that
//! reads and writes like a socket:
//! - a read returns whatever one receive produced; `0` means end of stream
//! - a write is exactly one complete message, never interleaved with another
//! - the write side can be half-closed while reading continues
//!
//! [`DuplexIo`] plugs the stream into `tokio::io`, and [`BlockingStream`]
//! into `std::io`.
//!
//! [`MessageTransport`]: duplexprims_transport::MessageTransport

pub mod blocking;
pub mod config;
pub mod error;
pub mod io;
pub mod stream;

pub use blocking::BlockingStream;
pub use config::StreamConfig;
pub use error::{Result, StreamError};
pub use io::DuplexIo;
pub use stream::{Capabilities, DuplexMessageStream, CAPABILITIES};
