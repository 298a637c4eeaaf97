use std::io;
use std::time::Duration;

use duplexprims_transport::TransportError;

/// Errors that can occur on a duplex message stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The stream was used after `dispose()`.
    #[error("stream disposed")]
    Disposed,

    /// The stream has no byte offset or total length.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// The stream's cancellation token fired.
    #[error("{0} cancelled")]
    Cancelled(&'static str),

    /// The operation did not finish within its configured timeout.
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> io::Error {
        let kind = match err {
            StreamError::Transport(TransportError::Io(io)) => return io,
            StreamError::Disposed => io::ErrorKind::NotConnected,
            StreamError::Unsupported(_) => io::ErrorKind::Unsupported,
            StreamError::Timeout { .. } => io::ErrorKind::TimedOut,
            StreamError::Cancelled(_) => io::ErrorKind::Other,
            StreamError::Transport(TransportError::Aborted) => io::ErrorKind::ConnectionAborted,
            StreamError::Transport(TransportError::ConnectionReset) => {
                io::ErrorKind::ConnectionReset
            }
            StreamError::Transport(TransportError::InvalidState { .. }) => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
