use crate::traits::TransportState;

/// Errors reported by a message transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was torn down out-of-band (local abort or release).
    #[error("transport aborted")]
    Aborted,

    /// The peer went away without completing the close handshake.
    #[error("connection reset by peer")]
    ConnectionReset,

    /// The operation is not legal in the transport's current state.
    #[error("cannot {op} in transport state {state:?}")]
    InvalidState {
        op: &'static str,
        state: TransportState,
    },

    /// An I/O error occurred on the underlying connection.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// True for abort-class failures: the connection was torn down locally or
    /// out-of-band rather than by the peer.
    pub fn is_abort(&self) -> bool {
        match self {
            TransportError::Aborted => true,
            TransportError::Io(err) => err.kind() == std::io::ErrorKind::ConnectionAborted,
            _ => false,
        }
    }

    /// True when the peer forcibly closed the connection.
    pub fn is_reset(&self) -> bool {
        match self {
            TransportError::ConnectionReset => true,
            TransportError::Io(err) => err.kind() == std::io::ErrorKind::ConnectionReset,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
