use async_trait::async_trait;

use crate::error::Result;

/// Connection state of a message transport.
///
/// ```text
/// Connecting -> Open -> CloseSent ------> Closed
///                  \--> CloseReceived --/
///                  \--> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    /// The opening handshake has not completed yet.
    Connecting,
    /// Both directions are open.
    Open,
    /// This side sent its close message; inbound data may still arrive.
    CloseSent,
    /// The peer sent its close message; this side may still send.
    CloseReceived,
    /// The close handshake completed.
    Closed,
    /// The connection was torn down without a close handshake.
    Aborted,
}

impl TransportState {
    /// True while this side may still send a close message.
    ///
    /// Both the half-close and the full close handshake are only legal here.
    pub fn can_close(self) -> bool {
        matches!(self, TransportState::Open | TransportState::CloseReceived)
    }

    /// True while this side may still send data messages.
    pub fn can_send(self) -> bool {
        self.can_close()
    }

    /// True while inbound messages may still arrive.
    pub fn can_receive(self) -> bool {
        matches!(self, TransportState::Open | TransportState::CloseSent)
    }

    /// True once the connection is over, cleanly or not.
    pub fn is_terminal(self) -> bool {
        matches!(self, TransportState::Closed | TransportState::Aborted)
    }
}

/// Type of a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Opaque bytes.
    Binary,
    /// UTF-8 text.
    Text,
    /// The peer's close message.
    Close,
}

/// Outcome of a single receive operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    /// Bytes written into the caller's buffer.
    pub count: usize,
    /// Type of the message the bytes belong to.
    pub kind: MessageKind,
    /// False when the message did not fit and the remainder is still pending.
    pub end_of_message: bool,
    /// Close status sent by the peer, for [`MessageKind::Close`].
    pub close_status: Option<u16>,
    /// Close reason sent by the peer, for [`MessageKind::Close`].
    pub close_reason: Option<String>,
}

impl Received {
    /// A complete or partial data message.
    pub fn data(count: usize, kind: MessageKind, end_of_message: bool) -> Self {
        Self {
            count,
            kind,
            end_of_message,
            close_status: None,
            close_reason: None,
        }
    }

    /// The peer's close message.
    pub fn close(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            count: 0,
            kind: MessageKind::Close,
            end_of_message: true,
            close_status: status,
            close_reason: Some(reason.into()),
        }
    }

    /// Whether this is the peer's close message.
    pub fn is_close(&self) -> bool {
        self.kind == MessageKind::Close
    }
}

/// A full-duplex, message-oriented connection with an explicit close handshake.
///
/// Every method takes `&self`: one task may be receiving while another sends.
/// Implementations must tolerate that, but callers are responsible for not
/// running two sends (or two receives) at once.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Current connection state.
    fn state(&self) -> TransportState;

    /// Receive the next message, or as much of it as fits, into `buf`.
    ///
    /// Suspends until data, a close message or a failure arrives.
    async fn receive(&self, buf: &mut [u8]) -> Result<Received>;

    /// Send `buf` as one message fragment.
    ///
    /// `end_of_message` marks the final fragment of the message.
    async fn send(&self, buf: &[u8], kind: MessageKind, end_of_message: bool) -> Result<()>;

    /// Send a close message and stop sending; inbound data may still arrive.
    async fn close_output(&self, status: u16, reason: &str) -> Result<()>;

    /// Run the full close handshake: send a close message (unless one was
    /// already sent) and wait for the peer's.
    async fn close(&self, status: u16, reason: &str) -> Result<()>;

    /// Release the underlying OS/network resources.
    ///
    /// Aborts the connection if the close handshake has not completed.
    fn release(&self);
}

#[async_trait]
impl<T: MessageTransport + ?Sized> MessageTransport for Box<T> {
    fn state(&self) -> TransportState {
        (**self).state()
    }

    async fn receive(&self, buf: &mut [u8]) -> Result<Received> {
        (**self).receive(buf).await
    }

    async fn send(&self, buf: &[u8], kind: MessageKind, end_of_message: bool) -> Result<()> {
        (**self).send(buf, kind, end_of_message).await
    }

    async fn close_output(&self, status: u16, reason: &str) -> Result<()> {
        (**self).close_output(status, reason).await
    }

    async fn close(&self, status: u16, reason: &str) -> Result<()> {
        (**self).close(status, reason).await
    }

    fn release(&self) {
        (**self).release()
    }
}
