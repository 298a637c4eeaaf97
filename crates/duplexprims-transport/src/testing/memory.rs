//! In-memory transport pair.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{MessageKind, MessageTransport, Received, TransportState};

#[derive(Debug)]
enum Frame {
    Data {
        kind: MessageKind,
        payload: Bytes,
        end_of_message: bool,
    },
    Close {
        status: u16,
        reason: String,
    },
}

struct Inbound {
    rx: mpsc::UnboundedReceiver<Frame>,
    /// Remainder of a data frame that did not fit the previous receive buffer.
    pending: Option<(MessageKind, Bytes, bool)>,
}

/// One end of a connected in-memory message transport.
///
/// Models the close handshake the way a WebSocket does:
/// - `close_output` sends a close frame and moves `Open` to `CloseSent`
///   (or `CloseReceived` to `Closed`)
/// - receiving the peer's close frame moves `Open` to `CloseReceived`
///   (or `CloseSent` to `Closed`)
/// - `close` sends a close frame if needed, then waits for the peer's
/// - [`abort`](Self::abort) and `release` before `Closed` tear the connection
///   down; the peer observes a connection reset
pub struct MemoryTransport {
    outbound: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    inbound: tokio::sync::Mutex<Inbound>,
    state: watch::Sender<TransportState>,
    aborted: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryTransport {
    /// Create a connected pair of open transports.
    ///
    /// Messages sent on one end are received on the other.
    pub fn pair() -> (Self, Self) {
        let (a_to_b_tx, a_to_b_rx) = mpsc::unbounded_channel();
        let (b_to_a_tx, b_to_a_rx) = mpsc::unbounded_channel();
        (Self::new(a_to_b_tx, b_to_a_rx), Self::new(b_to_a_tx, a_to_b_rx))
    }

    fn new(tx: mpsc::UnboundedSender<Frame>, rx: mpsc::UnboundedReceiver<Frame>) -> Self {
        Self {
            outbound: Mutex::new(Some(tx)),
            inbound: tokio::sync::Mutex::new(Inbound { rx, pending: None }),
            state: watch::Sender::new(TransportState::Open),
            aborted: CancellationToken::new(),
        }
    }

    /// Tear the connection down without a close handshake.
    ///
    /// Pending and future operations on this end fail with
    /// [`TransportError::Aborted`]; the peer observes a connection reset.
    pub fn abort(&self) {
        let changed = self.state.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            *state = TransportState::Aborted;
            true
        });
        if changed {
            debug!("memory transport aborted");
        }
        self.aborted.cancel();
        lock(&self.outbound).take();
    }

    fn transition(&self, next: impl FnOnce(TransportState) -> TransportState) {
        self.state.send_modify(|state| *state = next(*state));
    }

    fn check(&self, op: &'static str, allowed: impl FnOnce(TransportState) -> bool) -> Result<()> {
        match self.state() {
            TransportState::Aborted => Err(TransportError::Aborted),
            state if allowed(state) => Ok(()),
            state => Err(TransportError::InvalidState { op, state }),
        }
    }

    fn push(&self, frame: Frame) -> Result<()> {
        let outbound = lock(&self.outbound);
        let Some(tx) = outbound.as_ref() else {
            return Err(TransportError::Aborted);
        };
        if tx.send(frame).is_err() {
            drop(outbound);
            self.abort();
            return Err(TransportError::ConnectionReset);
        }
        Ok(())
    }

    async fn next_message(&self, inbound: &mut Inbound, buf: &mut [u8]) -> Result<Received> {
        if let Some((kind, payload, end_of_message)) = inbound.pending.take() {
            return Ok(deliver(inbound, buf, kind, payload, end_of_message));
        }

        let frame = tokio::select! {
            frame = inbound.rx.recv() => frame,
            _ = self.aborted.cancelled() => return Err(TransportError::Aborted),
        };

        match frame {
            Some(Frame::Data {
                kind,
                payload,
                end_of_message,
            }) => Ok(deliver(inbound, buf, kind, payload, end_of_message)),
            Some(Frame::Close { status, reason }) => {
                self.transition(|state| match state {
                    TransportState::Open => TransportState::CloseReceived,
                    TransportState::CloseSent => TransportState::Closed,
                    other => other,
                });
                Ok(Received::close(Some(status), reason))
            }
            None => {
                self.abort();
                Err(TransportError::ConnectionReset)
            }
        }
    }

    async fn await_peer_close(&self) -> Result<()> {
        let mut states = self.state.subscribe();
        let mut scratch = [0u8; 1024];
        loop {
            let state = *states.borrow_and_update();
            match state {
                TransportState::Closed => return Ok(()),
                TransportState::Aborted => return Err(TransportError::Aborted),
                _ => {}
            }

            // Either a concurrent receiver consumes the peer's close (and the
            // state changes), or we get the inbound side and drain it ourselves.
            tokio::select! {
                changed = states.changed() => {
                    if changed.is_err() {
                        return Err(TransportError::Aborted);
                    }
                }
                mut inbound = self.inbound.lock() => {
                    if self.state().can_receive() {
                        self.next_message(&mut inbound, &mut scratch).await?;
                    }
                }
            }
        }
    }
}

fn deliver(
    inbound: &mut Inbound,
    buf: &mut [u8],
    kind: MessageKind,
    mut payload: Bytes,
    end_of_message: bool,
) -> Received {
    let n = payload.len().min(buf.len());
    buf[..n].copy_from_slice(&payload[..n]);
    let rest = payload.split_off(n);
    if rest.is_empty() {
        Received::data(n, kind, end_of_message)
    } else {
        inbound.pending = Some((kind, rest, end_of_message));
        Received::data(n, kind, false)
    }
}

#[async_trait]
impl MessageTransport for MemoryTransport {
    fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    async fn receive(&self, buf: &mut [u8]) -> Result<Received> {
        self.check("receive", TransportState::can_receive)?;
        let mut inbound = tokio::select! {
            inbound = self.inbound.lock() => inbound,
            _ = self.aborted.cancelled() => return Err(TransportError::Aborted),
        };
        self.next_message(&mut inbound, buf).await
    }

    async fn send(&self, buf: &[u8], kind: MessageKind, end_of_message: bool) -> Result<()> {
        self.check("send", TransportState::can_send)?;
        self.push(Frame::Data {
            kind,
            payload: Bytes::copy_from_slice(buf),
            end_of_message,
        })
    }

    async fn close_output(&self, status: u16, reason: &str) -> Result<()> {
        self.check("close output", TransportState::can_close)?;
        self.push(Frame::Close {
            status,
            reason: reason.to_string(),
        })?;
        self.transition(|state| match state {
            TransportState::Open => TransportState::CloseSent,
            TransportState::CloseReceived => TransportState::Closed,
            other => other,
        });
        debug!(status, "memory transport output closed");
        Ok(())
    }

    async fn close(&self, status: u16, reason: &str) -> Result<()> {
        match self.state() {
            TransportState::Closed => return Ok(()),
            state if state.can_close() => self.close_output(status, reason).await?,
            _ => {}
        }
        self.await_peer_close().await
    }

    fn release(&self) {
        if self.state() != TransportState::Closed {
            self.abort();
        }
        lock(&self.outbound).take();
    }
}
