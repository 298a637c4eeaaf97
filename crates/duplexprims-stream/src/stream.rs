use std::fmt;
use std::future::Future;
use std::io::SeekFrom;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use duplexprims_transport::{
    close_status_name, MessageKind, MessageTransport, TransportError, TransportState,
    NORMAL_CLOSURE,
};
use tokio::sync::Semaphore;
use tracing::{debug, trace, warn};

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};

/// Fixed capability flags of a [`DuplexMessageStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub readable: bool,
    pub writable: bool,
    pub seekable: bool,
    /// The write side can be closed independently of the read side.
    pub close_write: bool,
}

/// Capabilities shared by every duplex message stream.
pub const CAPABILITIES: Capabilities = Capabilities {
    readable: true,
    writable: true,
    seekable: false,
    close_write: true,
};

/// A byte stream over a message-oriented transport.
///
/// - Each [`read`](Self::read) maps to exactly one transport receive and
///   returns whatever that receive produced; `Ok(0)` means end of stream.
/// - Each [`write`](Self::write) maps to exactly one complete message.
///   Concurrent writers are serialized, so messages never interleave.
/// - [`close_write`](Self::close_write) half-closes the output while reads
///   continue; [`dispose`](Self::dispose) runs the full close handshake.
///
/// Every method takes `&self`; share the stream through an `Arc` to read and
/// write from different tasks. Reads are not serialized: keep a single reader.
pub struct DuplexMessageStream<T: MessageTransport> {
    transport: T,
    write_lock: Semaphore,
    disposed: AtomicBool,
    released: AtomicBool,
    config: StreamConfig,
}

impl<T: MessageTransport> DuplexMessageStream<T> {
    /// Wrap an open transport with default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, StreamConfig::default())
    }

    /// Wrap an open transport with explicit configuration.
    ///
    /// The stream takes ownership of the transport and releases it exactly once.
    pub fn with_config(transport: T, config: StreamConfig) -> Self {
        Self {
            transport,
            write_lock: Semaphore::new(1),
            disposed: AtomicBool::new(false),
            released: AtomicBool::new(false),
            config,
        }
    }

    /// Capability flags.
    pub fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    /// Connection state observed on the transport.
    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    /// Whether `dispose()` has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Borrow the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Current stream configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Read the next chunk of inbound data into `buf`.
    ///
    /// Returns the number of bytes received, which may be less than
    /// `buf.len()`. Returns `Ok(0)` at end of stream: when the peer closed
    /// (its close is acknowledged best-effort) or when the transport was
    /// already aborted, e.g. by a concurrent `dispose()`.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_not_disposed()?;
        if buf.is_empty() {
            return Ok(0);
        }

        let received = self
            .run("read", self.config.read_timeout, async {
                self.transport.receive(buf).await.map_err(StreamError::from)
            })
            .await;

        let received = match received {
            Ok(received) => received,
            Err(StreamError::Transport(err)) if self.is_benign_teardown(&err) => {
                debug!(error = %err, "transport torn down during read, reporting end of stream");
                return Ok(0);
            }
            Err(err) => return Err(err),
        };

        if received.is_close() {
            let status = received.close_status.unwrap_or(NORMAL_CLOSURE);
            debug!(
                status,
                name = close_status_name(status),
                reason = received.close_reason.as_deref().unwrap_or_default(),
                "peer closed the stream"
            );
            self.acknowledge_close().await?;
            return Ok(0);
        }

        trace!(count = received.count, end_of_message = received.end_of_message, "read");
        Ok(received.count)
    }

    /// Send `buf` as one complete message.
    ///
    /// Waits for any in-progress write to finish first.
    pub async fn write(&self, buf: &[u8]) -> Result<()> {
        self.ensure_not_disposed()?;

        self.run("write", self.config.write_timeout, async {
            // The permit is released when dropped: on success, on error, and
            // when this future is dropped mid-send.
            let _permit = self
                .write_lock
                .acquire()
                .await
                .map_err(|_| StreamError::Disposed)?;
            self.transport
                .send(buf, MessageKind::Binary, true)
                .await?;
            trace!(len = buf.len(), "wrote message");
            Ok::<(), StreamError>(())
        })
        .await
    }

    /// No-op: every write is sent immediately.
    pub async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Half-close: tell the peer no more data is coming, keep reading.
    ///
    /// No-op once disposed, or when this side already sent its close.
    pub async fn close_write(&self) -> Result<()> {
        if self.is_disposed() {
            return Ok(());
        }

        let state = self.transport.state();
        if !state.can_close() {
            trace!(?state, "output already closing, skipping half-close");
            return Ok(());
        }

        self.run("close write", self.config.close_timeout, async {
            self.transport
                .close_output(self.config.close_status, &self.config.close_reason)
                .await
                .map_err(StreamError::from)
        })
        .await?;
        debug!(?state, "output half-closed");
        Ok(())
    }

    /// Close the transport and release it. Idempotent.
    ///
    /// The first call runs the full close handshake when the transport still
    /// allows it, then releases the transport and the write lock whether or
    /// not the handshake succeeded. A handshake failure is returned after
    /// release. Later calls do nothing, so dropping the first call's future
    /// mid-handshake still releases: the handshake is abandoned, not retried.
    ///
    /// The stream's cancellation token does not apply here.
    pub async fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Release also runs if this future is dropped mid-handshake.
        let release = ReleaseOnDrop(self);

        let state = self.transport.state();
        let handshake = if state.can_close() {
            debug!(?state, "closing transport");
            with_timeout("dispose", self.config.close_timeout, async {
                self.transport
                    .close(self.config.close_status, &self.config.close_reason)
                    .await
                    .map_err(StreamError::from)
            })
            .await
        } else {
            Ok(())
        };

        drop(release);

        if let Err(err) = &handshake {
            warn!(error = %err, "close handshake failed during dispose");
        }
        handshake
    }

    /// Always fails: the stream has no byte offsets.
    pub fn seek(&self, _pos: SeekFrom) -> Result<u64> {
        Err(StreamError::Unsupported("seek"))
    }

    /// Always fails: the stream has no length.
    pub fn set_length(&self, _len: u64) -> Result<()> {
        Err(StreamError::Unsupported("set length"))
    }

    /// Always fails: the stream has no length.
    pub fn length(&self) -> Result<u64> {
        Err(StreamError::Unsupported("length"))
    }

    /// Always fails: the stream has no position.
    pub fn position(&self) -> Result<u64> {
        Err(StreamError::Unsupported("position"))
    }

    /// Always fails: the stream has no position.
    pub fn set_position(&self, _pos: u64) -> Result<()> {
        Err(StreamError::Unsupported("set position"))
    }

    fn ensure_not_disposed(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(StreamError::Disposed);
        }
        Ok(())
    }

    /// A failure that only reflects a teardown already in progress.
    fn is_benign_teardown(&self, err: &TransportError) -> bool {
        let classified = err.is_abort() || (self.config.reset_as_eof && err.is_reset());
        classified && self.transport.state() == TransportState::Aborted
    }

    /// Answer the peer's close. Transport failures are ignored: the
    /// connection is ending either way.
    async fn acknowledge_close(&self) -> Result<()> {
        let ack = self
            .run("close acknowledgment", self.config.close_timeout, async {
                self.transport
                    .close_output(self.config.close_status, &self.config.close_reason)
                    .await
                    .map_err(StreamError::from)
            })
            .await;

        match ack {
            Ok(()) => {
                trace!("close acknowledged");
                Ok(())
            }
            Err(StreamError::Transport(err)) => {
                debug!(error = %err, "ignoring failed close acknowledgment");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Release the transport and the write lock, once.
    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.write_lock.close();
        self.transport.release();
        trace!("transport released");
    }

    /// Apply the cancellation token and `timeout` to `fut`.
    async fn run<R>(
        &self,
        op: &'static str,
        timeout: Option<Duration>,
        fut: impl Future<Output = Result<R>>,
    ) -> Result<R> {
        let fut = with_timeout(op, timeout, fut);
        match &self.config.cancellation {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(StreamError::Cancelled(op)),
                    result = fut => result,
                }
            }
            None => fut.await,
        }
    }
}

async fn with_timeout<R>(
    op: &'static str,
    timeout: Option<Duration>,
    fut: impl Future<Output = Result<R>>,
) -> Result<R> {
    match timeout {
        Some(after) => match tokio::time::timeout(after, fut).await {
            Ok(result) => result,
            Err(_) => Err(StreamError::Timeout { op, after }),
        },
        None => fut.await,
    }
}

struct ReleaseOnDrop<'a, T: MessageTransport>(&'a DuplexMessageStream<T>);

impl<T: MessageTransport> Drop for ReleaseOnDrop<'_, T> {
    fn drop(&mut self) {
        self.0.release();
    }
}

impl<T: MessageTransport> Drop for DuplexMessageStream<T> {
    fn drop(&mut self) {
        if !self.released.load(Ordering::Acquire) {
            debug!("stream dropped before dispose completed, releasing transport");
            self.release();
        }
    }
}

impl<T: MessageTransport> fmt::Debug for DuplexMessageStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplexMessageStream")
            .field("state", &self.transport.state())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use duplexprims_transport::testing::{Call, MemoryTransport, MockTransport};
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn stream_over(mock: &MockTransport) -> DuplexMessageStream<MockTransport> {
        DuplexMessageStream::new(mock.clone())
    }

    #[test]
    fn capability_flags() {
        let stream = stream_over(&MockTransport::new());
        let caps = stream.capabilities();
        assert!(caps.readable);
        assert!(caps.writable);
        assert!(!caps.seekable);
        assert!(caps.close_write);
    }

    #[test]
    fn offset_operations_unsupported() {
        let stream = stream_over(&MockTransport::new());
        assert!(matches!(
            stream.seek(SeekFrom::Start(0)),
            Err(StreamError::Unsupported("seek"))
        ));
        assert!(matches!(
            stream.set_length(1),
            Err(StreamError::Unsupported(_))
        ));
        assert!(matches!(stream.length(), Err(StreamError::Unsupported(_))));
        assert!(matches!(stream.position(), Err(StreamError::Unsupported(_))));
        assert!(matches!(
            stream.set_position(3),
            Err(StreamError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn write_sends_one_final_message() {
        let mock = MockTransport::new();
        let stream = stream_over(&mock);

        stream.write(&[0x41, 0x42]).await.unwrap();

        assert_eq!(
            mock.calls(),
            vec![Call::Send {
                data: bytes::Bytes::from_static(&[0x41, 0x42]),
                kind: MessageKind::Binary,
                end_of_message: true,
            }]
        );
    }

    #[tokio::test]
    async fn write_propagates_transport_failure() {
        let mock = MockTransport::new();
        mock.fail_next_send(TransportError::ConnectionReset);
        let stream = stream_over(&mock);

        let err = stream.write(b"x").await.unwrap_err();
        assert!(matches!(
            err,
            StreamError::Transport(TransportError::ConnectionReset)
        ));

        // The lock was released on the error path.
        stream.write(b"y").await.unwrap();
        assert_eq!(mock.sent(), vec![bytes::Bytes::from_static(b"y")]);
    }

    #[tokio::test]
    async fn read_returns_single_receive_without_refill() {
        let mock = MockTransport::new();
        mock.push_data(&b"abc"[..]);
        mock.push_data(&b"def"[..]);
        let stream = stream_over(&mock);

        let mut buf = [0u8; 10];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(stream.read(&mut buf).await.unwrap(), 3);
        assert_eq!(&buf[..3], b"def");
    }

    #[tokio::test]
    async fn read_into_empty_buffer_skips_transport() {
        let mock = MockTransport::new();
        let stream = stream_over(&mock);

        assert_eq!(stream.read(&mut []).await.unwrap(), 0);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn inbound_close_acknowledges_once_and_reports_eof() {
        let mock = MockTransport::new();
        mock.push_close(NORMAL_CLOSURE, "done");
        let stream = stream_over(&mock);

        let mut buf = [0u8; 10];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
        assert_eq!(mock.close_output_count(), 1);
        assert!(mock.calls().contains(&Call::CloseOutput {
            status: NORMAL_CLOSURE,
            reason: String::new(),
        }));
    }

    #[tokio::test]
    async fn failed_close_acknowledgment_is_swallowed() {
        let mock = MockTransport::new();
        mock.push_close(NORMAL_CLOSURE, "");
        mock.fail_next_close_output(TransportError::Aborted);
        let stream = stream_over(&mock);

        let mut buf = [0u8; 10];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
        assert_eq!(mock.close_output_count(), 1);
    }

    #[tokio::test]
    async fn abort_while_aborted_is_end_of_stream() {
        let mock = MockTransport::with_state(TransportState::Aborted);
        mock.push_error(TransportError::Aborted);
        let stream = stream_over(&mock);

        let mut buf = [0u8; 10];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn abort_while_open_propagates() {
        let mock = MockTransport::new();
        mock.push_error(TransportError::Aborted);
        let stream = stream_over(&mock);

        let mut buf = [0u8; 10];
        let err = stream.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, StreamError::Transport(TransportError::Aborted)));
    }

    #[tokio::test]
    async fn reset_propagates_unless_opted_in() {
        let mock = MockTransport::with_state(TransportState::Aborted);
        mock.push_error(TransportError::ConnectionReset);
        let stream = stream_over(&mock);
        let mut buf = [0u8; 10];
        assert!(stream.read(&mut buf).await.is_err());

        let mock = MockTransport::with_state(TransportState::Aborted);
        mock.push_error(TransportError::ConnectionReset);
        let stream = DuplexMessageStream::with_config(
            mock.clone(),
            StreamConfig {
                reset_as_eof: true,
                ..StreamConfig::default()
            },
        );
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn close_write_when_open_half_closes_once() {
        let mock = MockTransport::new();
        let stream = stream_over(&mock);

        stream.close_write().await.unwrap();
        assert_eq!(mock.close_output_count(), 1);
        assert_eq!(mock.close_count(), 0);
    }

    #[tokio::test]
    async fn close_write_when_peer_closed_half_closes() {
        let mock = MockTransport::with_state(TransportState::CloseReceived);
        let stream = stream_over(&mock);

        stream.close_write().await.unwrap();
        assert_eq!(mock.close_output_count(), 1);
    }

    #[tokio::test]
    async fn close_write_after_close_is_noop() {
        for state in [
            TransportState::Closed,
            TransportState::Aborted,
            TransportState::CloseSent,
        ] {
            let mock = MockTransport::with_state(state);
            let stream = stream_over(&mock);
            stream.close_write().await.unwrap();
            assert_eq!(mock.close_output_count(), 0, "state {state:?}");
        }
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let mock = MockTransport::new();
        let stream = stream_over(&mock);

        stream.dispose().await.unwrap();
        stream.dispose().await.unwrap();

        assert_eq!(mock.close_count(), 1);
        assert_eq!(mock.release_count(), 1);
        drop(stream);
        assert_eq!(mock.release_count(), 1);
    }

    #[tokio::test]
    async fn dispose_skips_handshake_when_already_closed() {
        let mock = MockTransport::with_state(TransportState::Aborted);
        let stream = stream_over(&mock);

        stream.dispose().await.unwrap();
        assert_eq!(mock.close_count(), 0);
        assert_eq!(mock.release_count(), 1);
    }

    #[tokio::test]
    async fn dispose_after_half_close_skips_handshake() {
        let mock = MockTransport::with_state(TransportState::CloseSent);
        let stream = stream_over(&mock);

        stream.dispose().await.unwrap();
        assert_eq!(mock.close_count(), 0);
        assert_eq!(mock.release_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_dispose_still_releases() {
        let (left, _right) = MemoryTransport::pair();
        let stream = Arc::new(DuplexMessageStream::new(left));

        let reader = {
            let stream = Arc::clone(&stream);
            tokio::spawn(async move {
                let mut buf = [0u8; 16];
                stream.read(&mut buf).await
            })
        };
        tokio::task::yield_now().await;

        // The peer never answers, so the handshake is abandoned mid-flight.
        let first = tokio::time::timeout(Duration::from_millis(50), stream.dispose()).await;
        assert!(first.is_err());
        assert_eq!(stream.state(), TransportState::Aborted);
        assert!(matches!(
            stream.write(b"x").await,
            Err(StreamError::Disposed)
        ));

        assert_eq!(reader.await.unwrap().unwrap(), 0);
        stream.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn dispose_releases_even_when_handshake_fails() {
        let mock = MockTransport::new();
        mock.fail_next_close(TransportError::ConnectionReset);
        let stream = stream_over(&mock);

        let err = stream.dispose().await.unwrap_err();
        assert!(matches!(
            err,
            StreamError::Transport(TransportError::ConnectionReset)
        ));
        assert_eq!(mock.release_count(), 1);
        assert!(stream.dispose().await.is_ok());
        assert_eq!(mock.close_count(), 1);
    }

    #[tokio::test]
    async fn use_after_dispose() {
        let mock = MockTransport::new();
        let stream = stream_over(&mock);
        stream.dispose().await.unwrap();

        let mut buf = [0u8; 4];
        assert!(matches!(
            stream.read(&mut buf).await,
            Err(StreamError::Disposed)
        ));
        assert!(matches!(
            stream.write(b"x").await,
            Err(StreamError::Disposed)
        ));
        stream.close_write().await.unwrap();
        assert_eq!(mock.close_output_count(), 0);
        assert_eq!(mock.send_count(), 0);
    }

    #[tokio::test]
    async fn drop_without_dispose_releases_once() {
        let mock = MockTransport::new();
        drop(stream_over(&mock));
        assert_eq!(mock.release_count(), 1);
        assert_eq!(mock.close_count(), 0);
    }

    #[tokio::test]
    async fn end_to_end_scenario() {
        let mock = MockTransport::new();
        let stream = stream_over(&mock);

        stream.write(&[0x41, 0x42]).await.unwrap();
        assert_eq!(mock.send_count(), 1);

        mock.push_close(NORMAL_CLOSURE, "");
        let mut buf = [0u8; 10];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
        assert_eq!(mock.close_output_count(), 1);
        assert_eq!(mock.state(), TransportState::CloseReceived);

        stream.dispose().await.unwrap();
        assert_eq!(mock.close_count(), 1);
        assert_eq!(mock.release_count(), 1);

        stream.dispose().await.unwrap();
        assert_eq!(mock.close_count(), 1);
        assert_eq!(mock.release_count(), 1);

        let calls = mock.calls();
        let close_at = calls
            .iter()
            .position(|c| matches!(c, Call::Close { status: NORMAL_CLOSURE, .. }))
            .unwrap();
        let release_at = calls.iter().position(|c| *c == Call::Release).unwrap();
        assert!(close_at < release_at);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_never_overlap() {
        let mock = MockTransport::new();
        mock.set_send_delay(Duration::from_millis(2));
        let stream = Arc::new(stream_over(&mock));

        let writers: Vec<_> = (0..16u8)
            .map(|i| {
                let stream = Arc::clone(&stream);
                tokio::spawn(async move {
                    let payload = vec![i; 64 + usize::from(i)];
                    stream.write(&payload).await
                })
            })
            .collect();
        for writer in futures_util::future::join_all(writers).await {
            writer.unwrap().unwrap();
        }

        assert_eq!(mock.max_sends_in_flight(), 1);
        let mut sent = mock.sent();
        assert_eq!(sent.len(), 16);
        sent.sort_by_key(|msg| msg[0]);
        for (i, msg) in sent.iter().enumerate() {
            assert_eq!(msg.len(), 64 + i);
            assert!(msg.iter().all(|b| usize::from(*b) == i));
        }
    }

    #[tokio::test]
    async fn dropped_write_releases_lock() {
        let mock = MockTransport::new();
        mock.pause_sends();
        let stream = Arc::new(stream_over(&mock));

        let stuck = {
            let stream = Arc::clone(&stream);
            tokio::spawn(async move { stream.write(b"stuck").await })
        };
        tokio::task::yield_now().await;
        stuck.abort();
        assert!(stuck.await.unwrap_err().is_cancelled());

        mock.resume_sends();
        stream.write(b"next").await.unwrap();
        assert_eq!(mock.sent(), vec![bytes::Bytes::from_static(b"next")]);
    }

    #[tokio::test]
    async fn waiting_writer_fails_after_dispose() {
        let mock = MockTransport::new();
        mock.pause_sends();
        let stream = Arc::new(stream_over(&mock));

        let holder = {
            let stream = Arc::clone(&stream);
            tokio::spawn(async move { stream.write(b"first").await })
        };
        tokio::task::yield_now().await;
        let waiter = {
            let stream = Arc::clone(&stream);
            tokio::spawn(async move { stream.write(b"second").await })
        };
        tokio::task::yield_now().await;

        stream.dispose().await.unwrap();
        assert!(matches!(
            waiter.await.unwrap(),
            Err(StreamError::Disposed)
        ));

        mock.resume_sends();
        holder.await.unwrap().unwrap();
        assert_eq!(mock.sent(), vec![bytes::Bytes::from_static(b"first")]);
    }

    #[tokio::test(start_paused = true)]
    async fn read_timeout() {
        let mock = MockTransport::new();
        let stream = DuplexMessageStream::with_config(
            mock.clone(),
            StreamConfig {
                read_timeout: Some(Duration::from_millis(50)),
                ..StreamConfig::default()
            },
        );

        let mut buf = [0u8; 4];
        let err = stream.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, StreamError::Timeout { op: "read", .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn write_timeout_covers_lock_wait() {
        let mock = MockTransport::new();
        mock.pause_sends();
        let stream = Arc::new(DuplexMessageStream::with_config(
            mock.clone(),
            StreamConfig {
                write_timeout: Some(Duration::from_millis(50)),
                ..StreamConfig::default()
            },
        ));

        let first = {
            let stream = Arc::clone(&stream);
            tokio::spawn(async move { stream.write(b"a").await })
        };
        let second = stream.write(b"b").await;
        assert!(matches!(second, Err(StreamError::Timeout { op: "write", .. })));
        assert!(matches!(
            first.await.unwrap(),
            Err(StreamError::Timeout { .. })
        ));
        assert_eq!(mock.send_count(), 0);
    }

    #[tokio::test]
    async fn cancellation_token_cancels_pending_read() {
        let mock = MockTransport::new();
        let token = CancellationToken::new();
        let stream = Arc::new(DuplexMessageStream::with_config(
            mock.clone(),
            StreamConfig {
                cancellation: Some(token.clone()),
                ..StreamConfig::default()
            },
        ));

        let reader = {
            let stream = Arc::clone(&stream);
            tokio::spawn(async move {
                let mut buf = [0u8; 4];
                stream.read(&mut buf).await
            })
        };
        tokio::task::yield_now().await;
        token.cancel();

        assert!(matches!(
            reader.await.unwrap(),
            Err(StreamError::Cancelled("read"))
        ));

        // Dispose still runs after cancellation.
        stream.dispose().await.unwrap();
        assert_eq!(mock.close_count(), 1);
        assert_eq!(mock.release_count(), 1);
    }
}
