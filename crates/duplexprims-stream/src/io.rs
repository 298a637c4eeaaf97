//! `tokio::io` bridge.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use duplexprims_transport::MessageTransport;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::{Result, StreamError};
use crate::stream::DuplexMessageStream;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// [`AsyncRead`] + [`AsyncWrite`] over a shared [`DuplexMessageStream`].
///
/// Each `poll_write` becomes one message; `poll_shutdown` half-closes the
/// output (the read side stays usable). Call `dispose()` on the inner stream
/// for the full close handshake.
pub struct DuplexIo<T: MessageTransport + 'static> {
    stream: Arc<DuplexMessageStream<T>>,
    read: Option<BoxFuture<Result<Bytes>>>,
    /// Bytes received for an earlier, larger read buffer.
    unread: Bytes,
    write: Option<(BoxFuture<Result<()>>, usize)>,
    shutdown: Option<BoxFuture<Result<()>>>,
}

impl<T: MessageTransport + 'static> DuplexIo<T> {
    /// Wrap a stream.
    pub fn new(stream: DuplexMessageStream<T>) -> Self {
        Self::from_shared(Arc::new(stream))
    }

    /// Wrap a stream that is also used elsewhere.
    pub fn from_shared(stream: Arc<DuplexMessageStream<T>>) -> Self {
        Self {
            stream,
            read: None,
            unread: Bytes::new(),
            write: None,
            shutdown: None,
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &DuplexMessageStream<T> {
        &self.stream
    }

    /// Consume the bridge and return the shared stream.
    pub fn into_inner(self) -> Arc<DuplexMessageStream<T>> {
        self.stream
    }
}

impl<T: MessageTransport + 'static> AsyncRead for DuplexIo<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        if this.unread.is_empty() {
            let read = this.read.get_or_insert_with(|| {
                let stream = Arc::clone(&this.stream);
                let capacity = buf.remaining();
                let read: BoxFuture<Result<Bytes>> = Box::pin(async move {
                    let mut scratch = vec![0u8; capacity];
                    let n = stream.read(&mut scratch).await?;
                    scratch.truncate(n);
                    Ok::<Bytes, StreamError>(Bytes::from(scratch))
                });
                read
            });
            let result = ready!(read.as_mut().poll(cx));
            this.read = None;
            this.unread = result?;
        }

        let n = this.unread.len().min(buf.remaining());
        buf.put_slice(&this.unread.split_to(n));
        Poll::Ready(Ok(()))
    }
}

impl<T: MessageTransport + 'static> AsyncWrite for DuplexIo<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let (write, len) = this.write.get_or_insert_with(|| {
            let stream = Arc::clone(&this.stream);
            let data = buf.to_vec();
            let len = data.len();
            let write: BoxFuture<Result<()>> = Box::pin(async move { stream.write(&data).await });
            (write, len)
        });
        let result = ready!(write.as_mut().poll(cx));
        let len = *len;
        this.write = None;
        result?;
        Poll::Ready(Ok(len))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let shutdown = this.shutdown.get_or_insert_with(|| {
            let stream = Arc::clone(&this.stream);
            let shutdown: BoxFuture<Result<()>> =
                Box::pin(async move { stream.close_write().await });
            shutdown
        });
        let result = ready!(shutdown.as_mut().poll(cx));
        this.shutdown = None;
        result?;
        Poll::Ready(Ok(()))
    }
}
