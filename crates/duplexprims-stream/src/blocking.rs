//! `std::io` bridge for synchronous callers.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use duplexprims_transport::MessageTransport;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::{Result, StreamError};
use crate::stream::DuplexMessageStream;

/// Blocking [`Read`] + [`Write`] over a [`DuplexMessageStream`].
///
/// Every call blocks the current thread on the given runtime handle, so this
/// must not be used from inside an async context. Dropping the bridge runs
/// `dispose()`.
pub struct BlockingStream<T: MessageTransport> {
    stream: Arc<DuplexMessageStream<T>>,
    handle: Handle,
}

impl<T: MessageTransport> BlockingStream<T> {
    /// Wrap a stream, driving it on `handle`.
    pub fn new(stream: DuplexMessageStream<T>, handle: Handle) -> Self {
        Self::from_shared(Arc::new(stream), handle)
    }

    /// Wrap a stream that is also used elsewhere.
    pub fn from_shared(stream: Arc<DuplexMessageStream<T>>, handle: Handle) -> Self {
        Self { stream, handle }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &DuplexMessageStream<T> {
        &self.stream
    }

    /// Half-close the output (blocking).
    pub fn close_write(&self) -> Result<()> {
        self.handle.block_on(self.stream.close_write())
    }

    /// Close and release the transport (blocking). Idempotent.
    pub fn dispose(&self) -> Result<()> {
        self.handle.block_on(self.stream.dispose())
    }
}

impl<T: MessageTransport> Read for BlockingStream<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.handle
            .block_on(self.stream.read(buf))
            .map_err(io::Error::from)
    }
}

impl<T: MessageTransport> Write for BlockingStream<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.handle
            .block_on(self.stream.write(buf))
            .map_err(io::Error::from)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: MessageTransport> Seek for BlockingStream<T> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(StreamError::Unsupported("seek").into())
    }
}

impl<T: MessageTransport> Drop for BlockingStream<T> {
    fn drop(&mut self) {
        if self.stream.is_disposed() {
            return;
        }
        if Handle::try_current().is_ok() {
            // Blocking here would panic; the stream releases the transport on drop.
            debug!("blocking stream dropped inside a runtime, skipping close handshake");
            return;
        }
        if let Err(err) = self.handle.block_on(self.stream.dispose()) {
            warn!(error = %err, "dispose failed while dropping blocking stream");
        }
    }
}
