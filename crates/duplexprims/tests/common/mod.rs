use std::sync::Arc;

use duplexprims::transport::testing::MemoryTransport;
use duplexprims::DuplexMessageStream;
use tracing_subscriber::EnvFilter;

/// Route library events to the test harness; set `RUST_LOG=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_target(false)
        .try_init();
}

pub type MemoryStream = Arc<DuplexMessageStream<MemoryTransport>>;

/// Two streams over a connected in-memory transport pair.
pub fn connected_pair() -> (MemoryStream, MemoryStream) {
    let (left, right) = MemoryTransport::pair();
    (
        Arc::new(DuplexMessageStream::new(left)),
        Arc::new(DuplexMessageStream::new(right)),
    )
}

/// Read until end of stream, collecting each read's bytes separately.
pub async fn read_chunks(stream: &MemoryStream) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        let n = stream.read(&mut buf).await.expect("read should succeed");
        if n == 0 {
            return chunks;
        }
        chunks.push(buf[..n].to_vec());
    }
}
