mod common;

use std::collections::HashMap;
use std::sync::Arc;

use duplexprims::stream::DuplexIo;
use duplexprims::transport::testing::MemoryTransport;
use duplexprims::DuplexMessageStream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use common::{connected_pair, init_tracing, read_chunks};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_arrive_whole_and_ordered() {
    init_tracing();
    let (client, server) = connected_pair();

    const WRITERS: u8 = 8;
    const PER_WRITER: u8 = 4;

    let writers: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                for seq in 0..PER_WRITER {
                    let mut payload = vec![writer; 32];
                    payload[0] = seq;
                    client.write(&payload).await?;
                }
                Ok::<(), duplexprims::StreamError>(())
            })
        })
        .collect();
    for writer in futures_util::future::join_all(writers).await {
        writer.expect("writer task").expect("write");
    }
    client.close_write().await.expect("half-close");

    let chunks = read_chunks(&server).await;
    assert_eq!(chunks.len(), usize::from(WRITERS * PER_WRITER));

    let mut next_seq: HashMap<u8, u8> = HashMap::new();
    for chunk in &chunks {
        assert_eq!(chunk.len(), 32);
        let writer = chunk[1];
        assert!(chunk[1..].iter().all(|b| *b == writer), "mixed message");
        let expected = next_seq.entry(writer).or_default();
        assert_eq!(chunk[0], *expected, "writer {writer} out of order");
        *expected += 1;
    }
}

#[tokio::test]
async fn tokio_io_copy_until_half_close() {
    init_tracing();
    let (left, right) = MemoryTransport::pair();
    let mut client = DuplexIo::new(DuplexMessageStream::new(left));
    let mut server = DuplexIo::new(DuplexMessageStream::new(right));

    client.write_all(b"hello ").await.expect("write");
    client.write_all(b"world").await.expect("write");
    client.shutdown().await.expect("shutdown half-closes");

    let mut received = Vec::new();
    server
        .read_to_end(&mut received)
        .await
        .expect("read to end");
    assert_eq!(received, b"hello world");

    // The server answered the close; the client sees end of stream too.
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.expect("client drains");
    assert!(rest.is_empty());

    client.get_ref().dispose().await.expect("client dispose");
    server.get_ref().dispose().await.expect("server dispose");
}
