//! Integration tests for consuming response bodies as async streams.
//!
//! - large body: byte count and chunk ordering survive the chunked path
//! - a read failure surfaces as the last item and ends the stream
//! - handles are released once the stream is exhausted
//!
//! `BodyChunks` is both an `Iterator` and a `Stream`, so stream adapters
//! are called through `StreamExt` explicitly.

use bytes::BytesMut;
use futures_util::StreamExt;
use warpgrid_http_client::{
    Body, ClientConfig, Error, MemoryResponse, MemorySubstrate, RoundTrip, Transport,
};

fn transport_for(response: MemoryResponse) -> Transport<MemorySubstrate> {
    Transport::new(MemorySubstrate::new().with_response(response))
}

fn get() -> http::Request<Body> {
    http::Request::get("http://example.test/stream")
        .body(Body::empty())
        .unwrap()
}

// ── Large body ──────────────────────────────────────────────────────

#[tokio::test]
async fn streaming_4mb_body_keeps_byte_count_and_ordering() {
    let chunk_size = 1024;
    let total_chunks: usize = 4 * 1024;

    // Each host chunk carries its index in the first 4 bytes.
    let host_chunks: Vec<Vec<u8>> = (0..total_chunks)
        .map(|i| {
            let mut chunk = vec![0u8; chunk_size];
            chunk[0..4].copy_from_slice(&(i as u32).to_le_bytes());
            chunk
        })
        .collect();

    let transport = transport_for(MemoryResponse::new(200).chunks(host_chunks));
    let response = transport.round_trip(get()).unwrap();
    let mut stream = response.into_body().chunks(chunk_size);

    let mut body = BytesMut::new();
    let mut seen = 0;
    while let Some(chunk) = StreamExt::next(&mut stream).await {
        let chunk = chunk.unwrap();
        assert!(chunk.len() <= chunk_size);
        body.extend_from_slice(&chunk);
        seen += 1;
    }

    assert_eq!(seen, total_chunks);
    assert_eq!(body.len(), 4 * 1024 * 1024);
    for i in 0..total_chunks {
        let offset = i * chunk_size;
        let chunk_id = u32::from_le_bytes(body[offset..offset + 4].try_into().unwrap());
        assert_eq!(chunk_id, i as u32, "chunk {i} out of order");
    }
    assert_eq!(transport.substrate().ledger().outstanding(), 0);
}

#[tokio::test]
async fn configured_chunk_size_splits_host_chunks() {
    let config = ClientConfig::default().with_chunk_size(3);
    let transport = Transport::with_config(
        MemorySubstrate::new().with_response(MemoryResponse::new(200).body("abcdefgh")),
        config,
    );
    assert_eq!(transport.config().chunk_size, 3);

    let body = transport.round_trip(get()).unwrap().into_body();
    let chunks: Vec<_> = StreamExt::map(body.stream(), |chunk| chunk.unwrap())
        .collect()
        .await;

    assert_eq!(chunks, vec!["abc", "def", "gh"]);
}

// ── Failure ─────────────────────────────────────────────────────────

#[tokio::test]
async fn read_failure_ends_stream_with_error() {
    let transport = transport_for(
        MemoryResponse::new(200)
            .chunks(["first", "second"])
            .read_failure("connection reset by peer"),
    );
    let body = transport.round_trip(get()).unwrap().into_body();
    let items: Vec<_> = StreamExt::collect(body.chunks(64)).await;

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].as_ref().unwrap(), "first");
    assert_eq!(items[1].as_ref().unwrap(), "second");
    match &items[2] {
        Err(Error::BodyRead(diagnostic)) => assert_eq!(diagnostic, "connection reset by peer"),
        other => panic!("expected a read error, got {other:?}"),
    }
    assert_eq!(transport.substrate().ledger().outstanding(), 0);
}

#[tokio::test]
async fn dropping_stream_early_releases_handles() {
    let transport = transport_for(MemoryResponse::new(200).chunks(["a", "b", "c"]));
    let body = transport.round_trip(get()).unwrap().into_body();
    let mut stream = body.chunks(1);

    assert_eq!(StreamExt::next(&mut stream).await.unwrap().unwrap(), "a");
    assert!(transport.substrate().ledger().outstanding() > 0);

    drop(stream);
    assert_eq!(transport.substrate().ledger().outstanding(), 0);
}
