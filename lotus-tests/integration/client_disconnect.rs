//! Clients abandoning a transfer mid-stream

use std::sync::Arc;
use std::time::Duration;

use lotus_core::config::StreamingConfig;
use lotus_core::storage::AllowAll;
use lotus_core::storage::test_fixtures::{MemoryCatalog, MemorySource};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::support::{EventCounter, TestServer, eventually};

const MOVIE_LEN: usize = 64 * 1024 * 1024;

async fn movie_server(config: StreamingConfig) -> (TestServer, MemorySource) {
    let source = MemorySource::sequential(MOVIE_LEN);
    let catalog = MemoryCatalog::new();
    catalog.insert("movie", source.clone());
    let server = TestServer::start_with(Arc::new(catalog), Arc::new(AllowAll), config).await;
    (server, source)
}

async fn read_some_then_close(server: &TestServer, request: &str, keep: usize) {
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut buf = vec![0u8; 16 * 1024];
    let mut received = 0;
    while received < keep {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "server closed the connection early");
        received += n;
    }
    drop(stream);
}

#[tokio::test]
async fn test_disconnect_releases_cursor() {
    let source = MemorySource::sequential(MOVIE_LEN);
    let catalog = MemoryCatalog::new();
    catalog.insert("movie", source.clone());
    let server = TestServer::start_with(
        Arc::new(catalog),
        Arc::new(AllowAll),
        StreamingConfig {
            read_buffer_size: 64 * 1024,
            ..StreamingConfig::default()
        },
    )
    .await;

    read_some_then_close(
        &server,
        "GET /stream/movie HTTP/1.1\r\nHost: localhost\r\n\r\n",
        256 * 1024,
    )
    .await;

    assert!(eventually(|| source.open_cursors() == 0).await);
    assert!(eventually(|| server.stats.snapshot().client_aborts == 1).await);

    let snapshot = server.stats.snapshot();
    assert_eq!(snapshot.active_transfers, 0);
    assert_eq!(snapshot.completed_transfers, 0);
    assert!(snapshot.bytes_sent < MOVIE_LEN as u64);
    // Backpressure keeps reads close to what the connection accepted.
    assert!(source.bytes_read() < MOVIE_LEN as u64 / 2);
}

#[tokio::test]
async fn test_disconnect_mid_range_leaves_other_viewers_untouched() {
    let source = MemorySource::sequential(MOVIE_LEN);
    let catalog = MemoryCatalog::new();
    catalog.insert("movie", source.clone());
    let server = TestServer::start(Arc::new(catalog)).await;

    read_some_then_close(
        &server,
        "GET /stream/movie HTTP/1.1\r\nHost: localhost\r\nRange: bytes=1048576-\r\n\r\n",
        128 * 1024,
    )
    .await;

    let body = reqwest::Client::new()
        .get(server.url("/stream/movie"))
        .header(reqwest::header::RANGE, "bytes=0-4095")
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(body.as_ref(), &source.data()[..4096]);

    assert!(eventually(|| source.open_cursors() == 0).await);
    assert!(eventually(|| {
        let snapshot = server.stats.snapshot();
        snapshot.client_aborts == 1 && snapshot.completed_transfers == 1
    })
    .await);
}

#[tokio::test]
async fn test_disconnect_logs_no_errors() {
    let events = EventCounter::default();
    let _subscriber = events.install();
    let (server, source) = movie_server(StreamingConfig::default()).await;

    read_some_then_close(
        &server,
        "GET /stream/movie HTTP/1.1\r\nHost: localhost\r\nRange: bytes=0-\r\n\r\n",
        256 * 1024,
    )
    .await;

    assert!(eventually(|| source.open_cursors() == 0).await);
    assert!(eventually(|| server.stats.snapshot().client_aborts == 1).await);
    assert!(events.total() > 0);
    assert_eq!(events.errors(), 0);
}

#[tokio::test]
async fn test_client_that_never_reads_is_cut_off() {
    let (server, source) = movie_server(StreamingConfig {
        idle_timeout: Duration::from_millis(200),
        ..StreamingConfig::default()
    })
    .await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"GET /stream/movie HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    assert!(eventually(|| source.cursors_opened() == 1).await);
    assert!(eventually(|| source.open_cursors() == 0).await);

    let snapshot = server.stats.snapshot();
    assert_eq!(snapshot.stalled_clients, 1);
    assert_eq!(snapshot.active_transfers, 0);
    assert_eq!(snapshot.completed_transfers, 0);
    assert!(source.bytes_read() < MOVIE_LEN as u64);
    drop(stream);
}
