//! Storage failing before and during a transfer

use std::sync::Arc;
use std::time::Duration;

use lotus_core::config::StreamingConfig;
use lotus_core::storage::AllowAll;
use lotus_core::storage::test_fixtures::{FailureMode, MemoryCatalog, MemorySource};

use crate::support::{TestServer, eventually};

async fn server_with(source: MemorySource) -> TestServer {
    let catalog = MemoryCatalog::new();
    catalog.insert("movie", source);
    TestServer::start_with(
        Arc::new(catalog),
        Arc::new(AllowAll),
        StreamingConfig {
            read_buffer_size: 16 * 1024,
            idle_timeout: Duration::from_millis(200),
            ..StreamingConfig::default()
        },
    )
    .await
}

#[tokio::test]
async fn test_failure_before_headers_is_server_error() {
    let source = MemorySource::sequential(100_000).with_failure(FailureMode::FailAfter(0));
    let server = server_with(source.clone()).await;

    let response = reqwest::get(server.url("/stream/movie")).await.unwrap();

    assert_eq!(response.status().as_u16(), 500);
    assert_eq!(source.open_cursors(), 0);
    assert_eq!(server.stats.snapshot().storage_aborts, 1);
}

#[tokio::test]
async fn test_failure_mid_transfer_aborts_connection() {
    let source = MemorySource::sequential(1_000_000).with_failure(FailureMode::FailAfter(100_000));
    let server = server_with(source.clone()).await;

    let response = reqwest::get(server.url("/stream/movie")).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.headers()[reqwest::header::CONTENT_LENGTH], "1000000");
    assert!(response.bytes().await.is_err());

    assert!(eventually(|| source.open_cursors() == 0).await);
    let snapshot = server.stats.snapshot();
    assert_eq!(snapshot.storage_aborts, 1);
    assert_eq!(snapshot.completed_transfers, 0);
    assert_eq!(snapshot.active_transfers, 0);
}

#[tokio::test]
async fn test_truncated_file_never_completes() {
    let source = MemorySource::sequential(500_000).with_failure(FailureMode::TruncateAt(250_000));
    let server = server_with(source).await;

    let response = reqwest::Client::new()
        .get(server.url("/stream/movie"))
        .header(reqwest::header::RANGE, "bytes=200000-")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 206);
    assert!(response.bytes().await.is_err());
    assert!(eventually(|| server.stats.snapshot().storage_aborts == 1).await);
}

#[tokio::test]
async fn test_stalled_storage_times_out() {
    let source = MemorySource::sequential(1_000_000).with_failure(FailureMode::StallAfter(64 * 1024));
    let server = server_with(source.clone()).await;

    let response = reqwest::get(server.url("/stream/movie")).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert!(response.bytes().await.is_err());

    assert!(eventually(|| source.open_cursors() == 0).await);
    assert_eq!(server.stats.snapshot().storage_aborts, 1);
}

#[tokio::test]
async fn test_stall_before_headers_is_server_error() {
    let source = MemorySource::sequential(1_000).with_failure(FailureMode::StallAfter(0));
    let server = server_with(source.clone()).await;

    let response = reqwest::get(server.url("/stream/movie")).await.unwrap();

    assert_eq!(response.status().as_u16(), 500);
    assert_eq!(source.open_cursors(), 0);
}
