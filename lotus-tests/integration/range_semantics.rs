//! Status codes, headers and bytes for the range forms players send

use std::sync::Arc;

use axum::http::StatusCode;
use lotus_core::config::{MalformedRangePolicy, StreamingConfig};
use lotus_core::storage::AllowAll;
use lotus_core::storage::test_fixtures::{MemoryCatalog, MemorySource};
use lotus_core::streaming::{StreamEngine, StreamRequest};
use proptest::prelude::*;
use reqwest::header;

use crate::support::TestServer;

async fn server_with_clip(len: usize) -> (TestServer, MemorySource) {
    let source = MemorySource::sequential(len);
    let catalog = MemoryCatalog::new();
    catalog.insert("clip", source.clone());
    (TestServer::start(Arc::new(catalog)).await, source)
}

async fn get(server: &TestServer, range: Option<&str>) -> reqwest::Response {
    let mut request = reqwest::Client::new().get(server.url("/stream/clip"));
    if let Some(range) = range {
        request = request.header(header::RANGE, range);
    }
    request.send().await.unwrap()
}

#[tokio::test]
async fn test_bounded_range_returns_exact_slice() {
    let (server, source) = server_with_clip(1000).await;

    let response = get(&server, Some("bytes=200-299")).await;

    assert_eq!(response.status().as_u16(), StatusCode::PARTIAL_CONTENT.as_u16());
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 200-299/1000");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");
    assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(response.bytes().await.unwrap().as_ref(), &source.data()[200..300]);
}

#[tokio::test]
async fn test_no_range_returns_whole_file() {
    let (server, source) = server_with_clip(1000).await;

    let response = get(&server, None).await;

    assert_eq!(response.status().as_u16(), 200);
    assert!(response.headers().get(header::CONTENT_RANGE).is_none());
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "1000");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=3600");
    assert_eq!(response.bytes().await.unwrap().as_ref(), source.data());
}

#[tokio::test]
async fn test_open_ended_and_suffix_ranges() {
    let (server, source) = server_with_clip(1000).await;

    let response = get(&server, Some("bytes=900-")).await;
    assert_eq!(response.status().as_u16(), 206);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 900-999/1000");
    assert_eq!(response.bytes().await.unwrap().as_ref(), &source.data()[900..]);

    let response = get(&server, Some("bytes=-50")).await;
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 950-999/1000");
    assert_eq!(response.bytes().await.unwrap().len(), 50);

    let response = get(&server, Some("bytes=-5000")).await;
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-999/1000");

    let response = get(&server, Some("bytes=990-5000")).await;
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 990-999/1000");
    assert_eq!(response.bytes().await.unwrap().len(), 10);
}

#[tokio::test]
async fn test_range_covering_whole_file_is_still_partial() {
    let (server, _source) = server_with_clip(1000).await;

    let response = get(&server, Some("bytes=0-")).await;

    assert_eq!(response.status().as_u16(), 206);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-999/1000");
}

#[tokio::test]
async fn test_unsatisfiable_ranges() {
    let (server, source) = server_with_clip(1000).await;

    for range in ["bytes=1000-1010", "bytes=5000-", "bytes=-0", "bytes=500-400"] {
        let response = get(&server, Some(range)).await;
        assert_eq!(response.status().as_u16(), 416, "range {range}");
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */1000");
        assert!(response.bytes().await.unwrap().is_empty());
    }

    assert_eq!(source.cursors_opened(), 0);
    assert_eq!(server.stats.snapshot().range_rejected, 4);
}

#[tokio::test]
async fn test_malformed_range_is_ignored_by_default() {
    let (server, _source) = server_with_clip(100).await;

    for range in ["bytes=0-10,20-30", "items=0-1", "bytes=abc-", "bytes="] {
        let response = get(&server, Some(range)).await;
        assert_eq!(response.status().as_u16(), 200, "range {range}");
        assert_eq!(response.bytes().await.unwrap().len(), 100);
    }
}

#[tokio::test]
async fn test_malformed_range_rejected_when_strict() {
    let catalog = MemoryCatalog::new();
    catalog.insert("clip", MemorySource::sequential(100));
    let server = TestServer::start_with(
        Arc::new(catalog),
        Arc::new(AllowAll),
        StreamingConfig {
            malformed_range_policy: MalformedRangePolicy::Strict,
            ..StreamingConfig::default()
        },
    )
    .await;

    let response = get(&server, Some("bytes=0-10,20-30")).await;
    assert_eq!(response.status().as_u16(), 400);

    let response = get(&server, Some("bytes=0-10")).await;
    assert_eq!(response.status().as_u16(), 206);
}

#[tokio::test]
async fn test_unknown_video_is_not_found() {
    let (server, _source) = server_with_clip(10).await;

    let response = reqwest::get(server.url("/stream/does-not-exist")).await.unwrap();

    assert_eq!(response.status().as_u16(), 404);
    assert_eq!(server.stats.snapshot().not_found, 1);
}

#[tokio::test]
async fn test_head_matches_get_headers() {
    let (server, source) = server_with_clip(1000).await;
    let client = reqwest::Client::new();

    let response = client
        .head(server.url("/video/clip"))
        .header(header::RANGE, "bytes=100-199")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 206);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 100-199/1000");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");
    assert_eq!(source.cursors_opened(), 0);
}

fn clip_engine(len: usize) -> (StreamEngine, MemorySource) {
    let source = MemorySource::sequential(len);
    let catalog = MemoryCatalog::new();
    catalog.insert("clip", source.clone());
    let config = StreamingConfig {
        read_buffer_size: 97,
        ..StreamingConfig::default()
    };
    (StreamEngine::new(Arc::new(catalog), Arc::new(AllowAll), config), source)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_served_bytes_match_requested_window(
        len in 1usize..4096,
        start_frac in 0.0f64..1.0,
        width in 1u64..5000,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let (engine, source) = clip_engine(len);
        let start = ((len as f64) * start_frac) as u64;
        let end = start + width - 1;

        let (status, body) = runtime.block_on(async {
            let response = engine
                .serve(StreamRequest::new("clip").with_range(format!("bytes={start}-{end}")))
                .await;
            let status = response.status();
            let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, body)
        });

        let last = end.min(len as u64 - 1);
        prop_assert_eq!(status.as_u16(), 206);
        prop_assert_eq!(body.as_ref(), &source.data()[start as usize..=last as usize]);
        prop_assert_eq!(source.open_cursors(), 0);
        prop_assert_eq!(source.bytes_read(), last - start + 1);
    }
}
