//! Concurrent viewers of the same video

use std::sync::Arc;

use futures::future::join_all;
use lotus_core::storage::test_fixtures::{MemoryCatalog, MemorySource};
use reqwest::header;

use crate::support::{TestServer, eventually};

#[tokio::test]
async fn test_concurrent_ranges_use_independent_cursors() {
    let source = MemorySource::sequential(1 << 20);
    let catalog = MemoryCatalog::new();
    catalog.insert("movie", source.clone());
    let server = TestServer::start(Arc::new(catalog)).await;
    let client = reqwest::Client::new();

    let windows: Vec<(u64, u64)> = (0..8).map(|i| (i * 100_000 + 17, i * 100_000 + 65_552)).collect();
    let requests = windows.iter().map(|&(start, end)| {
        let client = client.clone();
        let url = server.url("/stream/movie");
        async move {
            let response = client
                .get(url)
                .header(header::RANGE, format!("bytes={start}-{end}"))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status().as_u16(), 206);
            response.bytes().await.unwrap()
        }
    });
    let bodies = join_all(requests).await;

    for (&(start, end), body) in windows.iter().zip(&bodies) {
        assert_eq!(body.as_ref(), &source.data()[start as usize..=end as usize]);
    }
    assert_eq!(source.cursors_opened(), windows.len());
    assert!(eventually(|| source.open_cursors() == 0).await);

    let snapshot = server.stats.snapshot();
    assert_eq!(snapshot.completed_transfers, windows.len() as u64);
    assert_eq!(snapshot.active_transfers, 0);
}

#[tokio::test]
async fn test_identical_concurrent_requests_get_identical_bodies() {
    let source = MemorySource::sequential(300_000);
    let catalog = MemoryCatalog::new();
    catalog.insert("movie", source.clone());
    let server = TestServer::start(Arc::new(catalog)).await;

    let url = server.url("/stream/movie");
    let fetch = |url: String| async move {
        reqwest::get(url)
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap()
    };
    let (first, second) = tokio::join!(fetch(url.clone()), fetch(url));

    assert_eq!(first, second);
    assert_eq!(first.as_ref(), source.data());
    assert_eq!(source.bytes_read(), 600_000);
}
