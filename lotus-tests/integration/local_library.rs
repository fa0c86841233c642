//! End-to-end streaming from files on disk

use std::sync::Arc;

use lotus_core::config::StreamingConfig;
use lotus_core::storage::{FileLibrary, PrivateVideos};
use reqwest::header;

use crate::support::TestServer;

fn movie_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

#[tokio::test]
async fn test_scanned_library_serves_ranges_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let data = movie_bytes(2 * 1024 * 1024);
    let path = dir.path().join("trailer.webm");
    tokio::fs::write(&path, &data).await.unwrap();

    let library = Arc::new(FileLibrary::new());
    assert_eq!(library.scan_directory(dir.path()).await.unwrap(), 1);
    let id = library.entries()[0].id.clone();
    let server = TestServer::start(library).await;

    let response = reqwest::Client::new()
        .get(server.url(&format!("/stream/{id}")))
        .header(header::RANGE, "bytes=1000000-1999999")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 206);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/webm");
    assert_eq!(
        response.headers()[header::CONTENT_RANGE],
        format!("bytes 1000000-1999999/{}", data.len()).as_str()
    );
    assert_eq!(response.bytes().await.unwrap().as_ref(), &data[1_000_000..2_000_000]);
}

#[tokio::test]
async fn test_deleted_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gone.mp4");
    tokio::fs::write(&path, movie_bytes(1024)).await.unwrap();

    let library = Arc::new(FileLibrary::new());
    library.register("gone", &path).await.unwrap();
    let server = TestServer::start(library).await;

    tokio::fs::remove_file(&path).await.unwrap();
    let response = reqwest::get(server.url("/stream/gone")).await.unwrap();

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn test_private_video_needs_owner_token() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("home.mp4");
    tokio::fs::write(&path, movie_bytes(4096)).await.unwrap();

    let library = Arc::new(FileLibrary::new());
    library.register("home", &path).await.unwrap();
    let policy = PrivateVideos::new();
    policy.restrict("home", "family-token");
    let server = TestServer::start_with(
        library,
        Arc::new(policy),
        StreamingConfig {
            hide_denied: false,
            ..StreamingConfig::default()
        },
    )
    .await;
    let client = reqwest::Client::new();

    let response = client.get(server.url("/stream/home")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = client
        .get(server.url("/stream/home"))
        .bearer_auth("family-token")
        .header(header::RANGE, "bytes=0-1023")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 206);
    assert_eq!(response.bytes().await.unwrap().len(), 1024);
    assert_eq!(server.stats.snapshot().denied, 1);
}
