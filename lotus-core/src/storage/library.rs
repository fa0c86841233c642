//! Catalog of local video files.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::local::LocalFileSource;
use super::{CatalogError, VideoCatalog, VideoId};
use crate::streaming::source::ByteSource;

/// Extensions picked up by [`FileLibrary::scan_directory`].
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "mov", "m4v", "avi", "ogv"];

/// Library entry for a local video file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    /// Identifier the file is served under
    pub id: VideoId,
    /// Path to the video file
    pub path: PathBuf,
    /// File size in bytes when the entry was registered
    pub size: u64,
    /// Title derived from the file name
    pub title: String,
}

/// Video catalog backed by files on local disk.
#[derive(Debug, Default)]
pub struct FileLibrary {
    entries: RwLock<HashMap<VideoId, LibraryEntry>>,
}

type ScanFuture<'a> = Pin<Box<dyn Future<Output = Result<usize, std::io::Error>> + Send + 'a>>;

impl FileLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every video file below `dir` under its path-derived id.
    ///
    /// Returns the number of files added.
    ///
    /// # Errors
    /// - `std::io::Error` - `dir` could not be read
    pub async fn scan_directory(&self, dir: &Path) -> Result<usize, std::io::Error> {
        let count = self.scan_directory_recursive(dir).await?;
        debug!("Scanned {}: {} video files", dir.display(), count);
        Ok(count)
    }

    fn scan_directory_recursive<'a>(&'a self, dir: &'a Path) -> ScanFuture<'a> {
        Box::pin(async move {
            let mut count = 0;
            let mut entries = tokio::fs::read_dir(dir).await?;

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    if path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|name| name.starts_with('.'))
                    {
                        continue;
                    }

                    match self.scan_directory_recursive(&path).await {
                        Ok(subcount) => count += subcount,
                        Err(e) => warn!("Failed to scan {}: {}", path.display(), e),
                    }
                } else if file_type.is_file() && is_video_file(&path) {
                    let size = entry.metadata().await?.len();
                    self.insert(path_id(&path), path, size);
                    count += 1;
                }
            }

            Ok(count)
        })
    }

    /// Registers `path` under its path-derived id.
    ///
    /// # Errors
    /// - `std::io::Error` - File metadata could not be read
    pub async fn add_file(&self, path: impl Into<PathBuf>) -> Result<VideoId, std::io::Error> {
        let path = path.into();
        let id = path_id(&path);
        self.register(id.clone(), path).await?;
        Ok(id)
    }

    /// Registers `path` under a caller-chosen id, replacing any previous entry.
    ///
    /// # Errors
    /// - `std::io::Error` - File metadata could not be read
    pub async fn register(
        &self,
        id: impl Into<VideoId>,
        path: impl Into<PathBuf>,
    ) -> Result<LibraryEntry, std::io::Error> {
        let path = path.into();
        let size = tokio::fs::metadata(&path).await?.len();
        Ok(self.insert(id.into(), path, size))
    }

    /// Removes the entry for `id`.
    pub fn remove(&self, id: &VideoId) -> Option<LibraryEntry> {
        self.entries.write().remove(id)
    }

    /// Entry registered under `id`.
    pub fn entry(&self, id: &VideoId) -> Option<LibraryEntry> {
        self.entries.read().get(id).cloned()
    }

    /// All entries, ordered by title.
    pub fn entries(&self) -> Vec<LibraryEntry> {
        let mut entries: Vec<_> = self.entries.read().values().cloned().collect();
        entries.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn insert(&self, id: VideoId, path: PathBuf, size: u64) -> LibraryEntry {
        let entry = LibraryEntry {
            title: title_from_path(&path),
            id: id.clone(),
            path,
            size,
        };
        self.entries.write().insert(id, entry.clone());
        entry
    }
}

#[async_trait]
impl VideoCatalog for FileLibrary {
    async fn resolve(&self, id: &VideoId) -> Result<Arc<dyn ByteSource>, CatalogError> {
        let path = self
            .entry(id)
            .map(|entry| entry.path)
            .ok_or_else(|| CatalogError::NotFound { id: id.clone() })?;

        match LocalFileSource::open(&path).await {
            Ok(source) => Ok(Arc::new(source)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Video {} is registered but {} is missing", id, path.display());
                Err(CatalogError::NotFound { id: id.clone() })
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Whether `path` has one of the [`VIDEO_EXTENSIONS`].
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// Deterministic 16-hex-digit id derived from a file path.
pub fn path_id(path: &Path) -> VideoId {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    VideoId::new(format!("{:016x}", hasher.finish()))
}

fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Untitled")
        .replace(['.', '_'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn touch(path: &Path, len: usize) {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(path, vec![0u8; len]).await.unwrap();
    }

    #[tokio::test]
    async fn test_scan_picks_up_nested_videos_only() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Big_Buck.Bunny.mp4"), 10).await;
        touch(&dir.path().join("series/episode_01.MKV"), 20).await;
        touch(&dir.path().join("notes.txt"), 5).await;
        touch(&dir.path().join(".cache/hidden.mp4"), 5).await;

        let library = FileLibrary::new();
        let count = library.scan_directory(dir.path()).await.unwrap();

        assert_eq!(count, 2);
        let titles: Vec<_> = library.entries().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["Big Buck Bunny", "episode 01"]);
    }

    #[test]
    fn test_path_ids_are_deterministic_hex() {
        let a = path_id(Path::new("/media/a.mp4"));
        assert_eq!(a, path_id(Path::new("/media/a.mp4")));
        assert_ne!(a, path_id(Path::new("/media/b.mp4")));
        assert_eq!(a.as_str().len(), 16);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_resolve_registered_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.webm");
        touch(&path, 64).await;

        let library = FileLibrary::new();
        library.register("clip", &path).await.unwrap();

        let source = library.resolve(&VideoId::from("clip")).await.unwrap();
        assert_eq!(source.total_length(), 64);
        assert_eq!(source.content_type(), "video/webm");
    }

    #[tokio::test]
    async fn test_vanished_file_resolves_to_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        touch(&path, 8).await;

        let library = FileLibrary::new();
        let id = library.add_file(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert!(matches!(
            library.resolve(&id).await,
            Err(CatalogError::NotFound { .. })
        ));
        assert!(matches!(
            library.resolve(&VideoId::from("unknown")).await,
            Err(CatalogError::NotFound { .. })
        ));
    }

    #[test]
    fn test_video_extensions() {
        assert!(is_video_file(Path::new("a.MP4")));
        assert!(is_video_file(Path::new("a.ogv")));
        assert!(!is_video_file(Path::new("a.srt")));
        assert!(!is_video_file(Path::new("mp4")));
    }
}
