//! In-memory byte sources and catalogs for tests.
//!
//! [`MemorySource`] counts open cursors and bytes read so tests can assert
//! that transfers release their cursor and never over-read, and can inject
//! storage failures at chosen points.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::io::{AsyncRead, ReadBuf};

use super::{CatalogError, VideoCatalog, VideoId};
use crate::streaming::source::{ByteCursor, ByteSource, SourceError, SourceResult};

/// Storage failure injected into every cursor of a [`MemorySource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Reads fail with an I/O error once the cursor has produced `n` bytes
    FailAfter(u64),
    /// Content ends early at this absolute offset
    TruncateAt(u64),
    /// Reads never complete once the cursor has produced `n` bytes
    StallAfter(u64),
}

#[derive(Debug, Default)]
struct Counters {
    open_cursors: AtomicUsize,
    cursors_opened: AtomicUsize,
    bytes_read: AtomicU64,
}

/// Byte source over an in-memory buffer.
///
/// Clones share counters, so a clone handed to a catalog can be inspected
/// through the value the test kept.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
    content_type: String,
    failure: Option<FailureMode>,
    counters: Arc<Counters>,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            content_type: "video/mp4".to_string(),
            failure: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Source whose byte at offset `i` is `i % 256`.
    pub fn sequential(len: usize) -> Self {
        Self::new((0..len).map(|i| (i % 256) as u8).collect::<Vec<u8>>())
    }

    pub fn with_failure(mut self, failure: FailureMode) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Full content, regardless of injected failures.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Cursors currently alive.
    pub fn open_cursors(&self) -> usize {
        self.counters.open_cursors.load(Ordering::SeqCst)
    }

    /// Cursors opened over the lifetime of the source.
    pub fn cursors_opened(&self) -> usize {
        self.counters.cursors_opened.load(Ordering::SeqCst)
    }

    /// Bytes handed out across all cursors.
    pub fn bytes_read(&self) -> u64 {
        self.counters.bytes_read.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    fn total_length(&self) -> u64 {
        self.data.len() as u64
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    async fn open_cursor(&self, offset: u64) -> SourceResult<ByteCursor> {
        if offset > self.total_length() {
            return Err(SourceError::OffsetOutOfBounds {
                offset,
                total_length: self.total_length(),
            });
        }

        self.counters.open_cursors.fetch_add(1, Ordering::SeqCst);
        self.counters.cursors_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryCursor {
            data: self.data.clone(),
            position: offset as usize,
            produced: 0,
            failure: self.failure,
            counters: self.counters.clone(),
        }))
    }
}

struct MemoryCursor {
    data: Bytes,
    position: usize,
    produced: u64,
    failure: Option<FailureMode>,
    counters: Arc<Counters>,
}

impl AsyncRead for MemoryCursor {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut end = self.data.len();
        let mut budget = u64::MAX;
        match self.failure {
            Some(FailureMode::FailAfter(n)) if self.produced >= n => {
                return Poll::Ready(Err(io::Error::other("injected storage failure")));
            }
            Some(FailureMode::StallAfter(n)) if self.produced >= n => return Poll::Pending,
            Some(FailureMode::FailAfter(n)) | Some(FailureMode::StallAfter(n)) => {
                budget = n - self.produced;
            }
            Some(FailureMode::TruncateAt(offset)) => end = end.min(offset as usize),
            None => {}
        }

        let available = end.saturating_sub(self.position);
        let len = buf.remaining().min(available).min(budget.min(usize::MAX as u64) as usize);
        let start = self.position;
        buf.put_slice(&self.data[start..start + len]);

        self.position += len;
        self.produced += len as u64;
        self.counters.bytes_read.fetch_add(len as u64, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) {
        self.counters.open_cursors.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Catalog over in-memory sources.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    sources: Arc<RwLock<HashMap<VideoId, MemorySource>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<VideoId>, source: MemorySource) {
        self.sources.write().insert(id.into(), source);
    }

    pub fn remove(&self, id: &VideoId) -> Option<MemorySource> {
        self.sources.write().remove(id)
    }
}

#[async_trait]
impl VideoCatalog for MemoryCatalog {
    async fn resolve(&self, id: &VideoId) -> Result<Arc<dyn ByteSource>, CatalogError> {
        let source = self
            .sources
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound { id: id.clone() })?;
        Ok(Arc::new(source))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn test_cursor_accounting() {
        let source = MemorySource::sequential(300);
        let mut cursor = source.open_cursor(256).await.unwrap();
        assert_eq!(source.open_cursors(), 1);

        let mut buf = Vec::new();
        cursor.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, (0..44u8).collect::<Vec<_>>());
        assert_eq!(source.bytes_read(), 44);

        drop(cursor);
        assert_eq!(source.open_cursors(), 0);
        assert_eq!(source.cursors_opened(), 1);
    }

    #[tokio::test]
    async fn test_fail_after_limits_each_cursor() {
        let source = MemorySource::sequential(100).with_failure(FailureMode::FailAfter(10));
        let mut cursor = source.open_cursor(0).await.unwrap();
        let mut buf = [0u8; 64];

        assert_eq!(cursor.read(&mut buf).await.unwrap(), 10);
        assert!(cursor.read(&mut buf).await.is_err());
    }

    #[tokio::test]
    async fn test_truncate_at_ends_early() {
        let source = MemorySource::sequential(100).with_failure(FailureMode::TruncateAt(40));
        let mut cursor = source.open_cursor(30).await.unwrap();
        let mut buf = Vec::new();
        cursor.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf.len(), 10);
    }
}
