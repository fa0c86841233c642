//! Byte source abstraction consumed by the streaming engine.
//!
//! A byte source is a fixed-length object on durable storage that can hand
//! out independent sequential cursors. The engine never shares a cursor
//! between requests, so two viewers seeking in the same file never disturb
//! each other's read position.

use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Sequential reader positioned at the offset requested from
/// [`ByteSource::open_cursor`]. Dropping the cursor releases it.
pub type ByteCursor = Box<dyn AsyncRead + Send + Unpin>;

/// Fixed-length, seekable storage object backing a stream.
///
/// `total_length` and `content_type` must not change for the lifetime of the
/// value; the engine reads them once per request.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Total length of the content in bytes.
    fn total_length(&self) -> u64;

    /// MIME type advertised in `Content-Type`.
    fn content_type(&self) -> &str;

    /// Opens a new cursor positioned at `offset`.
    ///
    /// Every call must return an independently positioned cursor.
    ///
    /// # Errors
    ///
    /// - `SourceError::Io` - The underlying storage could not be opened or positioned
    /// - `SourceError::OffsetOutOfBounds` - `offset` lies beyond the end of the content
    async fn open_cursor(&self, offset: u64) -> SourceResult<ByteCursor>;
}

/// Errors raised while reading from a byte source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Underlying storage operation failed
    #[error("Storage I/O error: {source}")]
    Io {
        /// The underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// The source produced fewer bytes than its advertised length
    #[error("Source ended after {delivered} of {expected} bytes")]
    Ended {
        /// Bytes delivered before end of stream
        delivered: u64,
        /// Bytes the window required
        expected: u64,
    },

    /// No read progress within the idle timeout
    #[error("Storage read stalled for {timeout_ms} ms")]
    IdleTimeout {
        /// Configured idle timeout in milliseconds
        timeout_ms: u64,
    },

    /// Cursor requested past the end of the content
    #[error("Offset {offset} exceeds content length {total_length}")]
    OffsetOutOfBounds {
        /// Requested cursor offset
        offset: u64,
        /// Length of the content
        total_length: u64,
    },
}

/// Result type for byte source operations
pub type SourceResult<T> = Result<T, SourceError>;
