//! File-backed byte source.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncSeekExt;

use crate::streaming::source::{ByteCursor, ByteSource, SourceError, SourceResult};

/// Byte source over a file on local disk.
///
/// Length and MIME type are captured when the source is opened. Every
/// cursor opens its own file handle, so concurrent readers never share a
/// seek position.
#[derive(Debug, Clone)]
pub struct LocalFileSource {
    path: PathBuf,
    total_length: u64,
    content_type: String,
}

impl LocalFileSource {
    /// Opens `path`, reading its length from file metadata.
    ///
    /// # Errors
    /// - `std::io::Error` - File is missing or is not a regular file
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, std::io::Error> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let content_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self {
            path,
            total_length: metadata.len(),
            content_type,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ByteSource for LocalFileSource {
    fn total_length(&self) -> u64 {
        self.total_length
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    async fn open_cursor(&self, offset: u64) -> SourceResult<ByteCursor> {
        if offset > self.total_length {
            return Err(SourceError::OffsetOutOfBounds {
                offset,
                total_length: self.total_length,
            });
        }

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        Ok(Box::new(file))
    }
}
