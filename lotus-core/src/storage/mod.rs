//! Storage collaborators of the streaming engine.
//!
//! A [`VideoCatalog`] maps video identifiers to byte sources and an
//! [`AccessPolicy`] decides whether a requester may see a video at all.
//! Both are consulted once per request, before any byte is read.

pub mod library;
pub mod local;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
pub use library::{FileLibrary, LibraryEntry};
pub use local::LocalFileSource;
use parking_lot::RwLock;

use crate::streaming::source::ByteSource;

/// Opaque identifier of a video in a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VideoId(String);

impl VideoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VideoId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for VideoId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identity of the caller, established by an external authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requester(String);

impl Requester {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Requester {
    fn from(identity: &str) -> Self {
        Self(identity.to_string())
    }
}

impl From<String> for Requester {
    fn from(identity: String) -> Self {
        Self(identity)
    }
}

/// Errors raised while resolving a video identifier.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// No video is registered under the identifier, or its file is gone
    #[error("Video not found: {id}")]
    NotFound {
        /// Identifier that failed to resolve
        id: VideoId,
    },

    /// Catalog backend cannot answer right now
    #[error("Catalog unavailable: {reason}")]
    Unavailable {
        /// Description of the failure
        reason: String,
    },

    /// Underlying storage operation failed
    #[error("Catalog I/O error: {source}")]
    Io {
        /// The underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

/// Resolves video identifiers to byte sources.
#[async_trait]
pub trait VideoCatalog: Send + Sync {
    /// Looks up the byte source for `id`.
    ///
    /// # Errors
    ///
    /// - `CatalogError::NotFound` - No such video
    /// - `CatalogError::Unavailable` - Backend failure
    /// - `CatalogError::Io` - Storage could not be inspected
    async fn resolve(&self, id: &VideoId) -> Result<Arc<dyn ByteSource>, CatalogError>;
}

/// Result of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    Denied,
}

/// Decides whether a requester may stream a video.
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    async fn check(&self, id: &VideoId, requester: Option<&Requester>) -> AccessDecision;
}

/// Policy that lets everyone stream everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl AccessPolicy for AllowAll {
    async fn check(&self, _id: &VideoId, _requester: Option<&Requester>) -> AccessDecision {
        AccessDecision::Allowed
    }
}

/// Policy where restricted videos are visible only to their owner.
///
/// Videos never passed to [`PrivateVideos::restrict`] are public.
#[derive(Debug, Clone, Default)]
pub struct PrivateVideos {
    owners: Arc<RwLock<HashMap<VideoId, Requester>>>,
}

impl PrivateVideos {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts `id` to `owner`.
    pub fn restrict(&self, id: impl Into<VideoId>, owner: impl Into<Requester>) {
        self.owners.write().insert(id.into(), owner.into());
    }

    /// Makes `id` public again.
    pub fn release(&self, id: &VideoId) {
        self.owners.write().remove(id);
    }
}

#[async_trait]
impl AccessPolicy for PrivateVideos {
    async fn check(&self, id: &VideoId, requester: Option<&Requester>) -> AccessDecision {
        match self.owners.read().get(id) {
            None => AccessDecision::Allowed,
            Some(owner) if requester == Some(owner) => AccessDecision::Allowed,
            Some(_) => AccessDecision::Denied,
        }
    }
}
