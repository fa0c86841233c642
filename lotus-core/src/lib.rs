//! Lotus Core - byte-range video streaming engine
//!
//! This crate turns an HTTP `Range` request for a stored video into a
//! correctly framed 200/206/416 response whose body is streamed from storage
//! with bounded memory and prompt release on client disconnect.

pub mod config;
pub mod storage;
pub mod streaming;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::LotusConfig;
pub use storage::{
    AccessDecision, AccessPolicy, AllowAll, CatalogError, FileLibrary, LocalFileSource,
    PrivateVideos, Requester, VideoCatalog, VideoId,
};
pub use streaming::{StreamEngine, StreamError, StreamRequest, StreamStats};

/// Process-level errors surfaced to the binary.
#[derive(Debug, thiserror::Error)]
pub enum LotusError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {reason}")]
    Server { reason: String },
}

impl LotusError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            LotusError::Catalog(CatalogError::NotFound { id }) => format!("Video {id} not found"),
            LotusError::Catalog(_) => "Media library error occurred".to_string(),
            LotusError::Configuration { reason } => format!("Invalid configuration: {reason}"),
            LotusError::Io(_) => "File system error occurred".to_string(),
            LotusError::Server { reason } => format!("Server error: {reason}"),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(self, LotusError::Configuration { .. })
    }
}

pub type Result<T> = std::result::Result<T, LotusError>;
