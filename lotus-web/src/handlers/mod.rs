//! HTTP request handlers organized by functionality

pub mod api;
pub mod streaming;

// Re-export handler functions
pub use api::{api_health, api_stats};
pub use streaming::{bearer_token, stream_video};
