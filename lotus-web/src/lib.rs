//! Lotus Web - HTTP front end for the streaming engine
//!
//! Routes `GET`/`HEAD` stream requests into [`lotus_core::StreamEngine`] and
//! exposes transfer statistics as JSON.

pub mod handlers;
pub mod server;

// Re-export main types
pub use server::{AppState, build_router, run_server, serve};
