//! Integration tests for Lotus
//!
//! These tests run the streaming engine behind a real HTTP listener and
//! exercise it the way browsers and players do: ranged seeks, concurrent
//! viewers, abandoned connections and failing storage.

#[path = "integration/support.rs"]
mod support;

#[path = "integration/client_disconnect.rs"]
mod client_disconnect;
#[path = "integration/concurrent_streams.rs"]
mod concurrent_streams;
#[path = "integration/local_library.rs"]
mod local_library;
#[path = "integration/range_semantics.rs"]
mod range_semantics;
#[path = "integration/storage_failures.rs"]
mod storage_failures;
