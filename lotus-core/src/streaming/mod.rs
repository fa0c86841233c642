//! HTTP byte-range streaming of stored video.
//!
//! The pipeline for one request is parse (`range`) → validate (`range`) →
//! compose headers (`response`) → move bytes (`transfer`), driven by
//! [`StreamEngine`]. Byte sources are reached only through the
//! [`ByteSource`] trait, so the engine is agnostic to where content lives.

pub mod engine;
pub mod range;
pub mod response;
pub mod source;
pub mod stats;
pub mod transfer;

pub use engine::{StreamEngine, StreamError, StreamOutcome, StreamRequest};
pub use range::{
    ByteRangeSpec, RangeNotSatisfiable, RangeParseError, RangeRequest, ResolvedRange, ServeWindow,
    parse_range_header, resolve_range,
};
pub use source::{ByteCursor, ByteSource, SourceError, SourceResult};
pub use stats::{StatsSnapshot, StreamStats};
pub use transfer::{Transfer, TransferSettings};
