//! Request-level orchestration of the range-serving engine.
//!
//! [`StreamEngine::serve`] walks one request through
//! `Received → Parsed → {Validated | RangeRejected} → HeadersSent → Streaming`
//! and always ends in a terminal state with the cursor released.

use std::sync::Arc;

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::Response;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::range::{RangeNotSatisfiable, RangeParseError, ServeWindow, parse_range_header, resolve_range};
use super::response;
use super::source::SourceError;
use super::stats::StreamStats;
use super::transfer::{Transfer, TransferSettings};
use crate::config::{MalformedRangePolicy, StreamingConfig};
use crate::storage::{AccessDecision, AccessPolicy, CatalogError, Requester, VideoCatalog, VideoId};

/// Terminal state of a single stream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Every byte of the window was handed to the connection
    Completed,
    /// The client went away mid-transfer
    ClientDisconnected,
    /// The client stopped reading for longer than the idle timeout
    ClientStalled,
    /// Storage failed after the transfer had started
    SourceFailed,
    /// Catalog lookup failed before any cursor was opened (500)
    ServerError,
    /// Unknown identifier (404)
    NotFound,
    /// Access policy refused the requester
    Denied,
    /// Range did not overlap the content (416)
    RangeRejected,
    /// Unparsable range under the strict policy (400)
    BadRequest,
    /// HEAD request answered without a body
    HeadersOnly,
}

impl StreamOutcome {
    /// Whether this outcome ends a transfer that held a cursor.
    pub fn is_transfer_end(self) -> bool {
        matches!(
            self,
            StreamOutcome::Completed
                | StreamOutcome::ClientDisconnected
                | StreamOutcome::ClientStalled
                | StreamOutcome::SourceFailed
        )
    }
}

/// Reasons a request ends before a body is streamed.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error(transparent)]
    MalformedRange(#[from] RangeParseError),

    #[error(transparent)]
    RangeNotSatisfiable(#[from] RangeNotSatisfiable),

    #[error("Video not found: {id}")]
    NotFound { id: VideoId },

    #[error("Access to video {id} denied")]
    Denied { id: VideoId },

    #[error("Catalog lookup failed: {0}")]
    Catalog(CatalogError),

    #[error("Failed to start transfer: {0}")]
    Source(#[from] SourceError),
}

impl From<CatalogError> for StreamError {
    fn from(error: CatalogError) -> Self {
        match error {
            CatalogError::NotFound { id } => StreamError::NotFound { id },
            other => StreamError::Catalog(other),
        }
    }
}

impl StreamError {
    /// HTTP status for this error. `hide_denied` turns 403 into 404.
    pub fn status_code(&self, hide_denied: bool) -> StatusCode {
        match self {
            StreamError::MalformedRange(_) => StatusCode::BAD_REQUEST,
            StreamError::RangeNotSatisfiable(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            StreamError::NotFound { .. } => StatusCode::NOT_FOUND,
            StreamError::Denied { .. } if hide_denied => StatusCode::NOT_FOUND,
            StreamError::Denied { .. } => StatusCode::FORBIDDEN,
            StreamError::Catalog(_) | StreamError::Source(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Terminal state to record. Source failures are recorded by the transfer itself.
    fn outcome(&self) -> Option<StreamOutcome> {
        match self {
            StreamError::MalformedRange(_) => Some(StreamOutcome::BadRequest),
            StreamError::RangeNotSatisfiable(_) => Some(StreamOutcome::RangeRejected),
            StreamError::NotFound { .. } => Some(StreamOutcome::NotFound),
            StreamError::Denied { .. } => Some(StreamOutcome::Denied),
            StreamError::Catalog(_) => Some(StreamOutcome::ServerError),
            StreamError::Source(_) => None,
        }
    }
}

/// One incoming stream request.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// Identifier of the requested video
    pub id: VideoId,
    /// Raw `Range` header value, if any
    pub range: Option<String>,
    /// Identity of the caller as established by the authentication layer
    pub requester: Option<Requester>,
    /// HEAD request: compose headers, never open a cursor
    pub head_only: bool,
}

impl StreamRequest {
    /// GET request without range or requester.
    pub fn new(id: impl Into<VideoId>) -> Self {
        Self {
            id: id.into(),
            range: None,
            requester: None,
            head_only: false,
        }
    }

    /// Sets the raw `Range` header.
    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }

    /// Sets the requester identity.
    pub fn with_requester(mut self, requester: impl Into<Requester>) -> Self {
        self.requester = Some(requester.into());
        self
    }

    /// Turns the request into a HEAD request.
    pub fn head(mut self) -> Self {
        self.head_only = true;
        self
    }
}

/// Range-serving engine over a catalog and an access policy.
///
/// Cheap to share: every request resolves and opens its own byte source
/// cursor, and the only shared state is [`StreamStats`].
pub struct StreamEngine {
    catalog: Arc<dyn VideoCatalog>,
    policy: Arc<dyn AccessPolicy>,
    config: StreamingConfig,
    stats: Arc<StreamStats>,
}

impl StreamEngine {
    /// Creates an engine with fresh statistics.
    pub fn new(
        catalog: Arc<dyn VideoCatalog>,
        policy: Arc<dyn AccessPolicy>,
        config: StreamingConfig,
    ) -> Self {
        Self {
            catalog,
            policy,
            config,
            stats: Arc::new(StreamStats::new()),
        }
    }

    /// Statistics shared by every transfer of this engine.
    pub fn stats(&self) -> &Arc<StreamStats> {
        &self.stats
    }

    /// Streaming configuration in effect.
    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Serves one request, returning a response whose body (if any) streams
    /// the resolved window.
    pub async fn serve(&self, request: StreamRequest) -> Response {
        self.stats.record_request();
        let span = info_span!("stream", transfer = %Uuid::new_v4(), video = %request.id);

        match self.prepare(&request, span.clone()).instrument(span.clone()).await {
            Ok(response) => response,
            Err(e) => span.in_scope(|| self.reject(e)),
        }
    }

    async fn prepare(&self, request: &StreamRequest, span: Span) -> Result<Response, StreamError> {
        if let AccessDecision::Denied = self.policy.check(&request.id, request.requester.as_ref()).await {
            return Err(StreamError::Denied {
                id: request.id.clone(),
            });
        }

        let source = self.catalog.resolve(&request.id).await?;
        let total_length = source.total_length();

        let range_request = match parse_range_header(request.range.as_deref()) {
            Ok(parsed) => parsed,
            Err(e) => match self.config.malformed_range_policy {
                MalformedRangePolicy::Lenient => {
                    debug!("Ignoring unusable range header: {}", e);
                    None
                }
                MalformedRangePolicy::Strict => return Err(e.into()),
            },
        };

        let mut window = resolve_range(range_request.as_ref(), total_length)?;
        if let (Some(cap), ServeWindow::Partial(range)) = (self.config.open_range_cap, window)
            && range_request.as_ref().is_some_and(|r| r.is_open_ended())
        {
            window = ServeWindow::Partial(range.capped(cap));
        }

        info!(
            "Serving {} bytes of {} ({})",
            window.content_length(),
            total_length,
            response::content_range(&window).unwrap_or_else(|| "full".to_string())
        );

        let content_type = source.content_type().to_string();
        let cache_max_age = self.config.cache_max_age;

        if request.head_only {
            self.stats.record_outcome(StreamOutcome::HeadersOnly);
            return Ok(response::stream_response(&window, &content_type, cache_max_age, Body::empty()));
        }

        let Some(range) = window.range() else {
            return Ok(response::stream_response(&window, &content_type, cache_max_age, Body::empty()));
        };

        let transfer = Transfer::open(
            source.as_ref(),
            range,
            TransferSettings::from(&self.config),
            self.stats.clone(),
            span,
        )
        .await?;

        let body = Body::from_stream(transfer.into_stream());
        Ok(response::stream_response(&window, &content_type, cache_max_age, body))
    }

    fn reject(&self, error: StreamError) -> Response {
        let status = error.status_code(self.config.hide_denied);
        match &error {
            StreamError::RangeNotSatisfiable(_) | StreamError::NotFound { .. } | StreamError::MalformedRange(_) => {
                debug!("Rejected with {}: {}", status, error)
            }
            StreamError::Denied { .. } => info!("Rejected with {}: {}", status, error),
            StreamError::Catalog(_) => warn!("Rejected with {}: {}", status, error),
            StreamError::Source(_) => error!("Rejected with {}: {}", status, error),
        }
        if let Some(outcome) = error.outcome() {
            self.stats.record_outcome(outcome);
        }

        match error {
            StreamError::RangeNotSatisfiable(RangeNotSatisfiable { total_length }) => {
                response::range_not_satisfiable(total_length)
            }
            _ => response::empty(status),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::header;

    use super::*;
    use crate::storage::test_fixtures::{FailureMode, MemoryCatalog, MemorySource};
    use crate::storage::{AllowAll, PrivateVideos};

    fn engine_with(catalog: MemoryCatalog, config: StreamingConfig) -> StreamEngine {
        StreamEngine::new(Arc::new(catalog), Arc::new(AllowAll), config)
    }

    fn engine(source: MemorySource) -> StreamEngine {
        let catalog = MemoryCatalog::new();
        catalog.insert("clip", source);
        engine_with(catalog, StreamingConfig::default())
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_partial_content_scenario() {
        let source = MemorySource::sequential(1000);
        let expected = source.data()[200..300].to_vec();
        let engine = engine(source);

        let response = engine.serve(StreamRequest::new("clip").with_range("bytes=200-299")).await;

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 200-299/1000");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");
        assert_eq!(body_bytes(response).await, expected);
    }

    #[tokio::test]
    async fn test_full_file_without_range() {
        let source = MemorySource::sequential(1000);
        let expected = source.data().to_vec();
        let engine = engine(source);

        let response = engine.serve(StreamRequest::new("clip")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CONTENT_RANGE).is_none());
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "1000");
        assert_eq!(body_bytes(response).await, expected);
        assert_eq!(engine.stats().snapshot().completed_transfers, 1);
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        let engine = engine(MemorySource::sequential(1000));

        let response = engine.serve(StreamRequest::new("clip").with_range("bytes=1000-1010")).await;

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */1000");
        assert!(body_bytes(response).await.is_empty());
        assert_eq!(engine.stats().snapshot().range_rejected, 1);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let engine = engine(MemorySource::sequential(10));
        let response = engine.serve(StreamRequest::new("missing").with_range("bytes=0-")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_source() {
        let engine = engine(MemorySource::new(Vec::new()));

        let response = engine.serve(StreamRequest::new("clip")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "0");
        assert!(body_bytes(response).await.is_empty());

        let response = engine.serve(StreamRequest::new("clip").with_range("bytes=0-")).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */0");
    }

    #[tokio::test]
    async fn test_malformed_range_policies() {
        let lenient = engine(MemorySource::sequential(100));
        let response = lenient.serve(StreamRequest::new("clip").with_range("bytes=0-10,20-30")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");

        let catalog = MemoryCatalog::new();
        catalog.insert("clip", MemorySource::sequential(100));
        let strict = engine_with(
            catalog,
            StreamingConfig {
                malformed_range_policy: MalformedRangePolicy::Strict,
                ..StreamingConfig::default()
            },
        );
        let response = strict.serve(StreamRequest::new("clip").with_range("pages=1-2")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_denied_request_never_touches_source() {
        let source = MemorySource::sequential(100);
        let catalog = MemoryCatalog::new();
        catalog.insert("secret", source.clone());
        let policy = PrivateVideos::new();
        policy.restrict("secret", "owner-token");

        let hidden = StreamEngine::new(
            Arc::new(catalog.clone()),
            Arc::new(policy.clone()),
            StreamingConfig::default(),
        );
        let response = hidden.serve(StreamRequest::new("secret").with_requester("intruder")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let explicit = StreamEngine::new(
            Arc::new(catalog),
            Arc::new(policy),
            StreamingConfig {
                hide_denied: false,
                ..StreamingConfig::default()
            },
        );
        let response = explicit.serve(StreamRequest::new("secret")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(source.cursors_opened(), 0);

        let response = explicit
            .serve(StreamRequest::new("secret").with_requester("owner-token").with_range("bytes=0-9"))
            .await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    }

    #[tokio::test]
    async fn test_head_request_opens_no_cursor() {
        let source = MemorySource::sequential(1000);
        let engine = engine(source.clone());

        let response = engine
            .serve(StreamRequest::new("clip").with_range("bytes=900-").head())
            .await;

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");
        assert_eq!(source.cursors_opened(), 0);
        assert_eq!(engine.stats().snapshot().head_requests, 1);
    }

    #[tokio::test]
    async fn test_priming_failure_is_server_error() {
        let engine = engine(MemorySource::sequential(100).with_failure(FailureMode::FailAfter(0)));
        let response = engine.serve(StreamRequest::new("clip")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let snapshot = engine.stats().snapshot();
        assert_eq!(snapshot.storage_aborts, 1);
        assert_eq!(snapshot.active_transfers, 0);
    }

    struct OfflineCatalog;

    #[async_trait::async_trait]
    impl VideoCatalog for OfflineCatalog {
        async fn resolve(&self, _id: &VideoId) -> Result<Arc<dyn crate::streaming::source::ByteSource>, CatalogError> {
            Err(CatalogError::Unavailable {
                reason: "index offline".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_catalog_outage_is_counted_apart_from_storage() {
        let engine = StreamEngine::new(Arc::new(OfflineCatalog), Arc::new(AllowAll), StreamingConfig::default());

        let response = engine.serve(StreamRequest::new("clip")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let snapshot = engine.stats().snapshot();
        assert_eq!(snapshot.server_errors, 1);
        assert_eq!(snapshot.storage_aborts, 0);
    }

    #[tokio::test]
    async fn test_open_range_cap_shortens_window() {
        let catalog = MemoryCatalog::new();
        catalog.insert("clip", MemorySource::sequential(1000));
        let engine = engine_with(
            catalog,
            StreamingConfig {
                open_range_cap: Some(128),
                ..StreamingConfig::default()
            },
        );

        let response = engine.serve(StreamRequest::new("clip").with_range("bytes=100-")).await;
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 100-227/1000");
        assert_eq!(body_bytes(response).await.len(), 128);

        let response = engine.serve(StreamRequest::new("clip").with_range("bytes=100-899")).await;
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 100-899/1000");
    }
}
