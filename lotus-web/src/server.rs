//! HTTP server for the Lotus streaming engine
//!
//! Every endpoint is CORS-enabled for any origin. Stream responses are also
//! marked as embeddable cross-origin so `<video>` elements on other sites can play
//! and seek them.

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::routing::get;
use lotus_core::config::LotusConfig;
use lotus_core::storage::{AccessPolicy, VideoCatalog};
use lotus_core::streaming::StreamEngine;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers::{api_health, api_stats, stream_video};

const CROSS_ORIGIN_RESOURCE_POLICY: HeaderName =
    HeaderName::from_static("cross-origin-resource-policy");

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<StreamEngine>,
}

impl AppState {
    pub fn new(engine: StreamEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([header::RANGE, header::AUTHORIZATION])
        .expose_headers([
            header::CONTENT_RANGE,
            header::ACCEPT_RANGES,
            header::CONTENT_LENGTH,
            header::CONTENT_TYPE,
        ])
}

/// Builds the application router.
///
/// `OPTIONS` requests on any route are answered by the CORS layer. Only the
/// stream routes carry `Cross-Origin-Resource-Policy`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/stream/{id}", get(stream_video))
        .route("/video/{id}", get(stream_video))
        .route_layer(SetResponseHeaderLayer::overriding(
            CROSS_ORIGIN_RESOURCE_POLICY,
            HeaderValue::from_static("cross-origin"),
        ))
        .route("/api/stats", get(api_stats))
        .route("/api/health", get(api_health))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the router on an already bound listener until the process stops.
///
/// # Errors
/// - `std::io::Error` - Accepting connections failed
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, build_router(state)).await
}

/// Starts the server described by `config`.
///
/// # Errors
/// - `LotusError::Configuration` - Invalid streaming settings
/// - `LotusError::Io` - Binding or serving failed
pub async fn run_server(
    config: LotusConfig,
    catalog: Arc<dyn VideoCatalog>,
    policy: Arc<dyn AccessPolicy>,
) -> lotus_core::Result<()> {
    config.validate()?;

    let engine = StreamEngine::new(catalog, policy, config.streaming.clone());
    let listener = TcpListener::bind(config.server.bind_address()).await?;
    info!("Lotus streaming server running on http://{}", listener.local_addr()?);

    serve(listener, AppState::new(engine)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use lotus_core::config::StreamingConfig;
    use lotus_core::storage::test_fixtures::{MemoryCatalog, MemorySource};
    use lotus_core::storage::{AllowAll, PrivateVideos};
    use tower::ServiceExt;

    use super::*;

    fn router_with(catalog: MemoryCatalog, policy: Arc<dyn AccessPolicy>) -> Router {
        let engine = StreamEngine::new(Arc::new(catalog), policy, StreamingConfig::default());
        build_router(AppState::new(engine))
    }

    fn router(source: MemorySource) -> Router {
        let catalog = MemoryCatalog::new();
        catalog.insert("clip", source);
        router_with(catalog, Arc::new(AllowAll))
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_range_request_through_router() {
        let source = MemorySource::sequential(1000);
        let expected = source.data()[200..300].to_vec();
        let app = router(source);

        let response = app
            .oneshot(
                Request::get("/stream/clip")
                    .header(header::RANGE, "bytes=200-299")
                    .header(header::ORIGIN, "https://player.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_RANGE], "bytes 200-299/1000");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[CROSS_ORIGIN_RESOURCE_POLICY], "cross-origin");
        let exposed = headers[header::ACCESS_CONTROL_EXPOSE_HEADERS]
            .to_str()
            .unwrap()
            .to_ascii_lowercase();
        assert!(exposed.contains("content-range"));
        assert!(exposed.contains("accept-ranges"));
        assert_eq!(body_bytes(response).await, expected);
    }

    #[tokio::test]
    async fn test_resource_policy_only_on_stream_routes() {
        let app = router(MemorySource::sequential(10));

        let response = app
            .clone()
            .oneshot(Request::head("/video/clip").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers()[CROSS_ORIGIN_RESOURCE_POLICY], "cross-origin");

        let response = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(CROSS_ORIGIN_RESOURCE_POLICY).is_none());
    }

    #[tokio::test]
    async fn test_video_alias_and_unknown_id() {
        let app = router(MemorySource::sequential(10));

        let response = app
            .clone()
            .oneshot(Request::get("/video/clip").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await.len(), 10);

        let response = app
            .oneshot(Request::get("/video/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_head_request_has_headers_only() {
        let source = MemorySource::sequential(500);
        let app = router(source.clone());

        let response = app
            .oneshot(
                Request::head("/stream/clip")
                    .header(header::RANGE, "bytes=-100")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 400-499/500");
        assert!(body_bytes(response).await.is_empty());
        assert_eq!(source.cursors_opened(), 0);
    }

    #[tokio::test]
    async fn test_options_and_preflight() {
        let app = router(MemorySource::sequential(10));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/stream/clip")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/stream/clip")
                    .header(header::ORIGIN, "https://player.example")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "range")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_success());
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let allowed = response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS]
            .to_str()
            .unwrap()
            .to_ascii_lowercase();
        assert!(allowed.contains("range"));
    }

    #[tokio::test]
    async fn test_bearer_token_reaches_access_policy() {
        let catalog = MemoryCatalog::new();
        catalog.insert("private", MemorySource::sequential(10));
        let policy = PrivateVideos::new();
        policy.restrict("private", "owner-token");
        let app = router_with(catalog, Arc::new(policy));

        let response = app
            .clone()
            .oneshot(Request::get("/stream/private").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(
                Request::get("/stream/private")
                    .header(header::AUTHORIZATION, "Bearer owner-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_endpoint_reports_transfers() {
        let app = router(MemorySource::sequential(64));

        let response = app
            .clone()
            .oneshot(Request::get("/stream/clip").body(Body::empty()).unwrap())
            .await
            .unwrap();
        body_bytes(response).await;

        let response = app
            .oneshot(Request::get("/api/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let stats: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(stats["total_requests"], 1);
        assert_eq!(stats["completed_transfers"], 1);
        assert_eq!(stats["bytes_sent"], 64);
    }
}
