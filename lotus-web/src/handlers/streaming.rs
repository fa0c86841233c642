//! Stream endpoint handlers

use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, header};
use axum::response::Response;
use lotus_core::storage::Requester;
use lotus_core::streaming::StreamRequest;

use crate::server::AppState;

/// Serves `GET`/`HEAD /stream/{id}` and its `/video/{id}` alias.
///
/// axum routes HEAD to this handler as well; the engine then composes
/// headers without opening a cursor.
pub async fn stream_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let mut request = StreamRequest::new(id);
    request.range = headers
        .get(header::RANGE)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());
    request.requester = bearer_token(&headers).map(Requester::from);
    request.head_only = method == Method::HEAD;

    state.engine.serve(request).await
}

/// Extracts the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
