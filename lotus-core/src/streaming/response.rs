//! Status line and header composition for stream responses.
//!
//! Every header is decided here, before the first body byte exists. Browsers
//! seek by re-requesting ranges and depend on the exact 200/206 choice and
//! `Content-Range` syntax, so this module is the single place that writes them.

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use super::range::ServeWindow;

/// Fallback advertised when a source reports an unusable MIME type.
const OCTET_STREAM: &str = "application/octet-stream";

/// Value of `Content-Range` for a served window, `None` for full responses.
pub fn content_range(window: &ServeWindow) -> Option<String> {
    match window {
        ServeWindow::Partial(range) => Some(format!(
            "bytes {}-{}/{}",
            range.start(),
            range.end(),
            range.total_length()
        )),
        ServeWindow::Full { .. } => None,
    }
}

/// Value of `Content-Range` on a 416 response.
pub fn unsatisfied_content_range(total_length: u64) -> String {
    format!("bytes */{total_length}")
}

/// Status code for a served window.
pub fn status_for(window: &ServeWindow) -> StatusCode {
    if window.is_partial() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    }
}

/// Headers for a 200/206 response.
pub fn stream_headers(window: &ServeWindow, content_type: &str, cache_max_age: Duration) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type).unwrap_or_else(|_| HeaderValue::from_static(OCTET_STREAM)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(window.content_length()));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::try_from(format!("public, max-age={}", cache_max_age.as_secs()))
            .unwrap_or_else(|_| HeaderValue::from_static("no-cache")),
    );
    if let Some(value) = content_range(window)
        && let Ok(value) = HeaderValue::from_str(&value)
    {
        headers.insert(header::CONTENT_RANGE, value);
    }
    headers
}

/// Builds a 200/206 response around an already-composed body.
pub fn stream_response(
    window: &ServeWindow,
    content_type: &str,
    cache_max_age: Duration,
    body: Body,
) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status_for(window);
    *response.headers_mut() = stream_headers(window, content_type, cache_max_age);
    response
}

/// 416 with `Content-Range: bytes */{total}` and no body.
pub fn range_not_satisfiable(total_length: u64) -> Response {
    let mut response = StatusCode::RANGE_NOT_SATISFIABLE.into_response();
    response.headers_mut().insert(
        header::CONTENT_RANGE,
        HeaderValue::try_from(unsatisfied_content_range(total_length))
            .unwrap_or_else(|_| HeaderValue::from_static("bytes */0")),
    );
    response.headers_mut().insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    response
}

/// Terminal response with a status code and no body.
pub fn empty(status: StatusCode) -> Response {
    status.into_response()
}
