//! Request ID middleware for request correlation
//!
//! Every request runs inside a tracing span carrying its request id, so the
//! adviser's structured events can be tied back to one HTTP call.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

/// Request ID header name
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request ID wrapper type for Axum extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Generate a new random request ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Reuse a caller-supplied id when it is a valid UUID
    pub fn from_header(value: Option<&HeaderValue>) -> Option<Self> {
        let raw = value?.to_str().ok()?;
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attach a request ID to each request and echo it in the response
///
/// An incoming `x-request-id` that parses as a UUID is kept; anything else
/// is replaced by a fresh UUID v4.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = RequestId::from_header(request.headers().get(REQUEST_ID_HEADER))
        .unwrap_or_default();

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %request.method(),
        uri = %request.uri(),
    );

    request.extensions_mut().insert(request_id);

    let mut response = next.run(request).instrument(span).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id.to_string()) {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER, header_value);
    }

    response
}
