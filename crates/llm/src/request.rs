use axum::http::HeaderMap;

/// Correlation header accepted from clients and forwarded upstream.
/// Lowercase so it can be used directly as a static header name; lookups
/// are case-insensitive either way.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Runtime context for one gateway request.
#[derive(Debug, Clone)]
pub(crate) struct RequestContext {
    /// Client-supplied correlation id, or a fresh one when absent.
    pub correlation_id: String,
}

/// Extract request context from the incoming headers.
pub(crate) fn extract_context(headers: &HeaderMap) -> RequestContext {
    let correlation_id = headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    RequestContext { correlation_id }
}
