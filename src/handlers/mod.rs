pub mod customers;
pub mod messages;
pub mod orders;
pub mod products;

use axum::http::HeaderMap;

/// Client address as reported by the proxy, for audit entries.
pub(crate) fn source_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
}
