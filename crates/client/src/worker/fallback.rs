//! Synthetic responses returned when the network is unreachable.

use goldcache_core::ProxyResponse;
use http::StatusCode;

/// Placeholder for an unreachable live-data endpoint.
///
/// Status stays 200 so page code that parses JSON sees the `error` field
/// instead of a transport failure.
pub fn live_unavailable(message: &str) -> ProxyResponse {
    let body = serde_json::json!({ "error": message }).to_string();
    ProxyResponse::synthetic(StatusCode::OK, body).with_header("content-type", "application/json")
}

/// Placeholder for an uncached asset that could not be fetched.
pub fn offline(message: &str) -> ProxyResponse {
    ProxyResponse::synthetic(StatusCode::SERVICE_UNAVAILABLE, message.to_string())
        .with_status_text("Service Unavailable")
        .with_header("content-type", "text/plain; charset=utf-8")
}
