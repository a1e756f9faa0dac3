//! HTTP front end for the offline caching proxy.
//!
//! Any request outside `/__worker/` is intercepted and answered by
//! [`OfflineCacheProxy::handle_fetch`]. Two control routes sit beside it:
//! - `POST /__worker/message`: deliver a control message to the worker
//! - `GET /__worker/status`: lifecycle state and cache contents as JSON
//!
//! Only origin-form and absolute-form `http` targets are intercepted.
//! `CONNECT` tunnels are refused with 405: an https exchange inside a tunnel
//! can be neither cached nor answered with a fallback.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use goldcache_client::fetch::{forwardable_headers, resolve};
use goldcache_client::{OfflineCacheProxy, WorkerState};
use goldcache_core::{ProxyRequest, ProxyResponse};
use http::{Method, Request, StatusCode, header};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::error::ServerError;

const CONTROL_PREFIX: &str = "/__worker/";

#[derive(Clone)]
pub struct AppState {
    pub proxy: Arc<OfflineCacheProxy>,
    /// Largest request body accepted for forwarding.
    pub max_body: usize,
}

#[derive(Debug, Serialize)]
struct StatusPayload {
    state: WorkerState,
    controlling: bool,
    cache_name: String,
    buckets: Vec<String>,
    entries: u64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/__worker/message", post(post_message))
        .route("/__worker/status", get(get_status))
        .fallback(intercept)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn intercept(State(state): State<AppState>, request: Request<Body>) -> Result<Response, ServerError> {
    let (parts, body) = request.into_parts();

    if parts.method == Method::CONNECT {
        return Err(ServerError::MethodNotAllowed(format!("CONNECT {}", parts.uri)));
    }

    if parts.uri.path().starts_with(CONTROL_PREFIX) {
        return Err(ServerError::NotFound(parts.uri.path().to_string()));
    }

    let url = resolve(state.proxy.origin(), &parts.uri.to_string())
        .map_err(|e| ServerError::BadRequest(format!("{}: {e}", parts.uri)))?;
    let body = to_bytes(body, state.max_body)
        .await
        .map_err(|e| ServerError::BadRequest(format!("request body: {e}")))?;

    let request = ProxyRequest { method: parts.method, url, headers: forwardable_headers(&parts.headers), body };
    let response = state.proxy.handle_fetch(&request).await?;
    Ok(into_http(response))
}

/// Reply with the proxied response. `Content-Length` is recomputed from the
/// buffered body; `Content-Encoding` is left as the fetcher reported it.
fn into_http(response: ProxyResponse) -> Response {
    let mut headers = forwardable_headers(&response.headers);
    headers.remove(header::CONTENT_LENGTH);
    (response.status, headers, response.body).into_response()
}

async fn post_message(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, ServerError> {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(&body) else {
        tracing::debug!(bytes = body.len(), "ignoring non-JSON control message");
        return Ok(StatusCode::NO_CONTENT);
    };

    state.proxy.handle_message(&value).await;

    state.proxy.activate_if_ready(true).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_status(State(state): State<AppState>) -> Result<Json<StatusPayload>, ServerError> {
    let proxy = &state.proxy;
    let storage = proxy.storage();
    let entries = if storage.has_bucket(proxy.cache_name()).await? {
        storage.entry_count(proxy.cache_name()).await?
    } else {
        0
    };

    Ok(Json(StatusPayload {
        state: proxy.state().await,
        controlling: proxy.is_controlling().await,
        cache_name: proxy.cache_name().to_string(),
        buckets: storage.bucket_names().await?,
        entries,
    }))
}
