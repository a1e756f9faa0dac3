//! Structured errors for the gold-offline HTTP front end.
//!
//! Every error is answered with its status code and a JSON body of the form
//! `{"error": "CODE: detail"}`.

use axum::Json;
use axum::response::{IntoResponse, Response};
use goldcache_core::Error;
use http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Request could not be turned into a proxy request.
    #[error("INVALID_INPUT: {0}")]
    BadRequest(String),

    /// Request method the front end does not proxy.
    #[error("METHOD_NOT_ALLOWED: {0}")]
    MethodNotAllowed(String),

    /// Reserved control path that does not exist.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    #[error(transparent)]
    Proxy(#[from] Error),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Proxy(e) if e.is_network() => StatusCode::BAD_GATEWAY,
            ServerError::Proxy(Error::InvalidInput(_) | Error::InvalidUrl(_)) => StatusCode::BAD_REQUEST,
            ServerError::Proxy(Error::InvalidState(_)) => StatusCode::CONFLICT,
            ServerError::Proxy(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
