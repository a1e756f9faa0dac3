//! Request and response values passed between the front end, the proxy,
//! the network and the cache.
//!
//! Bodies are held as [`Bytes`], so handing one copy to the caller and another
//! to a background cache write is a reference-count bump rather than a re-read.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::hash::compute_cache_key;

/// How a response was obtained, mirroring the browser's `Response.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin network response.
    Basic,
    /// Cross-origin network response with readable body.
    Cors,
    /// Cross-origin response whose contents must not be inspected.
    Opaque,
    /// Response synthesised locally.
    Default,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Basic => "basic",
            ResponseType::Cors => "cors",
            ResponseType::Opaque => "opaque",
            ResponseType::Default => "default",
        }
    }

    /// Parse the stored string form; unknown values read back as `Default`.
    pub fn parse(s: &str) -> Self {
        match s {
            "basic" => ResponseType::Basic,
            "cors" => ResponseType::Cors,
            "opaque" => ResponseType::Opaque,
            _ => ResponseType::Default,
        }
    }
}

/// An outbound request made by a controlled page.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    /// A bodiless `GET` for the given URL.
    pub fn get(url: Url) -> Self {
        Self { method: Method::GET, url, headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// Cache identity for this request.
    ///
    /// Only `GET` requests have one; every other method bypasses cache
    /// lookups and writes.
    pub fn cache_key(&self) -> Option<String> {
        if self.method != Method::GET {
            return None;
        }
        let mut url = self.url.clone();
        url.set_fragment(None);
        Some(compute_cache_key(self.method.as_str(), url.as_str()))
    }

    /// Target hostname, if the URL has one.
    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }
}

/// A replayable HTTP response.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    /// URL the response was served from; `None` for synthesised responses.
    pub url: Option<Url>,
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub response_type: ResponseType,
}

impl ProxyResponse {
    /// A locally synthesised response with the canonical reason phrase.
    pub fn synthetic(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            url: None,
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers: HeaderMap::new(),
            body: body.into(),
            response_type: ResponseType::Default,
        }
    }

    /// Builder-style header setter. Invalid header strings are skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = text.into();
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Whether the refill path may persist this response: a same-origin
    /// network response with status exactly 200.
    pub fn is_storable(&self) -> bool {
        self.status == StatusCode::OK && self.response_type == ResponseType::Basic
    }

    /// Headers as ordered string pairs, dropping values that are not UTF-8.
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect()
    }
}

/// Rebuild a header map from stored string pairs.
pub fn headers_from_pairs(pairs: &[(String, String)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
            headers.append(name, value);
        }
    }
    headers
}
