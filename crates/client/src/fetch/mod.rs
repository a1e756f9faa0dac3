//! HTTP fetch pipeline used for every network-bound request.
//!
//! ### Forwarding
//! - Method, headers and body of the intercepted request are forwarded.
//! - Hop-by-hop headers, headers named in `Connection`, and `host` are
//!   dropped in both directions.
//! - `Accept-Encoding` is never forwarded. reqwest negotiates only the
//!   encodings it can decode, so a decoded body never carries a stale
//!   `Content-Encoding`.
//! - Max redirects: 5. Max body bytes: 5MB (configurable).
//!
//! ### Success vs failure
//! - Any HTTP status is a successful fetch; callers decide what to keep.
//! - Only transport failures (DNS, connect, TLS, timeout, oversize body)
//!   are errors.
//!
//! ### Response type
//! - `basic` when the final URL shares the application origin, `cors` otherwise.

pub mod url;

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, header};
use reqwest::Client;
use std::time::{Duration, Instant};

pub use self::url::{UrlError, resolve, same_origin};

use goldcache_core::{AppConfig, Error, ProxyRequest, ProxyResponse, ResponseType};
use ::url::Url;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Network access used by the proxy.
///
/// Implemented by [`FetchClient`] for real traffic; tests provide scripted
/// implementations.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request. `Err` only for transport failures.
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "gold-offline/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: none)
    pub timeout: Option<Duration>,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Application origin used to classify responses as `basic`
    pub origin: Url,
}

impl FetchConfig {
    /// Defaults for everything but the application origin.
    pub fn new(origin: Url) -> Self {
        Self {
            user_agent: "gold-offline/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: None,
            max_redirects: 5,
            origin,
        }
    }

    /// Build from the loaded application configuration.
    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("origin: {e}")))?;
        Ok(Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Self::new(origin)
        })
    }
}

/// reqwest-backed [`Fetcher`].
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true);

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let http = builder
            .build()
            .map_err(|e| Error::InvalidInput(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn classify(&self, final_url: &Url) -> ResponseType {
        if same_origin(&self.config.origin, final_url) { ResponseType::Basic } else { ResponseType::Cors }
    }
}

#[async_trait]
impl Fetcher for FetchClient {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, Error> {
        let start = Instant::now();

        let mut headers = forwardable_headers(&request.headers);
        headers.remove(header::ACCEPT_ENCODING);

        let mut outbound = self.http.request(request.method.clone(), request.url.clone()).headers(headers);
        if !request.body.is_empty() {
            outbound = outbound.body(request.body.clone());
        }

        let response = outbound.send().await.map_err(map_reqwest_error)?;

        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let final_url = response.url().clone();
        let headers = forwardable_headers(response.headers());

        let body = response.bytes().await.map_err(map_reqwest_error)?;

        if body.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", body.len(), self.config.max_bytes)));
        }

        let response_type = self.classify(&final_url);

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            final_url = %final_url,
            status = status.as_u16(),
            response_type = response_type.as_str(),
            bytes = body.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched"
        );

        Ok(ProxyResponse {
            url: Some(final_url),
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
            response_type,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> Error {
    if err.is_timeout() { Error::FetchTimeout(err.to_string()) } else { Error::HttpError(format!("network error: {err}")) }
}

/// Copy of `headers` without hop-by-hop entries, the headers listed in
/// `Connection`, and `host`.
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let listed = connection_listed(headers);
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || name == header::HOST || listed.iter().any(|l| l == name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn connection_listed(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}
