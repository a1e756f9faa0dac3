//! Offline caching proxy.
//!
//! [`OfflineCacheProxy`] owns one cache bucket, named by the deployment's
//! generation tag, and decides for every intercepted request whether it is
//! served live (spot-price and spreadsheet hosts) or cache-first with a
//! background refill.
//!
//! ### Lifecycle
//! - `install` opens the bucket and warms it from the precache list. Failures
//!   are logged and never fail the install.
//! - `activate` deletes every other bucket and takes control. A failed
//!   deletion fails the activation.
//! - `SKIP_WAITING` control messages let a waiting instance activate early.
//!
//! ### Degraded responses
//! - Live endpoint unreachable: JSON `{"error": ...}` with status 200.
//! - Uncached asset unreachable: 503 plain text.

pub mod fallback;
pub mod lifecycle;
pub mod message;
pub mod routing;

use std::sync::Arc;

use futures_util::future::join_all;
use goldcache_core::{AppConfig, CacheStorage, CachedEntry, Error, ProxyRequest, ProxyResponse};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::task::TaskTracker;
use url::Url;

use crate::fetch::{Fetcher, resolve};

pub use lifecycle::{Lifecycle, WorkerState};
pub use message::ControlMessage;
pub use routing::{LiveEndpoints, Route, route};

/// Settings for one deployed generation of the proxy.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub cache_name: String,
    pub origin: Url,
    pub precache_urls: Vec<String>,
    pub live_hosts: Vec<String>,
    pub live_error_message: String,
    pub offline_message: String,
}

impl WorkerConfig {
    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("origin: {e}")))?;
        Ok(Self {
            cache_name: config.cache_name.clone(),
            origin,
            precache_urls: config.precache_urls.clone(),
            live_hosts: config.live_hosts.clone(),
            live_error_message: config.live_error_message.clone(),
            offline_message: config.offline_message.clone(),
        })
    }
}

/// A precache URL that could not be stored.
#[derive(Debug, Clone, Serialize)]
pub struct PrecacheFailure {
    pub url: String,
    pub reason: String,
}

/// Outcome of [`OfflineCacheProxy::install`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    pub cached: Vec<String>,
    pub failed: Vec<PrecacheFailure>,
}

/// Outcome of [`OfflineCacheProxy::activate`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivateReport {
    pub deleted: Vec<String>,
}

/// Request-intercepting cache policy for one generation.
pub struct OfflineCacheProxy {
    config: WorkerConfig,
    live: LiveEndpoints,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Fetcher>,
    lifecycle: RwLock<Lifecycle>,
    writes: TaskTracker,
}

impl OfflineCacheProxy {
    pub fn new(config: WorkerConfig, storage: Arc<dyn CacheStorage>, network: Arc<dyn Fetcher>) -> Self {
        let live = LiveEndpoints::new(&config.live_hosts);
        Self { config, live, storage, network, lifecycle: RwLock::new(Lifecycle::default()), writes: TaskTracker::new() }
    }

    pub fn cache_name(&self) -> &str {
        &self.config.cache_name
    }

    pub fn origin(&self) -> &Url {
        &self.config.origin
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub async fn state(&self) -> WorkerState {
        self.lifecycle.read().await.state()
    }

    pub async fn is_controlling(&self) -> bool {
        self.lifecycle.read().await.is_controlling()
    }

    pub async fn ready_to_activate(&self, has_active_predecessor: bool) -> bool {
        self.lifecycle.read().await.ready_to_activate(has_active_predecessor)
    }

    /// Open the bucket and warm it from the precache list.
    ///
    /// Precache problems are logged and reported, never returned as errors.
    /// The only error is calling this outside the `pending` state.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        self.lifecycle.write().await.begin_install()?;
        tracing::info!(cache = %self.config.cache_name, "installing");

        let report = match self.storage.open_bucket(&self.config.cache_name).await {
            Ok(()) => self.precache().await,
            Err(e) => {
                tracing::warn!(cache = %self.config.cache_name, error = %e, "cache open failed; skipping precache");
                InstallReport {
                    cached: Vec::new(),
                    failed: self
                        .config
                        .precache_urls
                        .iter()
                        .map(|url| PrecacheFailure { url: url.clone(), reason: e.to_string() })
                        .collect(),
                }
            }
        };

        self.skip_waiting().await;
        self.lifecycle.write().await.finish_install()?;

        tracing::info!(
            cache = %self.config.cache_name,
            cached = report.cached.len(),
            failed = report.failed.len(),
            "installed"
        );
        Ok(report)
    }

    async fn precache(&self) -> InstallReport {
        let results = join_all(self.config.precache_urls.iter().map(|raw| async move {
            let outcome = self.precache_one(raw).await;
            (raw, outcome)
        }))
        .await;

        let mut report = InstallReport::default();
        for (raw, outcome) in results {
            match outcome {
                Ok(()) => report.cached.push(raw.clone()),
                Err(e) => {
                    tracing::warn!(url = %raw, error = %e, "precache failed");
                    report.failed.push(PrecacheFailure { url: raw.clone(), reason: e.to_string() });
                }
            }
        }
        report
    }

    async fn precache_one(&self, raw: &str) -> Result<(), Error> {
        let url = resolve(&self.config.origin, raw).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let request = ProxyRequest::get(url);
        let response = self.network.fetch(&request).await?;

        if !response.status.is_success() {
            return Err(Error::HttpError(format!("status {}", response.status.as_u16())));
        }

        let Some(entry) = CachedEntry::capture(&request, &response) else {
            return Err(Error::InvalidInput(format!("{raw} has no cache identity")));
        };
        self.storage.put_entry(&self.config.cache_name, &entry).await
    }

    /// Delete every bucket but the current one, then take control.
    ///
    /// Deletions run concurrently and all are awaited. If any fails the error
    /// is returned and the proxy stays `installed` without control.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        self.lifecycle.write().await.begin_activate()?;
        self.complete_activation().await
    }

    /// Activate only if [`Lifecycle::ready_to_activate`] holds. The check and
    /// the move to `activating` happen under one lock, so concurrent callers
    /// activate at most once; the others get `Ok(None)`.
    pub async fn activate_if_ready(&self, has_active_predecessor: bool) -> Result<Option<ActivateReport>, Error> {
        {
            let mut lifecycle = self.lifecycle.write().await;
            if !lifecycle.ready_to_activate(has_active_predecessor) {
                return Ok(None);
            }
            lifecycle.begin_activate()?;
        }
        self.complete_activation().await.map(Some)
    }

    async fn complete_activation(&self) -> Result<ActivateReport, Error> {
        tracing::info!(cache = %self.config.cache_name, "activating");

        match self.sweep().await {
            Ok(deleted) => {
                self.lifecycle.write().await.finish_activate()?;
                tracing::info!(cache = %self.config.cache_name, deleted = deleted.len(), "activated; controlling");
                Ok(ActivateReport { deleted })
            }
            Err(e) => {
                tracing::error!(cache = %self.config.cache_name, error = %e, "activation failed");
                self.lifecycle.write().await.abort_activate()?;
                Err(e)
            }
        }
    }

    async fn sweep(&self) -> Result<Vec<String>, Error> {
        let stale: Vec<String> = self
            .storage
            .bucket_names()
            .await?
            .into_iter()
            .filter(|name| name != &self.config.cache_name)
            .collect();

        let results = join_all(stale.iter().map(|name| async move {
            tracing::info!(bucket = %name, "deleting old cache");
            self.storage.delete_bucket(name).await
        }))
        .await;

        for result in results {
            result?;
        }

        self.storage.open_bucket(&self.config.cache_name).await?;
        Ok(stale)
    }

    /// Serve one request from a controlled page.
    ///
    /// While controlling, the result is always `Ok`: network failures become
    /// one of the synthetic fallback responses. Before activation the request
    /// is passed straight to the network and its error, if any, is returned.
    pub async fn handle_fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, Error> {
        if !self.is_controlling().await {
            tracing::debug!(url = %request.url, "not controlling; passing through");
            return self.network.fetch(request).await;
        }

        let response = match route(&self.live, request) {
            Route::Live => self.fetch_live(request).await,
            Route::CacheFirst => self.cache_first(request).await,
        };
        Ok(response)
    }

    async fn fetch_live(&self, request: &ProxyRequest) -> ProxyResponse {
        match self.network.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "live endpoint unreachable");
                fallback::live_unavailable(&self.config.live_error_message)
            }
        }
    }

    async fn cache_first(&self, request: &ProxyRequest) -> ProxyResponse {
        if let Some(key) = request.cache_key() {
            match self.storage.match_entry(&self.config.cache_name, &key).await {
                Ok(Some(entry)) => {
                    tracing::debug!(url = %request.url, "serving from cache");
                    return entry.into_response();
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(url = %request.url, error = %e, "cache lookup failed; treating as miss"),
            }
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_storable() {
                    self.store_in_background(request, &response);
                }
                response
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "fetch failed");
                fallback::offline(&self.config.offline_message)
            }
        }
    }

    /// Persist a copy of the response without holding up the caller.
    /// Completion is best-effort; see [`OfflineCacheProxy::settle`].
    fn store_in_background(&self, request: &ProxyRequest, response: &ProxyResponse) {
        let Some(entry) = CachedEntry::capture(request, response) else {
            tracing::debug!(method = %request.method, url = %request.url, "method not cacheable");
            return;
        };

        let storage = Arc::clone(&self.storage);
        let bucket = self.config.cache_name.clone();
        self.writes.spawn(async move {
            if let Err(e) = storage.put_entry(&bucket, &entry).await {
                tracing::warn!(url = %entry.url, error = %e, "background cache write failed");
            }
        });
    }

    /// Wait for background cache writes spawned so far.
    pub async fn settle(&self) {
        self.writes.close();
        self.writes.wait().await;
        self.writes.reopen();
    }

    /// Handle an out-of-band message from a page. Unrecognised messages are
    /// ignored and nothing is sent back.
    pub async fn handle_message(&self, value: &serde_json::Value) {
        match ControlMessage::parse(value) {
            Some(ControlMessage::SkipWaiting) => self.skip_waiting().await,
            None => tracing::trace!("ignoring unrecognised control message"),
        }
    }

    async fn skip_waiting(&self) {
        self.lifecycle.write().await.request_skip_waiting();
        tracing::debug!(cache = %self.config.cache_name, "skip waiting requested");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedNetwork, StalledWrites, UndeletableStorage};
    use std::time::Duration;
    use goldcache_core::config::{DEFAULT_LIVE_ERROR_MESSAGE, DEFAULT_OFFLINE_MESSAGE};
    use goldcache_core::{CacheDb, MemoryStorage, ResponseType};
    use http::{Method, StatusCode};

    const ORIGIN: &str = "http://localhost:3000";

    fn worker_config(cache_name: &str) -> WorkerConfig {
        WorkerConfig::from_app(&AppConfig { cache_name: cache_name.into(), ..Default::default() }).unwrap()
    }

    fn request(url: &str) -> ProxyRequest {
        ProxyRequest::get(Url::parse(url).unwrap())
    }

    /// Network answering every default precache URL.
    fn app_network() -> Arc<ScriptedNetwork> {
        let network = Arc::new(ScriptedNetwork::new());
        network.respond(&format!("{ORIGIN}/"), StatusCode::OK, ResponseType::Basic, "<html>shell</html>");
        network.respond(
            &format!("{ORIGIN}/gold_purchase_v2_6.html"),
            StatusCode::OK,
            ResponseType::Basic,
            "<html>app</html>",
        );
        network.respond(&format!("{ORIGIN}/manifest.json"), StatusCode::OK, ResponseType::Basic, r#"{"name":"gold"}"#);
        network.respond("https://cdn.tailwindcss.com/", StatusCode::OK, ResponseType::Cors, "tailwind");
        network.respond(
            "https://fonts.googleapis.com/css2?family=Prompt:wght@400;600;700&display=swap",
            StatusCode::OK,
            ResponseType::Cors,
            "@font-face{}",
        );
        network
    }

    async fn installed_proxy(
        storage: Arc<dyn CacheStorage>, network: Arc<ScriptedNetwork>,
    ) -> (OfflineCacheProxy, InstallReport) {
        let proxy = OfflineCacheProxy::new(worker_config("gold-purchase-v1"), storage, network);
        let report = proxy.install().await.unwrap();
        (proxy, report)
    }

    async fn active_proxy(storage: Arc<dyn CacheStorage>, network: Arc<ScriptedNetwork>) -> OfflineCacheProxy {
        let (proxy, _) = installed_proxy(storage, network).await;
        proxy.activate().await.unwrap();
        proxy
    }

    async fn lookup(storage: &Arc<dyn CacheStorage>, url: &str) -> Option<CachedEntry> {
        let key = request(url).cache_key().unwrap();
        storage.match_entry("gold-purchase-v1", &key).await.unwrap()
    }

    #[tokio::test]
    async fn test_install_stores_every_precache_url() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let (proxy, report) = installed_proxy(Arc::clone(&storage), app_network()).await;

        assert_eq!(report.cached.len(), 5);
        assert!(report.failed.is_empty());
        assert_eq!(proxy.state().await, WorkerState::Installed);

        for raw in &proxy.config.precache_urls {
            let url = resolve(proxy.origin(), raw).unwrap();
            assert!(lookup(&storage, url.as_str()).await.is_some(), "{raw} not precached");
        }
    }

    #[tokio::test]
    async fn test_install_swallows_precache_failures() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = Arc::new(ScriptedNetwork::new());
        network.respond(&format!("{ORIGIN}/manifest.json"), StatusCode::OK, ResponseType::Basic, "{}");

        let (proxy, report) = installed_proxy(Arc::clone(&storage), network).await;

        assert_eq!(report.cached, vec!["/manifest.json".to_string()]);
        assert_eq!(report.failed.len(), 4);
        assert_eq!(proxy.state().await, WorkerState::Installed);
        assert!(storage.has_bucket("gold-purchase-v1").await.unwrap());
        assert_eq!(storage.entry_count("gold-purchase-v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_install_offline_still_completes() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = app_network();
        network.set_offline(true);

        let (proxy, report) = installed_proxy(storage, network).await;
        assert!(report.cached.is_empty());
        assert_eq!(report.failed.len(), 5);
        assert!(proxy.ready_to_activate(true).await);
    }

    #[tokio::test]
    async fn test_install_requests_skip_waiting() {
        let (proxy, _) = installed_proxy(Arc::new(MemoryStorage::new()), app_network()).await;
        assert!(proxy.ready_to_activate(true).await);
    }

    #[tokio::test]
    async fn test_install_twice_rejected() {
        let (proxy, _) = installed_proxy(Arc::new(MemoryStorage::new()), app_network()).await;
        assert!(matches!(proxy.install().await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_activate_before_install_rejected() {
        let proxy = OfflineCacheProxy::new(
            worker_config("gold-purchase-v1"),
            Arc::new(MemoryStorage::new()),
            app_network(),
        );
        assert!(matches!(proxy.activate().await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_activate_deletes_old_generations() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        storage.open_bucket("gold-purchase-v0").await.unwrap();

        let (proxy, _) = installed_proxy(Arc::clone(&storage), app_network()).await;
        let report = proxy.activate().await.unwrap();

        assert_eq!(report.deleted, vec!["gold-purchase-v0".to_string()]);
        assert_eq!(storage.bucket_names().await.unwrap(), vec!["gold-purchase-v1".to_string()]);
        assert!(proxy.is_controlling().await);
    }

    #[tokio::test]
    async fn test_activate_leaves_exactly_current_bucket_sqlite() {
        let storage: Arc<dyn CacheStorage> = Arc::new(CacheDb::open_in_memory().await.unwrap());
        for stale in ["gold-purchase-v0", "gold-purchase-beta", "other-app"] {
            storage.open_bucket(stale).await.unwrap();
        }

        let proxy = active_proxy(Arc::clone(&storage), app_network()).await;

        assert_eq!(storage.bucket_names().await.unwrap(), vec![proxy.cache_name().to_string()]);
    }

    #[tokio::test]
    async fn test_activate_recreates_bucket_when_install_could_not_fill_it() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = app_network();
        network.set_offline(true);

        let proxy = active_proxy(Arc::clone(&storage), network).await;
        assert!(storage.has_bucket(proxy.cache_name()).await.unwrap());
    }

    #[tokio::test]
    async fn test_activate_deletion_failure_propagates() {
        let storage: Arc<dyn CacheStorage> = Arc::new(UndeletableStorage::default());
        storage.open_bucket("gold-purchase-v0").await.unwrap();

        let (proxy, _) = installed_proxy(Arc::clone(&storage), app_network()).await;
        let result = proxy.activate().await;

        assert!(result.is_err());
        assert_eq!(proxy.state().await, WorkerState::Installed);
        assert!(!proxy.is_controlling().await);
    }

    #[tokio::test]
    async fn test_precached_asset_served_without_network() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = app_network();
        let proxy = active_proxy(Arc::clone(&storage), Arc::clone(&network)).await;
        let url = format!("{ORIGIN}/manifest.json");
        let calls_before = network.call_count(&url);

        let response = proxy.handle_fetch(&request(&url)).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], br#"{"name":"gold"}"#);
        assert_eq!(network.call_count(&url), calls_before);
    }

    #[tokio::test]
    async fn test_cache_hit_while_offline() {
        let network = app_network();
        let proxy = active_proxy(Arc::new(MemoryStorage::new()), Arc::clone(&network)).await;
        network.set_offline(true);

        let response = proxy.handle_fetch(&request(&format!("{ORIGIN}/gold_purchase_v2_6.html"))).await.unwrap();
        assert_eq!(&response.body[..], b"<html>app</html>");
    }

    #[tokio::test]
    async fn test_miss_fetches_and_refills() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = app_network();
        let url = format!("{ORIGIN}/some/new/asset.png");
        network.respond(&url, StatusCode::OK, ResponseType::Basic, "PNG");
        let proxy = active_proxy(Arc::clone(&storage), Arc::clone(&network)).await;

        let response = proxy.handle_fetch(&request(&url)).await.unwrap();
        assert_eq!(&response.body[..], b"PNG");

        proxy.settle().await;
        let stored = lookup(&storage, &url).await.unwrap();
        assert_eq!(stored.body, b"PNG".to_vec());

        network.set_offline(true);
        let replay = proxy.handle_fetch(&request(&url)).await.unwrap();
        assert_eq!(&replay.body[..], b"PNG");
        assert_eq!(network.call_count(&url), 1);
    }

    #[tokio::test]
    async fn test_non_200_not_stored() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = app_network();
        let proxy = active_proxy(Arc::clone(&storage), Arc::clone(&network)).await;

        let missing = format!("{ORIGIN}/missing.png");
        let response = proxy.handle_fetch(&request(&missing)).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);

        let partial = format!("{ORIGIN}/video.mp4");
        network.respond(&partial, StatusCode::PARTIAL_CONTENT, ResponseType::Basic, "part");
        proxy.handle_fetch(&request(&partial)).await.unwrap();

        proxy.settle().await;
        assert!(lookup(&storage, &missing).await.is_none());
        assert!(lookup(&storage, &partial).await.is_none());
    }

    #[tokio::test]
    async fn test_cross_origin_not_stored() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = app_network();
        let cors = "https://cdn.jsdelivr.net/npm/chart.js";
        let opaque = "https://images.example.com/logo.png";
        network.respond(cors, StatusCode::OK, ResponseType::Cors, "chart");
        network.respond(opaque, StatusCode::OK, ResponseType::Opaque, "");
        let proxy = active_proxy(Arc::clone(&storage), Arc::clone(&network)).await;

        let response = proxy.handle_fetch(&request(cors)).await.unwrap();
        assert_eq!(&response.body[..], b"chart");
        proxy.handle_fetch(&request(opaque)).await.unwrap();

        proxy.settle().await;
        assert!(lookup(&storage, cors).await.is_none());
        assert!(lookup(&storage, opaque).await.is_none());
    }

    #[tokio::test]
    async fn test_non_get_not_stored() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = app_network();
        let url = format!("{ORIGIN}/api/quote");
        network.respond(&url, StatusCode::OK, ResponseType::Basic, "ok");
        let proxy = active_proxy(Arc::clone(&storage), Arc::clone(&network)).await;
        let entries_before = storage.entry_count("gold-purchase-v1").await.unwrap();

        let post = ProxyRequest { method: Method::POST, ..request(&url) };
        proxy.handle_fetch(&post).await.unwrap();
        proxy.handle_fetch(&post).await.unwrap();

        proxy.settle().await;
        assert_eq!(storage.entry_count("gold-purchase-v1").await.unwrap(), entries_before);
        assert_eq!(network.call_count(&url), 2);
    }

    #[tokio::test]
    async fn test_uncached_offline_returns_503() {
        let network = app_network();
        let proxy = active_proxy(Arc::new(MemoryStorage::new()), Arc::clone(&network)).await;
        network.set_offline(true);

        let response = proxy.handle_fetch(&request(&format!("{ORIGIN}/unknown-page"))).await.unwrap();

        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.status_text, "Service Unavailable");
        assert_eq!(response.content_type(), Some("text/plain; charset=utf-8"));
        assert_eq!(std::str::from_utf8(&response.body).unwrap(), DEFAULT_OFFLINE_MESSAGE);
    }

    #[tokio::test]
    async fn test_live_endpoint_offline_returns_json_error() {
        let network = app_network();
        let proxy = active_proxy(Arc::new(MemoryStorage::new()), Arc::clone(&network)).await;
        network.set_offline(true);

        let response = proxy.handle_fetch(&request("https://goldapi.io/price")).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type(), Some("application/json"));
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["error"], DEFAULT_LIVE_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_live_endpoint_never_touches_cache() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = app_network();
        let url = "https://goldapi.io/api/XAU/THB";
        network.respond(url, StatusCode::OK, ResponseType::Basic, r#"{"price":41250}"#);
        let proxy = active_proxy(Arc::clone(&storage), Arc::clone(&network)).await;

        assert!(lookup(&storage, url).await.is_none());
        for _ in 0..3 {
            let response = proxy.handle_fetch(&request(url)).await.unwrap();
            assert_eq!(&response.body[..], br#"{"price":41250}"#);
        }
        proxy.settle().await;

        assert!(lookup(&storage, url).await.is_none());
        assert_eq!(network.call_count(url), 3);
    }

    #[tokio::test]
    async fn test_precached_live_url_still_fetched_live() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = app_network();
        let fonts = "https://fonts.googleapis.com/css2?family=Prompt:wght@400;600;700&display=swap";
        let proxy = active_proxy(Arc::clone(&storage), Arc::clone(&network)).await;
        assert!(lookup(&storage, fonts).await.is_some());

        network.set_offline(true);
        let response = proxy.handle_fetch(&request(fonts)).await.unwrap();
        assert_eq!(response.content_type(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_not_controlling_passes_through() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = app_network();
        let (proxy, _) = installed_proxy(Arc::clone(&storage), Arc::clone(&network)).await;
        let url = format!("{ORIGIN}/manifest.json");

        proxy.handle_fetch(&request(&url)).await.unwrap();
        assert_eq!(network.call_count(&url), 2);

        network.set_offline(true);
        assert!(proxy.handle_fetch(&request(&url)).await.is_err());
    }

    #[tokio::test]
    async fn test_skip_waiting_message() {
        let proxy = OfflineCacheProxy::new(
            worker_config("gold-purchase-v2"),
            Arc::new(MemoryStorage::new()),
            app_network(),
        );
        proxy.handle_message(&serde_json::json!({ "type": "PING" })).await;
        assert!(!proxy.lifecycle.read().await.skip_waiting_requested());

        proxy.handle_message(&serde_json::json!({ "type": "SKIP_WAITING" })).await;
        assert!(proxy.lifecycle.read().await.skip_waiting_requested());
        assert_eq!(proxy.state().await, WorkerState::Pending);
    }

    #[tokio::test]
    async fn test_new_generation_replaces_old() {
        let storage: Arc<dyn CacheStorage> = Arc::new(CacheDb::open_in_memory().await.unwrap());
        let network = app_network();

        let v1 = OfflineCacheProxy::new(worker_config("gold-purchase-v1"), Arc::clone(&storage), network.clone());
        v1.install().await.unwrap();
        v1.activate().await.unwrap();

        let v2 = OfflineCacheProxy::new(worker_config("gold-purchase-v2"), Arc::clone(&storage), network.clone());
        v2.install().await.unwrap();
        assert_eq!(storage.bucket_names().await.unwrap().len(), 2);

        assert!(v2.ready_to_activate(true).await);
        let report = v2.activate().await.unwrap();
        assert_eq!(report.deleted, vec!["gold-purchase-v1".to_string()]);
        assert_eq!(storage.bucket_names().await.unwrap(), vec!["gold-purchase-v2".to_string()]);
    }

    #[tokio::test]
    async fn test_refill_does_not_wait_for_write() {
        let storage = Arc::new(StalledWrites::default());
        let network = app_network();
        let url = format!("{ORIGIN}/img/bar.png");
        network.respond(&url, StatusCode::OK, ResponseType::Basic, "BAR");
        let proxy = active_proxy(Arc::clone(&storage) as Arc<dyn CacheStorage>, Arc::clone(&network)).await;
        storage.stall();

        let response = tokio::time::timeout(Duration::from_secs(2), proxy.handle_fetch(&request(&url)))
            .await
            .expect("response waited on the cache write")
            .unwrap();
        assert_eq!(&response.body[..], b"BAR");
    }

    #[tokio::test]
    async fn test_activate_if_ready_runs_once_under_contention() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        storage.open_bucket("gold-purchase-v0").await.unwrap();
        let (proxy, _) = installed_proxy(Arc::clone(&storage), app_network()).await;

        let (a, b) = tokio::join!(proxy.activate_if_ready(true), proxy.activate_if_ready(true));
        let reports: Vec<_> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].deleted, vec!["gold-purchase-v0".to_string()]);
        assert!(proxy.is_controlling().await);
        assert!(proxy.activate_if_ready(true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activate_if_ready_waits_for_predecessor() {
        let proxy = OfflineCacheProxy::new(
            worker_config("gold-purchase-v1"),
            Arc::new(MemoryStorage::new()),
            app_network(),
        );
        assert!(proxy.activate_if_ready(false).await.unwrap().is_none());
        assert_eq!(proxy.state().await, WorkerState::Pending);
    }
}
