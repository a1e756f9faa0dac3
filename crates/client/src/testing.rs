//! Scripted network and storage doubles for proxy tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use goldcache_core::{CacheStorage, CachedEntry, Error, MemoryStorage, ProxyRequest, ProxyResponse, ResponseType};
use http::StatusCode;

use crate::fetch::Fetcher;

/// In-process network: URL → canned response, with an offline switch and
/// a log of every URL requested.
#[derive(Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, ProxyResponse>>,
    offline: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: StatusCode, response_type: ResponseType, body: &str) {
        let mut response = ProxyResponse::synthetic(status, body.to_string());
        response.url = url::Url::parse(url).ok();
        response.response_type = response_type;
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Fetcher for ScriptedNetwork {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, Error> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::HttpError(format!("network error: {url} unreachable")));
        }

        let routes = self.routes.lock().unwrap();
        Ok(routes
            .get(&url)
            .cloned()
            .unwrap_or_else(|| ProxyResponse::synthetic(StatusCode::NOT_FOUND, "")))
    }
}

/// Memory storage whose bucket deletions always fail.
#[derive(Default)]
pub struct UndeletableStorage {
    inner: MemoryStorage,
}

#[async_trait]
impl CacheStorage for UndeletableStorage {
    async fn open_bucket(&self, name: &str) -> Result<(), Error> {
        self.inner.open_bucket(name).await
    }

    async fn has_bucket(&self, name: &str) -> Result<bool, Error> {
        self.inner.has_bucket(name).await
    }

    async fn bucket_names(&self) -> Result<Vec<String>, Error> {
        self.inner.bucket_names().await
    }

    async fn delete_bucket(&self, name: &str) -> Result<bool, Error> {
        Err(Error::InvalidInput(format!("bucket {name} is locked")))
    }

    async fn match_entry(&self, bucket: &str, key: &str) -> Result<Option<CachedEntry>, Error> {
        self.inner.match_entry(bucket, key).await
    }

    async fn put_entry(&self, bucket: &str, entry: &CachedEntry) -> Result<(), Error> {
        self.inner.put_entry(bucket, entry).await
    }

    async fn entry_count(&self, bucket: &str) -> Result<u64, Error> {
        self.inner.entry_count(bucket).await
    }
}

/// Memory storage whose entry writes hang forever once `stall` is called.
#[derive(Default)]
pub struct StalledWrites {
    inner: MemoryStorage,
    stalled: AtomicBool,
}

impl StalledWrites {
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheStorage for StalledWrites {
    async fn open_bucket(&self, name: &str) -> Result<(), Error> {
        self.inner.open_bucket(name).await
    }

    async fn has_bucket(&self, name: &str) -> Result<bool, Error> {
        self.inner.has_bucket(name).await
    }

    async fn bucket_names(&self) -> Result<Vec<String>, Error> {
        self.inner.bucket_names().await
    }

    async fn delete_bucket(&self, name: &str) -> Result<bool, Error> {
        self.inner.delete_bucket(name).await
    }

    async fn match_entry(&self, bucket: &str, key: &str) -> Result<Option<CachedEntry>, Error> {
        self.inner.match_entry(bucket, key).await
    }

    async fn put_entry(&self, bucket: &str, entry: &CachedEntry) -> Result<(), Error> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.put_entry(bucket, entry).await
    }

    async fn entry_count(&self, bucket: &str) -> Result<u64, Error> {
        self.inner.entry_count(bucket).await
    }
}
