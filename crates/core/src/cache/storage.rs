//! Storage handle abstraction for cache buckets.
//!
//! The proxy owns an `Arc<dyn CacheStorage>` instead of reaching for a global
//! cache, so tests and ephemeral runs can swap in [`MemoryStorage`].

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::connection::CacheDb;
use super::entries::CachedEntry;
use crate::Error;

/// Trait for cache storage backends.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the bucket if absent.
    async fn open_bucket(&self, name: &str) -> Result<(), Error>;

    /// Whether the bucket exists.
    async fn has_bucket(&self, name: &str) -> Result<bool, Error>;

    /// Bucket names in creation order.
    async fn bucket_names(&self) -> Result<Vec<String>, Error>;

    /// Delete a bucket with all its entries. Returns false if it was absent.
    async fn delete_bucket(&self, name: &str) -> Result<bool, Error>;

    /// Look up an entry by request key.
    async fn match_entry(&self, bucket: &str, key: &str) -> Result<Option<CachedEntry>, Error>;

    /// Store an entry (upsert), creating the bucket if absent.
    async fn put_entry(&self, bucket: &str, entry: &CachedEntry) -> Result<(), Error>;

    /// Number of entries in the bucket (0 if absent).
    async fn entry_count(&self, bucket: &str) -> Result<u64, Error>;
}

#[async_trait]
impl CacheStorage for CacheDb {
    async fn open_bucket(&self, name: &str) -> Result<(), Error> {
        CacheDb::open_bucket(self, name).await
    }

    async fn has_bucket(&self, name: &str) -> Result<bool, Error> {
        CacheDb::has_bucket(self, name).await
    }

    async fn bucket_names(&self) -> Result<Vec<String>, Error> {
        CacheDb::bucket_names(self).await
    }

    async fn delete_bucket(&self, name: &str) -> Result<bool, Error> {
        CacheDb::delete_bucket(self, name).await
    }

    async fn match_entry(&self, bucket: &str, key: &str) -> Result<Option<CachedEntry>, Error> {
        CacheDb::match_entry(self, bucket, key).await
    }

    async fn put_entry(&self, bucket: &str, entry: &CachedEntry) -> Result<(), Error> {
        CacheDb::put_entry(self, bucket, entry).await
    }

    async fn entry_count(&self, bucket: &str) -> Result<u64, Error> {
        CacheDb::entry_count(self, bucket).await
    }
}

/// In-process storage backed by a map.
///
/// Buckets are kept in a Vec to preserve creation order.
#[derive(Default)]
pub struct MemoryStorage {
    buckets: RwLock<Vec<(String, HashMap<String, CachedEntry>)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open_bucket(&self, name: &str) -> Result<(), Error> {
        let mut buckets = self.buckets.write().await;
        if !buckets.iter().any(|(n, _)| n == name) {
            buckets.push((name.to_string(), HashMap::new()));
        }
        Ok(())
    }

    async fn has_bucket(&self, name: &str) -> Result<bool, Error> {
        Ok(self.buckets.read().await.iter().any(|(n, _)| n == name))
    }

    async fn bucket_names(&self) -> Result<Vec<String>, Error> {
        Ok(self.buckets.read().await.iter().map(|(n, _)| n.clone()).collect())
    }

    async fn delete_bucket(&self, name: &str) -> Result<bool, Error> {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|(n, _)| n != name);
        Ok(buckets.len() != before)
    }

    async fn match_entry(&self, bucket: &str, key: &str) -> Result<Option<CachedEntry>, Error> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .iter()
            .find(|(n, _)| n == bucket)
            .and_then(|(_, entries)| entries.get(key).cloned()))
    }

    async fn put_entry(&self, bucket: &str, entry: &CachedEntry) -> Result<(), Error> {
        let mut buckets = self.buckets.write().await;
        let index = match buckets.iter().position(|(n, _)| n == bucket) {
            Some(index) => index,
            None => {
                buckets.push((bucket.to_string(), HashMap::new()));
                buckets.len() - 1
            }
        };
        buckets[index].1.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn entry_count(&self, bucket: &str) -> Result<u64, Error> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .iter()
            .find(|(n, _)| n == bucket)
            .map(|(_, entries)| entries.len() as u64)
            .unwrap_or(0))
    }
}
