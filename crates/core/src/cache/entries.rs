//! Entry CRUD operations.
//!
//! An entry is a replayable snapshot of a network response stored under the
//! identity of the request that produced it.

use super::connection::CacheDb;
use crate::Error;
use crate::exchange::{ProxyRequest, ProxyResponse, ResponseType, headers_from_pairs};
use bytes::Bytes;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;
use url::Url;

/// A stored response snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEntry {
    pub key: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub response_type: ResponseType,
    pub stored_at: String,
}

impl CachedEntry {
    /// Snapshot a response under the identity of the request that produced it.
    ///
    /// Returns None for requests without a cache identity (non-GET).
    pub fn capture(request: &ProxyRequest, response: &ProxyResponse) -> Option<Self> {
        let key = request.cache_key()?;
        Some(Self {
            key,
            method: request.method.as_str().to_string(),
            url: request.url.to_string(),
            status: response.status.as_u16(),
            status_text: response.status_text.clone(),
            headers: response.header_pairs(),
            body: response.body.to_vec(),
            response_type: response.response_type,
            stored_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Replay the snapshot as a response.
    pub fn into_response(self) -> ProxyResponse {
        ProxyResponse {
            url: Url::parse(&self.url).ok(),
            status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            status_text: self.status_text,
            headers: headers_from_pairs(&self.headers),
            body: Bytes::from(self.body),
            response_type: self.response_type,
        }
    }
}

impl CacheDb {
    /// Insert or replace an entry, creating the bucket if needed.
    pub async fn put_entry(&self, bucket: &str, entry: &CachedEntry) -> Result<(), Error> {
        let bucket = bucket.to_string();
        let entry = entry.clone();
        let headers_json = serde_json::to_string(&entry.headers)?;
        let now = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO buckets (name, created_at) VALUES (?1, ?2)",
                    params![bucket, now],
                )?;
                tx.execute(
                    "INSERT INTO entries (
                        bucket, key_hash, method, url, status, status_text,
                        headers_json, body, response_type, stored_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    ON CONFLICT(bucket, key_hash) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        status_text = excluded.status_text,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        response_type = excluded.response_type,
                        stored_at = excluded.stored_at",
                    params![
                        &bucket,
                        &entry.key,
                        &entry.method,
                        &entry.url,
                        entry.status as i64,
                        &entry.status_text,
                        &headers_json,
                        &entry.body,
                        entry.response_type.as_str(),
                        &entry.stored_at,
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up an entry by key within a bucket.
    ///
    /// Returns None if either the bucket or the key is absent.
    pub async fn match_entry(&self, bucket: &str, key: &str) -> Result<Option<CachedEntry>, Error> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CachedEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key_hash, method, url, status, status_text,
                        headers_json, body, response_type, stored_at
                    FROM entries WHERE bucket = ?1 AND key_hash = ?2",
                )?;

                let result = stmt.query_row(params![bucket, key], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Vec<u8>>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                });

                let (key, method, url, status, status_text, headers_json, body, response_type, stored_at) =
                    match result {
                        Ok(row) => row,
                        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                        Err(e) => return Err(e.into()),
                    };

                let status =
                    u16::try_from(status).map_err(|_| Error::CorruptEntry(format!("status {status} out of range")))?;

                Ok(Some(CachedEntry {
                    key,
                    method,
                    url,
                    status,
                    status_text,
                    headers: serde_json::from_str(&headers_json)?,
                    body,
                    response_type: ResponseType::parse(&response_type),
                    stored_at,
                }))
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in a bucket.
    pub async fn entry_count(&self, bucket: &str) -> Result<u64, Error> {
        let bucket = bucket.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE bucket = ?1", params![bucket], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
