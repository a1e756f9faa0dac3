//! Bucketed response cache.
//!
//! Each bucket is named by a generation tag and holds response snapshots
//! keyed by request identity. Backends:
//!
//! - SQLite via tokio-rusqlite ([`CacheDb`]) with WAL mode and migrations
//! - In-process map ([`MemoryStorage`]) for tests and ephemeral runs
//!
//! Both implement [`CacheStorage`], the handle the proxy is built against.

pub mod buckets;
pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod storage;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::CachedEntry;
pub use storage::{CacheStorage, MemoryStorage};
