//! Core types and shared functionality for gold-offline.
//!
//! This crate provides:
//! - Bucketed response cache with SQLite and in-memory backends
//! - Request/response exchange types
//! - Unified error types
//! - Layered configuration

pub mod cache;
pub mod config;
pub mod error;
pub mod exchange;

pub use cache::{CacheDb, CacheStorage, CachedEntry, MemoryStorage};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use exchange::{ProxyRequest, ProxyResponse, ResponseType};
