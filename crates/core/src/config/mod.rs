//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (GOLD_OFFLINE_*)
//! 2. TOML config file (if GOLD_OFFLINE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Message returned as `{"error": ...}` when a live-data endpoint is unreachable.
pub const DEFAULT_LIVE_ERROR_MESSAGE: &str = "ไม่สามารถเชื่อมต่อได้ กรุณาตรวจสอบอินเทอร์เน็ต";

/// Plain-text body of the 503 placeholder for uncached assets.
pub const DEFAULT_OFFLINE_MESSAGE: &str = "ไม่สามารถโหลดหน้านี้ได้ กรุณาตรวจสอบการเชื่อมต่ออินเทอร์เน็ต";

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (GOLD_OFFLINE_*)
/// 2. TOML config file (if GOLD_OFFLINE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Generation tag naming the current cache bucket.
    ///
    /// Bump on every deployment that changes cached assets.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Origin the application is served from. Relative URLs resolve
    /// against it and same-origin responses count as `basic`.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// URLs fetched and stored at install time.
    #[serde(default = "default_precache_urls")]
    pub precache_urls: Vec<String>,

    /// Hostname fragments that are always fetched live and never cached.
    #[serde(default = "default_live_hosts")]
    pub live_hosts: Vec<String>,

    /// Path to SQLite cache database.
    ///
    /// Set via GOLD_OFFLINE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Address the HTTP front end listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// User-Agent string for upstream requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes accepted per response body.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Optional upstream timeout in milliseconds. Unset means the
    /// network stack's own limits apply.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default = "default_live_error_message")]
    pub live_error_message: String,

    #[serde(default = "default_offline_message")]
    pub offline_message: String,
}

fn default_cache_name() -> String {
    "gold-purchase-v1".into()
}

fn default_origin() -> String {
    "http://localhost:3000".into()
}

fn default_precache_urls() -> Vec<String> {
    vec![
        "/".into(),
        "/gold_purchase_v2_6.html".into(),
        "/manifest.json".into(),
        "https://cdn.tailwindcss.com".into(),
        "https://fonts.googleapis.com/css2?family=Prompt:wght@400;600;700&display=swap".into(),
    ]
}

fn default_live_hosts() -> Vec<String> {
    vec!["goldapi.io".into(), "googleapis.com".into(), "sheets.google.com".into()]
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./gold-offline-cache.sqlite")
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".into()
}

fn default_user_agent() -> String {
    "gold-offline/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_live_error_message() -> String {
    DEFAULT_LIVE_ERROR_MESSAGE.into()
}

fn default_offline_message() -> String {
    DEFAULT_OFFLINE_MESSAGE.into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_name: default_cache_name(),
            origin: default_origin(),
            precache_urls: default_precache_urls(),
            live_hosts: default_live_hosts(),
            db_path: default_db_path(),
            listen_addr: default_listen_addr(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: None,
            live_error_message: default_live_error_message(),
            offline_message: default_offline_message(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest, if one is configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `GOLD_OFFLINE_`
    /// 2. TOML file from `GOLD_OFFLINE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("GOLD_OFFLINE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("GOLD_OFFLINE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        Self::from_figment(figment)
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
