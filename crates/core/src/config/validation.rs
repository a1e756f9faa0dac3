//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;
use url::Url;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache_name` is empty
    /// - `origin` is not an absolute http(s) URL with a host
    /// - a `live_hosts` fragment is empty
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is set below 100ms or above 5 minutes
    /// - `user_agent` is empty
    ///
    /// Returns `ConfigError::Missing` if `listen_addr` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_name.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "cache_name".into(), reason: "must not be empty".into() });
        }

        let origin = Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
        if !matches!(origin.scheme(), "http" | "https") || origin.host_str().is_none() {
            return Err(ConfigError::Invalid {
                field: "origin".into(),
                reason: "must be an http(s) URL with a host".into(),
            });
        }

        if self.live_hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "live_hosts".into(),
                reason: "fragments must not be empty (an empty fragment matches every host)".into(),
            });
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if let Some(timeout_ms) = self.timeout_ms {
            if timeout_ms < 100 {
                return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
            }
            if timeout_ms > 300_000 {
                return Err(ConfigError::Invalid {
                    field: "timeout_ms".into(),
                    reason: "must not exceed 5 minutes (300000ms)".into(),
                });
            }
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.listen_addr.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "listen_addr".into(),
                hint: "Set GOLD_OFFLINE_LISTEN_ADDR, e.g. 127.0.0.1:8080".into(),
            });
        }

        if self.precache_urls.is_empty() {
            tracing::warn!("precache_urls is empty; nothing will be available offline until first visited");
        }

        for url in &self.precache_urls {
            if let Ok(parsed) = origin.join(url)
                && let Some(host) = parsed.host_str()
                && let Some(fragment) = self.live_hosts.iter().find(|f| host.contains(f.as_str()))
            {
                tracing::warn!(
                    url = %url,
                    fragment = %fragment,
                    "precached URL matches a live host; it is stored at install but always fetched live"
                );
            }
        }

        Ok(())
    }
}
