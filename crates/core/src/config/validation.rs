//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use std::net::SocketAddr;

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

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `version_tag` is empty or contains whitespace
    /// - a core asset is not site-relative
    /// - `origin` is not a bare http(s) origin
    /// - `listen_addr` is not a socket address
    /// - `timeout_ms`, `max_bytes` or `max_redirects` are out of range
    /// - `user_agent` is empty
    ///
    /// Returns `ConfigError::Missing` if `core_assets` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version_tag.is_empty() {
            return Err(invalid("version_tag", "must not be empty"));
        }
        if self.version_tag.chars().any(char::is_whitespace) {
            return Err(invalid("version_tag", "must not contain whitespace"));
        }

        if self.core_assets.is_empty() {
            return Err(ConfigError::Missing {
                field: "core_assets".into(),
                hint: "list at least the root document, e.g. [\"/\"]".into(),
            });
        }
        if let Some(asset) = self.core_assets.iter().find(|a| !a.starts_with('/')) {
            return Err(invalid("core_assets", format!("{asset} must start with '/'")));
        }

        self.origin_url()?;

        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(invalid("listen_addr", format!("{} is not a socket address", self.listen_addr)));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 512 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 512MB"));
        }

        if self.max_redirects > 20 {
            return Err(invalid("max_redirects", "must not exceed 20"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if !self.core_assets.iter().any(|a| a == "/" || a == "/index.html") {
            tracing::warn!(
                core_assets = self.core_assets.len(),
                "core_assets contains neither / nor /index.html; offline navigation fallback will miss"
            );
        }

        Ok(())
    }

    /// Parse `origin` into a URL, checking it is a bare http(s) origin.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin).map_err(|e| invalid("origin", e.to_string()))?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(invalid("origin", format!("unsupported scheme: {scheme}"))),
        }
        if url.host_str().is_none() {
            return Err(invalid("origin", "must have a host"));
        }
        if url.path() != "/" || url.query().is_some() {
            return Err(invalid("origin", "must not carry a path or query"));
        }

        Ok(url)
    }
}
