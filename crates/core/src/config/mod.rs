//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (KLANGREISE_*)
//! 2. TOML config file (if KLANGREISE_CONFIG_FILE set, or passed explicitly)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Version tag of the current cache generation.
pub const DEFAULT_VERSION_TAG: &str = "klangreise-v1";

/// Files the page needs to work offline right after install.
pub const DEFAULT_CORE_ASSETS: &[&str] = &[
    "/",
    "/index.html",
    "/manifest.json",
    "/assets/images/icon-192.png",
    "/assets/images/icon-512.png",
    "/assets/images/icon-180.png",
];

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (KLANGREISE_*)
/// 2. TOML config file
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name of the current cache store. Bumping it invalidates every
    /// other store at the next activation.
    ///
    /// Set via KLANGREISE_VERSION_TAG environment variable.
    #[serde(default = "default_version_tag")]
    pub version_tag: String,

    /// Site-relative URLs fetched eagerly at install.
    ///
    /// Set via KLANGREISE_CORE_ASSETS environment variable (`[a, b]` syntax).
    #[serde(default = "default_core_assets")]
    pub core_assets: Vec<String>,

    /// Origin serving the deployable directory.
    ///
    /// Set via KLANGREISE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Address the proxy host listens on.
    ///
    /// Set via KLANGREISE_LISTEN_ADDR environment variable.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Path to SQLite cache database.
    ///
    /// Set via KLANGREISE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via KLANGREISE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via KLANGREISE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to fetch per request. Audio files go through the
    /// same client, so the default is generous.
    ///
    /// Set via KLANGREISE_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Maximum number of redirects followed per request.
    ///
    /// Set via KLANGREISE_MAX_REDIRECTS environment variable.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

fn default_version_tag() -> String {
    DEFAULT_VERSION_TAG.into()
}

fn default_core_assets() -> Vec<String> {
    DEFAULT_CORE_ASSETS.iter().map(|s| s.to_string()).collect()
}

fn default_origin() -> String {
    "http://127.0.0.1:8080".into()
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./klangreise-cache.sqlite")
}

fn default_user_agent() -> String {
    "klangreise-sw/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    67_108_864 // 64MB
}

fn default_max_redirects() -> usize {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version_tag: default_version_tag(),
            core_assets: default_core_assets(),
            origin: default_origin(),
            listen_addr: default_listen_addr(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            max_redirects: default_max_redirects(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `KLANGREISE_`
    /// 2. TOML file from `KLANGREISE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var("KLANGREISE_CONFIG_FILE").ok().map(PathBuf::from);
        Self::load_from(file.as_deref())
    }

    /// Same as [`AppConfig::load`] with an explicit TOML file layer.
    pub fn load_from(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(config_file)
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(
            Env::prefixed("KLANGREISE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        )
    }
}
