//! The cache controller.
//!
//! Sits between the page and the network for one origin. Three lifecycle
//! events manage the versioned store:
//!
//! - **install**: fetch every core asset and store them in the store named
//!   by the version tag, all or nothing; requests skip-waiting.
//! - **activate**: delete every store whose name is not the version tag;
//!   claims clients.
//! - **fetch**: classify each same-origin GET and answer it with the
//!   strategy for its class (see [`strategy`]).
//!
//! Storage and network are injected trait objects so the controller runs
//! the same against SQLite and a real origin or against in-memory fakes.

pub mod classify;
pub mod event;
pub mod lifecycle;
pub mod strategy;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::try_join_all;
use klangreise_client::{Network, resolve, same_origin};
use klangreise_core::{AppConfig, CacheStorage, Destination, Error, Request, RequestKey, Response};
use serde::Serialize;
use tokio::sync::RwLock;
use url::Url;

pub use classify::{Classification, classify};
pub use event::{FetchEvent, Settled};
pub use lifecycle::WorkerState;
pub use strategy::{FetchOutcome, ResponseSource};

/// Site paths tried, in order, when a navigation is offline and uncached.
const NAVIGATION_FALLBACKS: &[&str] = &["/index.html", "/"];

/// Static inputs of a controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub version_tag: String,
    pub core_assets: Vec<String>,
    pub origin: Url,
}

impl TryFrom<&AppConfig> for ControllerConfig {
    type Error = Error;

    fn try_from(config: &AppConfig) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidInput(e.to_string()))?;
        Ok(Self { version_tag: config.version_tag.clone(), core_assets: config.core_assets.clone(), origin })
    }
}

/// What install stored.
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub version: String,
    pub assets: Vec<String>,
}

/// What activate evicted.
#[derive(Debug, Clone, Serialize)]
pub struct ActivationReport {
    pub version: String,
    pub evicted: Vec<String>,
}

pub struct CacheController {
    version: String,
    core_assets: Vec<RequestKey>,
    navigation_fallbacks: Vec<RequestKey>,
    origin: Url,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
}

impl std::fmt::Debug for CacheController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheController")
            .field("version", &self.version)
            .field("origin", &self.origin.as_str())
            .field("core_assets", &self.core_assets.len())
            .field("storage", &"<CacheStorage>")
            .field("network", &"<Network>")
            .finish()
    }
}

fn site_key(origin: &Url, path: &str) -> Result<RequestKey, Error> {
    let url = resolve(origin, path).map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))?;
    Ok(RequestKey::new("GET", &url))
}

impl CacheController {
    /// Create a controller in the `uninstalled` state.
    ///
    /// Fails if a core asset does not resolve against the origin.
    pub fn new(
        config: ControllerConfig, storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>,
    ) -> Result<Self, Error> {
        let core_assets = config
            .core_assets
            .iter()
            .map(|path| site_key(&config.origin, path))
            .collect::<Result<Vec<_>, _>>()?;
        let navigation_fallbacks = NAVIGATION_FALLBACKS
            .iter()
            .map(|path| site_key(&config.origin, path))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            version: config.version_tag,
            core_assets,
            navigation_fallbacks,
            origin: config.origin,
            storage,
            network,
            state: RwLock::new(WorkerState::Uninstalled),
            skip_waiting: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
        })
    }

    pub fn from_app_config(
        config: &AppConfig, storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>,
    ) -> Result<Self, Error> {
        Self::new(ControllerConfig::try_from(config)?, storage, network)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// Whether install asked to activate without waiting for old clients.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Whether activate took control of already-open clients.
    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::SeqCst)
    }

    async fn transition(&self, next: WorkerState) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if !state.can_transition_to(next) {
            return Err(Error::InvalidState(format!("{} cannot move from {} to {}", self.version, *state, next)));
        }
        tracing::debug!(version = %self.version, from = %*state, to = %next, "lifecycle transition");
        *state = next;
        Ok(())
    }

    async fn fail(&self) {
        *self.state.write().await = WorkerState::Redundant;
    }

    /// Pick up a store installed by an earlier process.
    ///
    /// An `uninstalled` controller whose store already exists moves to
    /// `installed`; any other state is returned unchanged.
    pub async fn recover(&self) -> Result<WorkerState, Error> {
        let mut state = self.state.write().await;
        if *state == WorkerState::Uninstalled && self.storage.has(&self.version).await? {
            tracing::info!(version = %self.version, "recovered installed cache store");
            *state = WorkerState::Installed;
        }
        Ok(*state)
    }

    /// Install event: populate the current store with every core asset.
    ///
    /// All assets are fetched before anything is written; a transport
    /// failure or non-2xx status on any of them fails the whole install and
    /// leaves the controller `redundant`.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        self.transition(WorkerState::Installing).await?;
        self.skip_waiting.store(true, Ordering::SeqCst);

        match self.install_assets().await {
            Ok(report) => {
                self.transition(WorkerState::Installed).await?;
                tracing::info!(version = %self.version, assets = report.assets.len(), "install complete");
                Ok(report)
            }
            Err(e) => {
                self.fail().await;
                tracing::error!(version = %self.version, error = %e, "install failed");
                Err(e)
            }
        }
    }

    async fn install_assets(&self) -> Result<InstallReport, Error> {
        self.storage
            .open(&self.version)
            .await
            .map_err(|e| Error::InstallFailed(format!("open {}: {e}", self.version)))?;

        let entries = try_join_all(self.core_assets.iter().map(|key| self.fetch_core_asset(key))).await?;

        self.storage
            .put_all(&self.version, &entries)
            .await
            .map_err(|e| Error::InstallFailed(format!("store {}: {e}", self.version)))?;

        Ok(InstallReport { version: self.version.clone(), assets: entries.into_iter().map(|(key, _)| key.url).collect() })
    }

    async fn fetch_core_asset(&self, key: &RequestKey) -> Result<(RequestKey, Response), Error> {
        let url = Url::parse(&key.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let request = Request::get(url, Destination::Empty);

        let response = self
            .network
            .fetch(&request)
            .await
            .map_err(|e| Error::InstallFailed(format!("{}: {e}", key.url)))?;

        if !response.is_ok() {
            return Err(Error::InstallFailed(format!("{}: status {}", key.url, response.status)));
        }

        Ok((key.clone(), response))
    }

    /// Activate event: evict every store that is not the current version,
    /// then claim clients.
    pub async fn activate(&self) -> Result<ActivationReport, Error> {
        self.transition(WorkerState::Activating).await?;

        match self.evict_stale().await {
            Ok(evicted) => {
                self.transition(WorkerState::Active).await?;
                self.clients_claimed.store(true, Ordering::SeqCst);
                tracing::info!(version = %self.version, evicted = evicted.len(), "activated");
                Ok(ActivationReport { version: self.version.clone(), evicted })
            }
            Err(e) => {
                self.fail().await;
                tracing::error!(version = %self.version, error = %e, "activation failed");
                Err(e)
            }
        }
    }

    async fn evict_stale(&self) -> Result<Vec<String>, Error> {
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| name != &self.version)
            .collect();

        try_join_all(stale.iter().map(|name| self.storage.delete(name))).await?;

        for name in &stale {
            tracing::debug!(store = %name, "evicted stale cache store");
        }
        Ok(stale)
    }

    /// Fetch event. Non-GET and cross-origin requests, and every request
    /// while this controller is not active, are left to the host.
    pub async fn handle_fetch(&self, event: &mut FetchEvent) -> FetchOutcome {
        if self.state().await != WorkerState::Active || !self.clients_claimed() {
            return FetchOutcome::Passthrough;
        }

        let request = event.request().clone();
        if !request.is_get() || !same_origin(&request.url, &self.origin) {
            tracing::trace!(method = %request.method, url = %request.url, "not intercepted");
            return FetchOutcome::Passthrough;
        }

        let classification = classify(&request);
        tracing::debug!(url = %request.url, %classification, "intercepted");

        match classification {
            Classification::Media => self.network_with_cache_fallback(&request).await,
            Classification::Document => self.network_first(&request, event).await,
            Classification::Other => self.cache_first(&request, event).await,
        }
    }
}
