//! Test doubles shared by the controller and registration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use klangreise_client::Network;
use klangreise_core::config::DEFAULT_CORE_ASSETS;
use klangreise_core::{CacheStorage, Destination, Error, MemoryStorage, Request, RequestKey, Response};
use url::Url;

use crate::controller::{CacheController, ControllerConfig, FetchEvent};

pub const ORIGIN: &str = "https://klangreise.example";

/// Scripted origin server. Unknown paths answer 404; offline, every fetch
/// is a transport error. Every call is counted, online or not.
#[derive(Default)]
pub struct FakeNetwork {
    routes: Mutex<HashMap<String, Response>>,
    hits: Mutex<HashMap<String, usize>>,
    last_headers: Mutex<Vec<(String, String)>>,
    offline: AtomicBool,
    requests: AtomicUsize,
}

impl FakeNetwork {
    pub fn online(routes: Vec<(String, Response)>) -> Arc<Self> {
        let network = Self::default();
        network.routes.lock().unwrap().extend(routes);
        Arc::new(network)
    }

    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    pub fn set_route(&self, path: &str, response: Response) {
        self.routes.lock().unwrap().insert(path.to_string(), response);
    }

    pub fn remove_route(&self, path: &str) {
        self.routes.lock().unwrap().remove(path);
    }

    /// Total fetch calls.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Headers of the most recent fetch.
    pub fn last_headers(&self) -> Vec<(String, String)> {
        self.last_headers.lock().unwrap().clone()
    }

    /// Fetch calls for one path.
    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let path = request.url.path().to_string();
        *self.hits.lock().unwrap().entry(path.clone()).or_default() += 1;
        *self.last_headers.lock().unwrap() = request.headers.clone();

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("{}: connection refused", request.url)));
        }

        let response = self
            .routes
            .lock()
            .unwrap()
            .get(&path)
            .cloned()
            .unwrap_or_else(|| Response::new(404, "not found"));
        Ok(response.with_url(request.url.as_str()))
    }
}

/// Storage whose lookups and writes always fail. It reports every store
/// as present so a controller can recover and activate on top of it.
pub struct FailingStorage;

#[async_trait]
impl CacheStorage for FailingStorage {
    async fn open(&self, _name: &str) -> Result<(), Error> {
        Ok(())
    }

    async fn has(&self, _name: &str) -> Result<bool, Error> {
        Ok(true)
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(Vec::new())
    }

    async fn delete(&self, _name: &str) -> Result<bool, Error> {
        Ok(false)
    }

    async fn match_request(&self, _name: &str, _key: &RequestKey) -> Result<Option<Response>, Error> {
        Err(Error::InvalidState("disk on fire".into()))
    }

    async fn put(&self, _name: &str, _key: &RequestKey, _response: &Response) -> Result<(), Error> {
        Err(Error::InvalidState("disk on fire".into()))
    }

    async fn put_all(&self, _name: &str, _entries: &[(RequestKey, Response)]) -> Result<(), Error> {
        Err(Error::InvalidState("disk on fire".into()))
    }

    async fn entry_count(&self, _name: &str) -> Result<u64, Error> {
        Ok(0)
    }
}

/// 200 responses for every default core asset.
pub fn core_asset_routes() -> Vec<(String, Response)> {
    DEFAULT_CORE_ASSETS
        .iter()
        .map(|path| {
            let body = format!("asset {path}");
            let response = if path.ends_with(".png") {
                Response::new(200, body).with_header("content-type", "image/png")
            } else {
                Response::new(200, body).with_header("content-type", "text/html")
            };
            (path.to_string(), response)
        })
        .collect()
}

pub fn controller_on(storage: Arc<dyn CacheStorage>, network: Arc<FakeNetwork>) -> CacheController {
    controller_on_version(storage, network, "klangreise-v1")
}

fn controller_on_version(storage: Arc<dyn CacheStorage>, network: Arc<FakeNetwork>, tag: &str) -> CacheController {
    let config = ControllerConfig {
        version_tag: tag.to_string(),
        core_assets: DEFAULT_CORE_ASSETS.iter().map(|s| s.to_string()).collect(),
        origin: Url::parse(ORIGIN).unwrap(),
    };
    CacheController::new(config, storage, network).unwrap()
}

pub fn controller_with(storage: MemoryStorage, network: Arc<FakeNetwork>) -> CacheController {
    controller_on(Arc::new(storage), network)
}

pub fn controller_for_version(storage: MemoryStorage, network: Arc<FakeNetwork>, tag: &str) -> CacheController {
    controller_on_version(Arc::new(storage), network, tag)
}

/// Installed and activated controller over `storage`.
pub async fn active_controller(storage: MemoryStorage, network: Arc<FakeNetwork>) -> CacheController {
    let controller = controller_with(storage, network);
    controller.install().await.unwrap();
    controller.activate().await.unwrap();
    controller
}

/// GET event for a site path.
pub fn event(path: &str, destination: Destination) -> FetchEvent {
    let url = Url::parse(&format!("{ORIGIN}{path}")).unwrap();
    FetchEvent::new(Request::get(url, destination))
}
