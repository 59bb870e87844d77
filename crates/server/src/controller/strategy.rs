//! Per-class fetch strategies.
//!
//! | class    | order                                   | writes |
//! |----------|-----------------------------------------|--------|
//! | media    | network, then current store             | never  |
//! | document | network, then exact/`/index.html`/`/`   | copy of every network response |
//! | other    | current store, then network             | copy of every network response |
//!
//! Only transport failures fall back. A 404 from the network is a
//! response and is returned (and cached) as-is.

use std::sync::Arc;

use klangreise_core::{Request, RequestKey, Response};
use serde::Serialize;

use super::CacheController;
use super::event::FetchEvent;

/// Where a response handed back to the page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
        }
    }
}

impl std::fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of intercepting one request.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Not intercepted; the host performs its default network handling.
    Passthrough,
    Respond { response: Response, source: ResponseSource },
    /// Neither network nor cache could answer.
    Unavailable,
}

impl FetchOutcome {
    fn network(response: Response) -> Self {
        FetchOutcome::Respond { response, source: ResponseSource::Network }
    }

    fn cache(response: Response) -> Self {
        FetchOutcome::Respond { response, source: ResponseSource::Cache }
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Respond { response, .. } => Some(response),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<ResponseSource> {
        match self {
            FetchOutcome::Respond { source, .. } => Some(*source),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchOutcome::Passthrough => "passthrough",
            FetchOutcome::Respond { .. } => "respond",
            FetchOutcome::Unavailable => "unavailable",
        }
    }
}

/// Request headers that make the origin answer relative to a copy the
/// caller already holds.
const VALIDATOR_HEADERS: &[&str] =
    &["if-none-match", "if-modified-since", "if-match", "if-unmodified-since", "if-range", "range"];

/// `request` without validator headers, so the origin sends a full
/// representation that may be stored.
fn unconditional(request: &Request) -> Request {
    let mut stripped = request.clone();
    stripped
        .headers
        .retain(|(name, _)| !VALIDATOR_HEADERS.iter().any(|v| name.eq_ignore_ascii_case(v)));
    stripped
}

/// Partial content and not-modified answers are not complete entries.
fn is_storable(response: &Response) -> bool {
    !matches!(response.status, 206 | 304)
}

impl CacheController {
    /// Current-store lookup. A storage error is logged and counts as a miss.
    async fn lookup(&self, key: &RequestKey) -> Option<Response> {
        match self.storage.match_request(&self.version, key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(store = %self.version, key = %key, error = %e, "cache lookup failed");
                None
            }
        }
    }

    /// Write `copy` under `key` without delaying the response.
    fn store_in_background(&self, event: &mut FetchEvent, key: RequestKey, copy: Response) {
        if !is_storable(&copy) {
            tracing::debug!(key = %key, status = copy.status, "response not stored");
            return;
        }
        let storage = Arc::clone(&self.storage);
        let store = self.version.clone();
        event.wait_until(async move {
            storage.put(&store, &key, &copy).await.inspect_err(|e| {
                tracing::warn!(store = %store, key = %key, error = %e, "cache write failed");
            })
        });
    }

    /// Media: the network is authoritative; the store is only consulted
    /// when the network is unreachable. Nothing is written, and `Range`
    /// reaches the origin unchanged.
    pub(super) async fn network_with_cache_fallback(&self, request: &Request) -> FetchOutcome {
        match self.network.fetch(request).await {
            Ok(response) => FetchOutcome::network(response),
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "media fetch failed, trying cache");
                match self.lookup(&request.key()).await {
                    Some(hit) => FetchOutcome::cache(hit),
                    None => FetchOutcome::Unavailable,
                }
            }
        }
    }

    /// Documents: network first, refreshing the store on success. Offline,
    /// fall back to the exact entry, then the navigation shells.
    pub(super) async fn network_first(&self, request: &Request, event: &mut FetchEvent) -> FetchOutcome {
        let key = request.key();
        match self.network.fetch(&unconditional(request)).await {
            Ok(response) => {
                self.store_in_background(event, key, response.clone());
                FetchOutcome::network(response)
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "document fetch failed, trying cache");
                if let Some(hit) = self.lookup(&key).await {
                    return FetchOutcome::cache(hit);
                }
                for fallback in &self.navigation_fallbacks {
                    if let Some(hit) = self.lookup(fallback).await {
                        tracing::debug!(url = %request.url, fallback = %fallback.url, "serving navigation fallback");
                        return FetchOutcome::cache(hit);
                    }
                }
                FetchOutcome::Unavailable
            }
        }
    }

    /// Everything else: serve from the store, filling it on a miss.
    pub(super) async fn cache_first(&self, request: &Request, event: &mut FetchEvent) -> FetchOutcome {
        let key = request.key();
        if let Some(hit) = self.lookup(&key).await {
            return FetchOutcome::cache(hit);
        }

        match self.network.fetch(&unconditional(request)).await {
            Ok(response) => {
                self.store_in_background(event, key, response.clone());
                FetchOutcome::network(response)
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "fetch failed on cache miss");
                FetchOutcome::Unavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingStorage, FakeNetwork, ORIGIN, active_controller, core_asset_routes, event};
    use klangreise_core::{CacheStorage, Destination, MemoryStorage};
    use url::Url;

    async fn stored(storage: &MemoryStorage, path: &str) -> Option<Response> {
        let key = RequestKey::get(&format!("{ORIGIN}{path}")).unwrap();
        storage.match_request("klangreise-v1", &key).await.unwrap()
    }

    #[tokio::test]
    async fn test_post_is_not_intercepted() {
        let network = FakeNetwork::online(core_asset_routes());
        let controller = active_controller(MemoryStorage::new(), network.clone()).await;
        let url = Url::parse(&format!("{ORIGIN}/index.html")).unwrap();
        let mut event = FetchEvent::new(Request::new("POST", url, Destination::Document));

        assert!(matches!(controller.handle_fetch(&mut event).await, FetchOutcome::Passthrough));
        assert_eq!(event.pending(), 0);
    }

    #[tokio::test]
    async fn test_cross_origin_is_not_intercepted() {
        let network = FakeNetwork::online(core_asset_routes());
        let controller = active_controller(MemoryStorage::new(), network.clone()).await;
        let before = network.requests();

        let url = Url::parse("https://cdn.example.org/lib.js").unwrap();
        let mut event = FetchEvent::new(Request::get(url, Destination::Script));

        assert!(matches!(controller.handle_fetch(&mut event).await, FetchOutcome::Passthrough));
        assert_eq!(network.requests(), before);
    }

    #[tokio::test]
    async fn test_document_online_returns_live_and_stores_copy() {
        let storage = MemoryStorage::new();
        let network = FakeNetwork::online(core_asset_routes());
        let controller = active_controller(storage.clone(), network.clone()).await;
        storage.delete("klangreise-v1").await.unwrap();
        network.set_route("/index.html", Response::new(200, "<h1>v2</h1>"));

        let mut event = event("/index.html", Destination::Document);
        let outcome = controller.handle_fetch(&mut event).await;

        assert_eq!(outcome.source(), Some(ResponseSource::Network));
        assert_eq!(outcome.response().unwrap().body, "<h1>v2</h1>");
        assert_eq!(event.settled().await.completed, 1);
        assert_eq!(stored(&storage, "/index.html").await.unwrap().body, "<h1>v2</h1>");
    }

    #[tokio::test]
    async fn test_document_offline_exact_entry() {
        let storage = MemoryStorage::new();
        let network = FakeNetwork::online(core_asset_routes());
        network.set_route("/about", Response::new(200, "about page"));
        let controller = active_controller(storage.clone(), network.clone()).await;

        let mut warm = event("/about", Destination::Document);
        controller.handle_fetch(&mut warm).await;
        warm.settled().await;

        network.set_online(false);
        let mut event = event("/about", Destination::Document);
        let outcome = controller.handle_fetch(&mut event).await;

        assert_eq!(outcome.source(), Some(ResponseSource::Cache));
        assert_eq!(outcome.response().unwrap().body, "about page");
    }

    #[tokio::test]
    async fn test_document_offline_falls_back_to_index() {
        let storage = MemoryStorage::new();
        let network = FakeNetwork::online(core_asset_routes());
        let controller = active_controller(storage.clone(), network.clone()).await;
        network.set_online(false);

        let mut event = event("/reise/kapitel-3", Destination::Document);
        let outcome = controller.handle_fetch(&mut event).await;

        let response = outcome.response().unwrap();
        assert_eq!(outcome.source(), Some(ResponseSource::Cache));
        assert_eq!(response.url, format!("{ORIGIN}/index.html"));
    }

    #[tokio::test]
    async fn test_document_offline_falls_back_to_root() {
        let storage = MemoryStorage::new();
        let network = FakeNetwork::online(core_asset_routes());
        let controller = active_controller(storage.clone(), network.clone()).await;
        network.set_online(false);

        let root = RequestKey::get(&format!("{ORIGIN}/")).unwrap();
        storage.delete("klangreise-v1").await.unwrap();
        storage.put("klangreise-v1", &root, &Response::new(200, "root shell")).await.unwrap();
        assert!(stored(&storage, "/index.html").await.is_none());

        let mut event = event("/reise", Destination::Document);
        let outcome = controller.handle_fetch(&mut event).await;
        assert_eq!(outcome.response().unwrap().body, "root shell");
    }

    #[tokio::test]
    async fn test_document_offline_nothing_cached() {
        let storage = MemoryStorage::new();
        let network = FakeNetwork::online(core_asset_routes());
        let controller = active_controller(storage.clone(), network.clone()).await;
        storage.delete("klangreise-v1").await.unwrap();
        network.set_online(false);

        let mut event = event("/reise", Destination::Document);
        assert!(matches!(controller.handle_fetch(&mut event).await, FetchOutcome::Unavailable));
    }

    #[tokio::test]
    async fn test_document_error_status_is_returned_and_cached() {
        let storage = MemoryStorage::new();
        let network = FakeNetwork::online(core_asset_routes());
        let controller = active_controller(storage.clone(), network.clone()).await;

        let mut event = event("/missing", Destination::Document);
        let outcome = controller.handle_fetch(&mut event).await;
        event.settled().await;

        assert_eq!(outcome.response().unwrap().status, 404);
        assert_eq!(stored(&storage, "/missing").await.unwrap().status, 404);
    }

    #[tokio::test]
    async fn test_media_online_is_never_cached() {
        let storage = MemoryStorage::new();
        let network = FakeNetwork::online(core_asset_routes());
        network.set_route("/assets/audio/wald.mp3", Response::new(200, "ogg bytes"));
        let controller = active_controller(storage.clone(), network.clone()).await;

        let mut event = event("/assets/audio/wald.mp3", Destination::Audio);
        let outcome = controller.handle_fetch(&mut event).await;

        assert_eq!(outcome.source(), Some(ResponseSource::Network));
        assert_eq!(event.pending(), 0);
        event.settled().await;
        assert!(stored(&storage, "/assets/audio/wald.mp3").await.is_none());
    }

    #[tokio::test]
    async fn test_media_offline_uses_cached_entry() {
        let storage = MemoryStorage::new();
        let network = FakeNetwork::online(core_asset_routes());
        let controller = active_controller(storage.clone(), network.clone()).await;
        let key = RequestKey::get(&format!("{ORIGIN}/assets/video/intro.webm")).unwrap();
        storage.put("klangreise-v1", &key, &Response::new(200, "video")).await.unwrap();
        network.set_online(false);

        let mut event = event("/assets/video/intro.webm", Destination::Video);
        let outcome = controller.handle_fetch(&mut event).await;

        assert_eq!(outcome.source(), Some(ResponseSource::Cache));
        assert_eq!(outcome.response().unwrap().body, "video");
    }

    #[tokio::test]
    async fn test_media_offline_without_entry_fails() {
        let network = FakeNetwork::online(core_asset_routes());
        let controller = active_controller(MemoryStorage::new(), network.clone()).await;
        network.set_online(false);

        let mut event = event("/assets/audio/meer.mp3", Destination::Audio);
        assert!(matches!(controller.handle_fetch(&mut event).await, FetchOutcome::Unavailable));
    }

    #[tokio::test]
    async fn test_other_second_request_skips_network() {
        let storage = MemoryStorage::new();
        let network = FakeNetwork::online(core_asset_routes());
        network.set_route("/assets/app.js", Response::new(200, "console.log(1)"));
        let controller = active_controller(storage.clone(), network.clone()).await;

        let mut first = event("/assets/app.js", Destination::Script);
        let outcome = controller.handle_fetch(&mut first).await;
        assert_eq!(outcome.source(), Some(ResponseSource::Network));
        first.settled().await;
        assert_eq!(network.hits("/assets/app.js"), 1);

        let mut second = event("/assets/app.js", Destination::Script);
        let outcome = controller.handle_fetch(&mut second).await;
        assert_eq!(outcome.source(), Some(ResponseSource::Cache));
        assert_eq!(outcome.response().unwrap().body, "console.log(1)");
        assert_eq!(network.hits("/assets/app.js"), 1);
    }

    #[tokio::test]
    async fn test_other_core_asset_served_from_install() {
        let network = FakeNetwork::online(core_asset_routes());
        let controller = active_controller(MemoryStorage::new(), network.clone()).await;
        let before = network.hits("/manifest.json");

        let mut event = event("/manifest.json", Destination::Manifest);
        let outcome = controller.handle_fetch(&mut event).await;

        assert_eq!(outcome.source(), Some(ResponseSource::Cache));
        assert_eq!(network.hits("/manifest.json"), before);
    }

    #[tokio::test]
    async fn test_other_offline_miss_is_unavailable() {
        let network = FakeNetwork::online(core_asset_routes());
        let controller = active_controller(MemoryStorage::new(), network.clone()).await;
        network.set_online(false);

        let mut event = event("/assets/fonts/serif.woff2", Destination::Font);
        assert!(matches!(controller.handle_fetch(&mut event).await, FetchOutcome::Unavailable));
        assert_eq!(event.pending(), 0);
    }

    #[tokio::test]
    async fn test_lookup_error_counts_as_miss() {
        let network = FakeNetwork::online(core_asset_routes());
        network.set_route("/assets/style.css", Response::new(200, "body{}"));
        let controller = crate::testing::controller_on(Arc::new(FailingStorage), network.clone());
        controller.recover().await.unwrap();
        controller.activate().await.unwrap();

        let mut event = event("/assets/style.css", Destination::Style);
        let outcome = controller.handle_fetch(&mut event).await;

        assert_eq!(outcome.source(), Some(ResponseSource::Network));
        let settled = event.settled().await;
        assert_eq!(settled.failed, 1);
    }

    #[tokio::test]
    async fn test_validators_not_forwarded_on_cached_paths() {
        let network = FakeNetwork::online(core_asset_routes());
        network.set_route("/assets/app.js", Response::new(200, "console.log(1)"));
        let controller = active_controller(MemoryStorage::new(), network.clone()).await;

        let url = Url::parse(&format!("{ORIGIN}/assets/app.js")).unwrap();
        let request = Request::get(url, Destination::Script)
            .with_header("If-None-Match", "\"abc\"")
            .with_header("range", "bytes=0-3")
            .with_header("accept", "*/*");
        let mut event = FetchEvent::new(request);
        controller.handle_fetch(&mut event).await;

        let seen = network.last_headers();
        assert!(seen.iter().any(|(name, _)| name == "accept"));
        assert!(!seen.iter().any(|(name, _)| name.eq_ignore_ascii_case("if-none-match")));
        assert!(!seen.iter().any(|(name, _)| name == "range"));
    }

    #[tokio::test]
    async fn test_media_range_reaches_origin() {
        let network = FakeNetwork::online(core_asset_routes());
        network.set_route("/assets/audio/wald.mp3", Response::new(206, "ogg"));
        let controller = active_controller(MemoryStorage::new(), network.clone()).await;

        let url = Url::parse(&format!("{ORIGIN}/assets/audio/wald.mp3")).unwrap();
        let mut event = FetchEvent::new(Request::get(url, Destination::Audio).with_header("range", "bytes=100-"));
        let outcome = controller.handle_fetch(&mut event).await;

        assert_eq!(outcome.response().unwrap().status, 206);
        assert!(network.last_headers().contains(&("range".to_string(), "bytes=100-".to_string())));
    }

    #[tokio::test]
    async fn test_partial_and_not_modified_are_not_stored() {
        let storage = MemoryStorage::new();
        let network = FakeNetwork::online(core_asset_routes());
        network.set_route("/assets/app.js", Response::new(206, "cons"));
        network.set_route("/reise", Response::new(304, ""));
        let controller = active_controller(storage.clone(), network.clone()).await;

        let mut partial = event("/assets/app.js", Destination::Script);
        assert_eq!(controller.handle_fetch(&mut partial).await.response().unwrap().status, 206);
        let mut not_modified = event("/reise", Destination::Document);
        assert_eq!(controller.handle_fetch(&mut not_modified).await.response().unwrap().status, 304);

        assert_eq!(partial.pending() + not_modified.pending(), 0);
        assert!(stored(&storage, "/assets/app.js").await.is_none());
        assert!(stored(&storage, "/reise").await.is_none());
    }

    #[tokio::test]
    async fn test_not_modified_is_not_replayed() {
        let storage = MemoryStorage::new();
        let network = FakeNetwork::online(core_asset_routes());
        network.set_route("/assets/app.js", Response::new(304, ""));
        let controller = active_controller(storage.clone(), network.clone()).await;

        let mut first = event("/assets/app.js", Destination::Script);
        controller.handle_fetch(&mut first).await;
        first.settled().await;

        network.set_route("/assets/app.js", Response::new(200, "console.log(1)"));
        let mut second = event("/assets/app.js", Destination::Script);
        let outcome = controller.handle_fetch(&mut second).await;

        assert_eq!(outcome.source(), Some(ResponseSource::Network));
        assert_eq!(outcome.response().unwrap().status, 200);
        second.settled().await;
        assert_eq!(stored(&storage, "/assets/app.js").await.unwrap().body, "console.log(1)");
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = FetchOutcome::cache(Response::new(200, "x"));
        assert_eq!(outcome.kind(), "respond");
        assert_eq!(outcome.source().map(|s| s.to_string()), Some("cache".to_string()));
        assert!(FetchOutcome::Unavailable.response().is_none());
        assert_eq!(FetchOutcome::Passthrough.kind(), "passthrough");
    }
}
