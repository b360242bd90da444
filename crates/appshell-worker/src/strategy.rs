//! Fetch strategies and per-request routing.
//!
//! The two caching policies are instances of one [`FetchStrategy`]
//! capability, selected by [`classify`]. Adding a strategy means adding an
//! implementation and a router entry; the interception plumbing in the
//! manager never changes.

use crate::net::{FetchRequest, FetchResponse, Network};
use appshell_cache::{CacheStorage, CacheVersion, RequestKey};
use appshell_core::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

// ==================== Classification ====================

/// What a request is, for routing purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Document navigation: network-first.
    Navigation,
    /// Same-origin GET subresource: stale-while-revalidate.
    Asset,
    /// Not ours: non-GET or cross-origin, untouched.
    Passthrough,
}

/// Classify a request against the worker's origin.
///
/// Navigations are requests in navigate mode or whose Accept header asks for
/// an HTML document.
pub fn classify(origin: &Url, request: &FetchRequest) -> RequestClass {
    if !request.is_get() || !request.same_origin(origin) {
        return RequestClass::Passthrough;
    }
    let wants_html = request
        .accept()
        .map_or(false, |accept| accept.contains("text/html"));
    if request.is_navigation || wants_html {
        RequestClass::Navigation
    } else {
        RequestClass::Asset
    }
}

// ==================== Strategy Seam ====================

/// Everything a strategy needs to answer one request. The version is
/// threaded explicitly; strategies never consult ambient state.
#[derive(Clone)]
pub struct StrategyContext {
    /// The generation whose namespace is current.
    pub version: CacheVersion,

    /// Key of the document root, the last-resort navigation fallback.
    pub root_key: RequestKey,

    /// Shared cache storage.
    pub storage: Arc<RwLock<CacheStorage>>,

    /// Network seam.
    pub network: Arc<dyn Network>,

    /// In-flight background refreshes, awaitable for quiescence.
    pub revalidations: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

/// One caching policy.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// Answer a request.
    async fn fetch(&self, cx: &StrategyContext, request: &FetchRequest) -> Result<FetchResponse>;
}

// ==================== Network First ====================

/// Prefer the live network; on success the response is written through so
/// the freshest markup becomes the offline fallback. The cache is only read
/// when the network is unreachable: first the exact key in the current
/// namespace, then the cached document root from any namespace.
#[derive(Debug, Default)]
pub struct NetworkFirst;

#[async_trait]
impl FetchStrategy for NetworkFirst {
    fn name(&self) -> &'static str {
        "network-first"
    }

    async fn fetch(&self, cx: &StrategyContext, request: &FetchRequest) -> Result<FetchResponse> {
        let key = request.key();
        match cx.network.fetch(request).await {
            Ok(live) => {
                let mut storage = cx.storage.write().await;
                storage.open(&cx.version).put(key, live.to_snapshot());
                Ok(live)
            }
            Err(err) => {
                debug!(url = %request.url, error = %err, "navigation offline, falling back to cache");
                let storage = cx.storage.read().await;
                if let Some(hit) = storage.get(&cx.version).and_then(|ns| ns.match_key(&key)) {
                    return Ok(FetchResponse::from_snapshot(hit));
                }
                if let Some(root) = storage.match_any(&cx.root_key) {
                    return Ok(FetchResponse::from_snapshot(root));
                }
                Err(err)
            }
        }
    }
}

// ==================== Stale While Revalidate ====================

/// Return the cached entry immediately when one exists and refresh it in the
/// background; otherwise wait on the network. The refresh only overwrites
/// the entry with a 200, basic, unredirected response, and its failure never
/// affects the value already returned. A cold miss with a failing network
/// propagates: the cache never invents a response.
#[derive(Debug, Default)]
pub struct StaleWhileRevalidate;

#[async_trait]
impl FetchStrategy for StaleWhileRevalidate {
    fn name(&self) -> &'static str {
        "stale-while-revalidate"
    }

    async fn fetch(&self, cx: &StrategyContext, request: &FetchRequest) -> Result<FetchResponse> {
        let key = request.key();
        let cached = {
            let storage = cx.storage.read().await;
            storage
                .get(&cx.version)
                .and_then(|ns| ns.match_key(&key))
                .cloned()
        };

        match cached {
            Some(snapshot) => {
                let storage = Arc::clone(&cx.storage);
                let network = Arc::clone(&cx.network);
                let version = cx.version.clone();
                let request = request.clone();
                let handle = tokio::spawn(async move {
                    revalidate(storage, network, version, request).await;
                });
                cx.revalidations.lock().await.push(handle);
                Ok(FetchResponse::from_snapshot(&snapshot))
            }
            None => {
                let live = cx.network.fetch(request).await?;
                if live.is_cacheable() {
                    let mut storage = cx.storage.write().await;
                    storage.open(&cx.version).put(key, live.to_snapshot());
                }
                Ok(live)
            }
        }
    }
}

async fn revalidate(
    storage: Arc<RwLock<CacheStorage>>,
    network: Arc<dyn Network>,
    version: CacheVersion,
    request: FetchRequest,
) {
    match network.fetch(&request).await {
        Ok(live) if live.is_cacheable() => {
            let mut storage = storage.write().await;
            storage.open(&version).put(request.key(), live.to_snapshot());
            debug!(url = %request.url, "background refresh stored");
        }
        Ok(live) => {
            debug!(url = %request.url, status = live.status, "background refresh not cacheable, kept entry");
        }
        Err(err) => {
            warn!(url = %request.url, error = %err, "background refresh failed, kept cached value");
        }
    }
}

// ==================== Router ====================

/// Maps a request class to its strategy.
#[derive(Clone)]
pub struct StrategyRouter {
    navigation: Arc<dyn FetchStrategy>,
    asset: Arc<dyn FetchStrategy>,
}

impl StrategyRouter {
    /// The standard routing: network-first documents, stale-while-revalidate
    /// assets.
    pub fn standard() -> Self {
        Self {
            navigation: Arc::new(NetworkFirst),
            asset: Arc::new(StaleWhileRevalidate),
        }
    }

    /// Replace the navigation strategy.
    pub fn with_navigation(mut self, strategy: Arc<dyn FetchStrategy>) -> Self {
        self.navigation = strategy;
        self
    }

    /// Replace the asset strategy.
    pub fn with_asset(mut self, strategy: Arc<dyn FetchStrategy>) -> Self {
        self.asset = strategy;
        self
    }

    /// The strategy for a class; `None` means do not intercept.
    pub fn route(&self, class: RequestClass) -> Option<Arc<dyn FetchStrategy>> {
        match class {
            RequestClass::Navigation => Some(Arc::clone(&self.navigation)),
            RequestClass::Asset => Some(Arc::clone(&self.asset)),
            RequestClass::Passthrough => None,
        }
    }
}
