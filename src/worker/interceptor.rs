//! # Network Interceptor
//!
//! Decides, per request, whether to answer from the network or from the
//! app-shell cache.
//!
//! ## Lifecycle
//!
//! `Installing` → `Installed` → `Activated` → `Serving`. A failed install
//! makes the worker `Redundant`; it then keeps answering from a generation
//! already in storage, if there is one. With nothing to serve, every
//! request passes through untouched.
//!
//! ## Strategies
//!
//! | request | strategy |
//! |---|---|
//! | non-GET | passthrough, never touched |
//! | navigable document | network first, cache then offline document on failure |
//! | shell asset (same origin) | cache first, fetch and store on miss |
//! | anything else | cache, then network, then any cached value |

use crate::shared::WorkerError;
use crate::worker::cache::{CacheStorage, CachedResponse};
use crate::worker::manifest::CacheManifest;
use crate::worker::upstream::Upstream;
use bytes::Bytes;
use futures_util::future::try_join_all;
use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::{Method, Url};
use tokio::sync::{watch, RwLock};

/// Worker lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkerLifecycle {
    Installing,
    Installed,
    Activated,
    Serving,
    /// Install failed; serves a previous generation if one exists
    Redundant,
}

/// Request mode as reported by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    Cors,
    NoCors,
}

/// A request seen by the worker
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InterceptedRequest {
    pub fn new(method: Method, url: Url, mode: RequestMode) -> Self {
        Self {
            method,
            url,
            mode,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url, RequestMode::NoCors)
    }

    pub fn navigate(url: Url) -> Self {
        Self::new(Method::GET, url, RequestMode::Navigate)
    }

    /// Navigation or an HTML document request
    pub fn is_navigation(&self) -> bool {
        if self.mode == RequestMode::Navigate {
            return true;
        }
        self.headers
            .get(ACCEPT)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|accept| accept.contains("text/html"))
    }

    /// Cache key, the URL without fragment
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.to_string()
    }
}

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// The offline document stood in for the requested page
    OfflineFallback,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::OfflineFallback => "offline",
        }
    }
}

/// Outcome of intercepting one request
#[derive(Debug, Clone)]
pub enum Intercepted {
    /// Not handled; send it to the network unchanged
    Passthrough(InterceptedRequest),
    Response(CachedResponse, ResponseSource),
}

/// The app-shell interceptor
#[derive(Debug)]
pub struct Interceptor {
    manifest: CacheManifest,
    caches: CacheStorage,
    upstream: Upstream,
    lifecycle: watch::Sender<WorkerLifecycle>,
    /// Generation fresh responses are stored into; `None` until activation
    serving: RwLock<Option<String>>,
}

impl Interceptor {
    pub fn new(manifest: CacheManifest, caches: CacheStorage, upstream: Upstream) -> Self {
        let (lifecycle, _) = watch::channel(WorkerLifecycle::Installing);
        Self {
            manifest,
            caches,
            upstream,
            lifecycle,
            serving: RwLock::new(None),
        }
    }

    pub fn lifecycle(&self) -> WorkerLifecycle {
        *self.lifecycle.borrow()
    }

    pub fn subscribe_lifecycle(&self) -> watch::Receiver<WorkerLifecycle> {
        self.lifecycle.subscribe()
    }

    pub fn manifest(&self) -> &CacheManifest {
        &self.manifest
    }

    pub fn caches(&self) -> &CacheStorage {
        &self.caches
    }

    fn set_lifecycle(&self, next: WorkerLifecycle) {
        tracing::info!("Worker {:?} -> {:?}", self.lifecycle(), next);
        self.lifecycle.send_replace(next);
    }

    /// Fetch every shell asset into the current generation
    ///
    /// Nothing is stored unless every asset arrived with a 2xx from its own
    /// URL. On failure the worker falls back to an earlier generation.
    pub async fn install(&self) -> Result<(), WorkerError> {
        self.set_lifecycle(WorkerLifecycle::Installing);

        match self.fetch_shell().await {
            Ok(count) => {
                tracing::info!(
                    "Installed {} shell assets into {}",
                    count,
                    self.manifest.generation
                );
                self.set_lifecycle(WorkerLifecycle::Installed);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Shell install failed: {}", e);
                self.fall_back().await;
                self.set_lifecycle(WorkerLifecycle::Redundant);
                Err(e)
            }
        }
    }

    async fn fetch_shell(&self) -> Result<usize, WorkerError> {
        let urls = self.manifest.asset_urls(self.upstream.origin());

        let responses = try_join_all(urls.into_iter().map(|(asset, url)| async move {
            let response = self.upstream.get(&url).await.map_err(|e| WorkerError::Install {
                asset: asset.clone(),
                reason: e.to_string(),
            })?;
            if !response.is_success() {
                return Err(WorkerError::Install {
                    asset,
                    reason: format!("status {}", response.status),
                });
            }
            // A login-gated page answered with the login form
            if response.url != url.as_str() {
                return Err(WorkerError::Install {
                    asset,
                    reason: format!("redirected to {}", response.url),
                });
            }
            Ok::<_, WorkerError>((url.to_string(), response))
        }))
        .await?;

        let count = responses.len();
        self.caches
            .open(&self.manifest.generation)
            .await
            .put_all(responses)
            .await?;
        Ok(count)
    }

    /// Pick the generation to keep serving after a failed install
    async fn fall_back(&self) {
        let previous = if self.caches.has(&self.manifest.generation).await {
            Some(self.manifest.generation.clone())
        } else {
            self.caches.keys().await.pop()
        };

        match &previous {
            Some(name) => tracing::info!("Serving previous shell generation {}", name),
            None => tracing::warn!("No cached shell to fall back to, passing requests through"),
        }
        *self.serving.write().await = previous;
    }

    /// Delete every other cache generation
    pub async fn activate(&self) -> Result<(), WorkerError> {
        if self.lifecycle() < WorkerLifecycle::Installed
            || self.lifecycle() == WorkerLifecycle::Redundant
        {
            return Err(WorkerError::NotInstalled);
        }

        for name in self.caches.keys().await {
            if name != self.manifest.generation {
                tracing::info!("Deleting stale cache generation {}", name);
                self.caches.delete(&name).await?;
            }
        }

        *self.serving.write().await = Some(self.manifest.generation.clone());
        self.set_lifecycle(WorkerLifecycle::Activated);
        Ok(())
    }

    /// Mark the worker as serving
    pub fn serve(&self) {
        if self.lifecycle() == WorkerLifecycle::Activated {
            self.set_lifecycle(WorkerLifecycle::Serving);
        }
    }

    /// Generation currently answering requests
    pub async fn serving_generation(&self) -> Option<String> {
        self.serving.read().await.clone()
    }

    /// Apply the matching strategy to one request
    pub async fn handle(&self, request: InterceptedRequest) -> Result<Intercepted, WorkerError> {
        if request.method != Method::GET {
            return Ok(Intercepted::Passthrough(request));
        }
        if self.lifecycle() < WorkerLifecycle::Activated {
            return Ok(Intercepted::Passthrough(request));
        }
        let Some(generation) = self.serving_generation().await else {
            return Ok(Intercepted::Passthrough(request));
        };

        if request.is_navigation() {
            self.network_first(&generation, request).await
        } else if self.is_shell_asset(&request.url) {
            self.cache_first(&generation, request).await
        } else {
            self.cache_then_network(&generation, request).await
        }
    }

    fn is_shell_asset(&self, url: &Url) -> bool {
        url.origin() == self.upstream.origin().origin() && self.manifest.contains(url.path())
    }

    /// Keep a fresh 2xx answered by the requested URL itself
    async fn store(&self, generation: &str, key: &str, response: &CachedResponse) {
        if !response.is_success() || response.url != key {
            return;
        }
        let cache = self.caches.open(generation).await;
        if let Err(e) = cache.put(key, response.clone()).await {
            tracing::warn!("Could not cache {}: {}", key, e);
        }
    }

    async fn network_first(
        &self,
        generation: &str,
        request: InterceptedRequest,
    ) -> Result<Intercepted, WorkerError> {
        let key = request.cache_key();

        match self.upstream.fetch(&request).await {
            Ok(response) => {
                self.store(generation, &key, &response).await;
                Ok(Intercepted::Response(response, ResponseSource::Network))
            }
            Err(e) => {
                tracing::debug!("Navigation to {} failed, trying cache: {}", key, e);
                if let Some(cached) = self.caches.match_any(&key).await {
                    return Ok(Intercepted::Response(cached, ResponseSource::Cache));
                }

                let offline = self
                    .upstream
                    .origin()
                    .join(&self.manifest.offline_document)
                    .map_err(|e| WorkerError::InvalidUrl(e.to_string()))?;
                match self.caches.match_any(offline.as_str()).await {
                    Some(cached) => Ok(Intercepted::Response(
                        cached,
                        ResponseSource::OfflineFallback,
                    )),
                    None => Err(WorkerError::Unavailable(key)),
                }
            }
        }
    }

    async fn cache_first(
        &self,
        generation: &str,
        request: InterceptedRequest,
    ) -> Result<Intercepted, WorkerError> {
        let key = request.cache_key();

        if let Some(cached) = self.caches.match_any(&key).await {
            return Ok(Intercepted::Response(cached, ResponseSource::Cache));
        }

        match self.upstream.fetch(&request).await {
            Ok(response) => {
                self.store(generation, &key, &response).await;
                Ok(Intercepted::Response(response, ResponseSource::Network))
            }
            Err(e) => {
                tracing::debug!("Shell asset {} unavailable: {}", key, e);
                Err(WorkerError::Unavailable(key))
            }
        }
    }

    async fn cache_then_network(
        &self,
        generation: &str,
        request: InterceptedRequest,
    ) -> Result<Intercepted, WorkerError> {
        let key = request.cache_key();

        if let Some(cached) = self.caches.match_any(&key).await {
            return Ok(Intercepted::Response(cached, ResponseSource::Cache));
        }

        match self.upstream.fetch(&request).await {
            Ok(response) => {
                self.store(generation, &key, &response).await;
                Ok(Intercepted::Response(response, ResponseSource::Network))
            }
            Err(e) => match self.caches.match_any(&key).await {
                Some(cached) => Ok(Intercepted::Response(cached, ResponseSource::Cache)),
                None => {
                    tracing::debug!("{} unavailable: {}", key, e);
                    Err(WorkerError::Unavailable(key))
                }
            },
        }
    }
}
