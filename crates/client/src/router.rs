//! Request interception with per-origin cache strategies.
//!
//! - Story API origin: network first, falling back to the `dynamic` generation
//!   when the network is unreachable.
//! - Any other origin: `static` then `dynamic`, network on a miss, and the
//!   live response is copied into `dynamic`.
//!
//! Only status 200 responses are ever written. Non-GET requests are passed
//! straight through.

use crate::fetch::{Network, Request, Response, same_origin};
use reqwest::{Method, Url};
use std::sync::Arc;
use storyline_core::{AppConfig, Error, Store};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    /// Live network response.
    Network,
    /// Cache hit without touching the network.
    Cache,
    /// Cached copy served because the network failed.
    Offline,
    /// Non-GET request forwarded untouched.
    PassThrough,
}

/// A response together with its [`CacheSource`].
#[derive(Debug, Clone)]
pub struct Served {
    pub response: Response,
    pub source: CacheSource,
}

/// Intercepts outbound requests and applies the cache strategies.
#[derive(Clone)]
pub struct CacheRouter {
    store: Store,
    network: Arc<dyn Network>,
    api_origin: Url,
    static_cache: String,
    dynamic_cache: String,
}

impl CacheRouter {
    pub fn new(
        store: Store, network: Arc<dyn Network>, api_origin: Url, static_cache: impl Into<String>,
        dynamic_cache: impl Into<String>,
    ) -> Self {
        Self { store, network, api_origin, static_cache: static_cache.into(), dynamic_cache: dynamic_cache.into() }
    }

    /// Build a router from the application configuration.
    pub fn from_config(store: Store, network: Arc<dyn Network>, config: &AppConfig) -> Result<Self, Error> {
        let api_origin = Url::parse(&config.api_base_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self::new(store, network, api_origin, config.static_cache_name(), config.dynamic_cache_name()))
    }

    pub fn static_cache(&self) -> &str {
        &self.static_cache
    }

    pub fn dynamic_cache(&self) -> &str {
        &self.dynamic_cache
    }

    /// Whether `url` belongs to the story API.
    pub fn is_api(&self, url: &Url) -> bool {
        same_origin(url, &self.api_origin)
    }

    /// Produce a response for `request`.
    ///
    /// # Errors
    ///
    /// Propagates the network error when neither the network nor the cache can
    /// answer. No placeholder content is synthesized.
    pub async fn handle(&self, request: &Request) -> Result<Served, Error> {
        if request.method != Method::GET {
            let response = self.network.fetch(request).await?;
            return Ok(Served { response, source: CacheSource::PassThrough });
        }

        if self.is_api(&request.url) { self.network_first(request).await } else { self.cache_first(request).await }
    }

    async fn network_first(&self, request: &Request) -> Result<Served, Error> {
        match self.network.fetch(request).await {
            Ok(response) => {
                self.populate(request, &response).await;
                Ok(Served { response, source: CacheSource::Network })
            }
            Err(err) if err.is_network() => {
                let generations = vec![self.dynamic_cache.clone()];
                match self.lookup(generations, request).await {
                    Some(response) => {
                        tracing::debug!("network failed, serving {} from {}", request.url, self.dynamic_cache);
                        Ok(Served { response, source: CacheSource::Offline })
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn cache_first(&self, request: &Request) -> Result<Served, Error> {
        let generations = vec![self.static_cache.clone(), self.dynamic_cache.clone()];
        if let Some(response) = self.lookup(generations, request).await {
            tracing::debug!("cache hit for {}", request.url);
            return Ok(Served { response, source: CacheSource::Cache });
        }

        tracing::debug!("cache miss for {}", request.url);
        let response = self.network.fetch(request).await?;
        self.populate(request, &response).await;
        Ok(Served { response, source: CacheSource::Network })
    }

    /// Lookup failures count as misses.
    async fn lookup(&self, generations: Vec<String>, request: &Request) -> Option<Response> {
        let hit = match self
            .store
            .match_in(generations, request.method.as_str(), request.url.as_str())
            .await
        {
            Ok(hit) => hit?,
            Err(e) => {
                tracing::warn!("cache lookup failed for {}: {e}", request.url);
                return None;
            }
        };

        match Response::from_cached(hit) {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::warn!("discarding unreadable cache entry for {}: {e}", request.url);
                None
            }
        }
    }

    /// Copy a 200 response into the `dynamic` generation.
    ///
    /// The write runs on its own task so it completes even if the caller stops
    /// polling. Failures are logged only.
    async fn populate(&self, request: &Request, response: &Response) {
        if !response.is_cacheable() {
            tracing::debug!("not caching {} (status {})", request.url, response.status.as_u16());
            return;
        }

        let store = self.store.clone();
        let generation = self.dynamic_cache.clone();
        let entry = response.to_cached(request);
        let task = tokio::spawn(async move { store.put_response(&generation, &entry).await });

        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("failed to cache {}: {e}", request.url),
            Err(e) => tracing::warn!("cache write task for {} aborted: {e}", request.url),
        }
    }
}

/// Lets the router stand in wherever a plain network is expected, so API
/// reads go through the cache strategies.
#[async_trait::async_trait]
impl Network for CacheRouter {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.handle(request).await.map(|served| served.response)
    }
}
