//! Command implementations.

pub mod agent;
pub mod favorites;
pub mod pending;
pub mod push;
pub mod sync;

use anyhow::{Context as _, Result};
use std::sync::Arc;
use storyline_client::{ApiSession, CacheRouter, FetchConfig, HttpNetwork, Network, StoryApi};
use storyline_core::{AppConfig, Store};

/// Everything a command needs, built once from the loaded configuration.
pub struct Context {
    pub config: AppConfig,
    pub store: Store,
    pub network: HttpNetwork,
    pub router: CacheRouter,
}

impl Context {
    pub async fn load() -> Result<Self> {
        let config = AppConfig::load().context("failed to load configuration")?;
        let store = Store::open(&config.db_path)
            .await
            .with_context(|| format!("failed to open store at {}", config.db_path.display()))?;
        let network = HttpNetwork::new(FetchConfig::from(&config))?;
        let shared: Arc<dyn Network> = Arc::new(network.clone());
        let router = CacheRouter::from_config(store.clone(), shared, &config)?;

        tracing::debug!("store opened at {}", config.db_path.display());
        Ok(Self { config, store, network, router })
    }

    /// Story API client whose reads go through the cache router.
    pub fn api(&self) -> Result<StoryApi> {
        let reads: Arc<dyn Network> = Arc::new(self.router.clone());
        Ok(StoryApi::with_reads(&self.network, &self.config.api_base_url, reads)?)
    }

    /// Session built from the configured token.
    pub fn session(&self) -> Result<ApiSession> {
        Ok(ApiSession::new(self.config.require_auth_token()?))
    }
}
