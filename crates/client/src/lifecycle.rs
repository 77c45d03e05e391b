//! Cache agent lifecycle: install, activate, claim.
//!
//! `install` pre-caches the shell manifest into the `static` generation as one
//! unit: every asset is fetched first and the batch is written in a single
//! transaction, so a failed asset leaves the store untouched. `activate` then
//! deletes every generation that is neither the current `static` nor
//! `dynamic` one and broadcasts [`LifecycleEvent::Claimed`].

use crate::fetch::{Network, Request, resolve_manifest};
use std::sync::Arc;
use std::sync::Mutex;
use storyline_core::{AppConfig, CachedResponse, Error, Store};
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;

const MAX_CONCURRENT_PRECACHE: usize = 4;

/// Agent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Created, install not attempted yet.
    Parsed,
    Installing,
    Activating,
    Active,
    /// Install failed; this agent will never activate.
    Redundant,
}

/// Events broadcast to open pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The shell manifest was written to the static generation.
    Installed { static_cache: String, assets: usize },
    /// Stale generations were removed.
    Activated { deleted: Vec<String> },
    /// Open pages should switch to this agent immediately.
    Claimed,
}

/// Drives one cache agent through its lifecycle.
pub struct LifecycleManager {
    store: Store,
    network: Arc<dyn Network>,
    app_base_url: String,
    manifest: Vec<String>,
    static_cache: String,
    dynamic_cache: String,
    state: Mutex<LifecycleState>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleManager {
    pub fn new(store: Store, network: Arc<dyn Network>, config: &AppConfig) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            store,
            network,
            app_base_url: config.app_base_url.clone(),
            manifest: config.precache_manifest.clone(),
            static_cache: config.static_cache_name(),
            dynamic_cache: config.dynamic_cache_name(),
            state: Mutex::new(LifecycleState::Parsed),
            events,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state.lock().map(|s| *s).unwrap_or(LifecycleState::Redundant)
    }

    fn set_state(&self, next: LifecycleState) {
        if let Ok(mut state) = self.state.lock() {
            tracing::info!("lifecycle {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: LifecycleEvent) {
        // no receivers is fine: nothing is open yet
        let _ = self.events.send(event);
    }

    /// Pre-cache the shell manifest.
    ///
    /// A newly installed agent supersedes any earlier one at once; there is no
    /// waiting phase.
    ///
    /// # Errors
    ///
    /// `Error::InstallFailed` if any asset fails to fetch or answers non-200.
    /// The agent is then `Redundant` and nothing was written.
    pub async fn install(&self) -> Result<usize, Error> {
        self.set_state(LifecycleState::Installing);

        match self.precache().await {
            Ok(assets) => {
                self.emit(LifecycleEvent::Installed { static_cache: self.static_cache.clone(), assets });
                Ok(assets)
            }
            Err(e) => {
                tracing::warn!("install failed: {e}");
                self.set_state(LifecycleState::Redundant);
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize, Error> {
        let urls = resolve_manifest(&self.app_base_url, &self.manifest)
            .map_err(|e| Error::InstallFailed(e.to_string()))?;

        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_PRECACHE));
        let mut join_set = JoinSet::new();

        for (idx, url) in urls.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let network = self.network.clone();
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::InstallFailed(e.to_string()))?;
                let request = Request::get(url);
                let response = network
                    .fetch(&request)
                    .await
                    .map_err(|e| Error::InstallFailed(format!("{}: {e}", request.url)))?;
                if !response.is_cacheable() {
                    return Err(Error::InstallFailed(format!(
                        "{} answered {}",
                        request.url,
                        response.status.as_u16()
                    )));
                }
                Ok::<_, Error>((idx, response.to_cached(&request)))
            });
        }

        let mut entries: Vec<(usize, CachedResponse)> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let result = joined.map_err(|e| Error::InstallFailed(e.to_string()))?;
            match result {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    join_set.shutdown().await;
                    return Err(e);
                }
            }
        }

        entries.sort_by_key(|(idx, _)| *idx);
        let entries: Vec<CachedResponse> = entries.into_iter().map(|(_, entry)| entry).collect();

        self.store
            .put_responses(&self.static_cache, &entries)
            .await
            .map_err(|e| Error::InstallFailed(format!("writing {}: {e}", self.static_cache)))?;

        tracing::info!("pre-cached {} assets into {}", entries.len(), self.static_cache);
        Ok(entries.len())
    }

    /// Delete stale generations, then claim open pages.
    ///
    /// Returns the names of the deleted generations.
    pub async fn activate(&self) -> Result<Vec<String>, Error> {
        if self.state() == LifecycleState::Redundant {
            return Err(Error::InstallFailed("agent is redundant and cannot activate".into()));
        }
        self.set_state(LifecycleState::Activating);

        let mut deleted = Vec::new();
        for name in self.store.generation_names().await? {
            if name == self.static_cache || name == self.dynamic_cache {
                continue;
            }
            if self.store.delete_generation(&name).await? {
                tracing::info!("deleted stale cache generation {name}");
                deleted.push(name);
            }
        }

        self.set_state(LifecycleState::Active);
        self.emit(LifecycleEvent::Activated { deleted: deleted.clone() });
        self.emit(LifecycleEvent::Claimed);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedNetwork;

    fn make_config() -> AppConfig {
        AppConfig {
            app_base_url: "http://localhost:8080/".into(),
            precache_manifest: vec!["./".into(), "./index.html".into(), "./styles/styles.css".into()],
            static_cache_version: 3,
            dynamic_cache_version: 2,
            ..Default::default()
        }
    }

    fn full_network() -> ScriptedNetwork {
        ScriptedNetwork::new()
            .route("http://localhost:8080/", 200, b"<html>")
            .route("http://localhost:8080/index.html", 200, b"<html>")
            .route("http://localhost:8080/styles/styles.css", 200, b"body{}")
    }

    #[tokio::test]
    async fn test_install_writes_whole_manifest() {
        let store = Store::open_in_memory().await.unwrap();
        let manager = LifecycleManager::new(store.clone(), Arc::new(full_network()), &make_config());
        let mut events = manager.subscribe();

        assert_eq!(manager.state(), LifecycleState::Parsed);
        assert_eq!(manager.install().await.unwrap(), 3);
        assert_eq!(store.count_entries("static-v3").await.unwrap(), 3);
        assert_eq!(
            events.recv().await.unwrap(),
            LifecycleEvent::Installed { static_cache: "static-v3".into(), assets: 3 }
        );
    }

    #[tokio::test]
    async fn test_install_is_atomic_on_failed_asset() {
        let store = Store::open_in_memory().await.unwrap();
        let network = full_network();
        network.set("http://localhost:8080/styles/styles.css", 500, b"oops");
        let manager = LifecycleManager::new(store.clone(), Arc::new(network), &make_config());

        let result = manager.install().await;
        assert!(matches!(result, Err(Error::InstallFailed(_))));
        assert_eq!(manager.state(), LifecycleState::Redundant);
        assert_eq!(store.count_entries("static-v3").await.unwrap(), 0);
        assert!(manager.activate().await.is_err());
    }

    #[tokio::test]
    async fn test_install_fails_when_offline() {
        let store = Store::open_in_memory().await.unwrap();
        let network = full_network();
        network.set_offline(true);
        let manager = LifecycleManager::new(store.clone(), Arc::new(network), &make_config());

        assert!(manager.install().await.is_err());
        assert!(store.generation_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_activate_deletes_stale_generations() {
        let store = Store::open_in_memory().await.unwrap();
        for name in ["static-v1", "static-v2", "dynamic-v1", "dynamic-v2"] {
            store.open_generation(name).await.unwrap();
        }
        let manager = LifecycleManager::new(store.clone(), Arc::new(full_network()), &make_config());
        let mut events = manager.subscribe();

        manager.install().await.unwrap();
        let mut deleted = manager.activate().await.unwrap();
        deleted.sort();

        assert_eq!(deleted, vec!["dynamic-v1".to_string(), "static-v1".into(), "static-v2".into()]);
        let mut remaining = store.generation_names().await.unwrap();
        remaining.sort();
        assert_eq!(remaining, vec!["dynamic-v2".to_string(), "static-v3".into()]);
        assert_eq!(manager.state(), LifecycleState::Active);

        assert!(matches!(events.recv().await.unwrap(), LifecycleEvent::Installed { .. }));
        assert!(matches!(events.recv().await.unwrap(), LifecycleEvent::Activated { .. }));
        assert_eq!(events.recv().await.unwrap(), LifecycleEvent::Claimed);
    }

    #[tokio::test]
    async fn test_activate_with_nothing_stale() {
        let store = Store::open_in_memory().await.unwrap();
        let manager = LifecycleManager::new(store, Arc::new(full_network()), &make_config());

        manager.install().await.unwrap();
        assert!(manager.activate().await.unwrap().is_empty());
    }
}
