//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (STORYLINE_*)
//! 2. TOML config file (if STORYLINE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (STORYLINE_*)
/// 2. TOML config file (if STORYLINE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding favorites, pending writes and cache generations.
    ///
    /// Set via STORYLINE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Base URL of the remote story API. Requests to its origin are served network-first.
    ///
    /// Set via STORYLINE_API_BASE_URL environment variable.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Base URL the shell assets are served from.
    ///
    /// Set via STORYLINE_APP_BASE_URL environment variable.
    #[serde(default = "default_app_base_url")]
    pub app_base_url: String,

    /// Shell asset paths pre-cached at install, relative to `app_base_url`.
    #[serde(default = "default_precache_manifest")]
    pub precache_manifest: Vec<String>,

    /// Version suffix of the static cache generation (`static-vN`).
    #[serde(default = "default_static_cache_version")]
    pub static_cache_version: u32,

    /// Version suffix of the dynamic cache generation (`dynamic-vN`).
    #[serde(default = "default_dynamic_cache_version")]
    pub dynamic_cache_version: u32,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via STORYLINE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via STORYLINE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Interval between replay sweeps when running the reconciler loop. 0 disables the tick.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// VAPID application server key (URL-safe base64) used for push registrations.
    #[serde(default = "default_vapid_public_key")]
    pub vapid_public_key: String,

    /// Bearer token for the story API.
    ///
    /// Set via STORYLINE_AUTH_TOKEN environment variable. Only handed to API
    /// sessions explicitly, never read from inside core operations.
    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./storyline.sqlite")
}

fn default_api_base_url() -> String {
    "https://story-api.dicoding.dev/v1".into()
}

fn default_app_base_url() -> String {
    "http://localhost:8080/".into()
}

fn default_precache_manifest() -> Vec<String> {
    [
        "./",
        "./index.html",
        "./styles/styles.css",
        "./app.bundle.js",
        "./manifest.json",
        "./sw.js",
        "./icons/icon-144x144.png",
        "./icons/icon-192x192.png",
        "./icons/icon-512x512.png",
        "./favicon.png",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_static_cache_version() -> u32 {
    3
}

fn default_dynamic_cache_version() -> u32 {
    2
}

fn default_user_agent() -> String {
    "storyline/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_sync_interval_secs() -> u64 {
    300
}

fn default_vapid_public_key() -> String {
    "BCCs2eonMI-6H2ctvFaWg-UYdDv387Vno_bzUzALpB442r2lCnsHmtrx8biyPi_E-1fSGABK_Qs_GlvPoJJqxbk".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            api_base_url: default_api_base_url(),
            app_base_url: default_app_base_url(),
            precache_manifest: default_precache_manifest(),
            static_cache_version: default_static_cache_version(),
            dynamic_cache_version: default_dynamic_cache_version(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            sync_interval_secs: default_sync_interval_secs(),
            vapid_public_key: default_vapid_public_key(),
            auth_token: None,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Sweep interval, or `None` when periodic sweeps are disabled.
    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_interval_secs > 0).then(|| Duration::from_secs(self.sync_interval_secs))
    }

    /// Name of the current static cache generation.
    pub fn static_cache_name(&self) -> String {
        format!("static-v{}", self.static_cache_version)
    }

    /// Name of the current dynamic cache generation.
    pub fn dynamic_cache_name(&self) -> String {
        format!("dynamic-v{}", self.dynamic_cache_version)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `STORYLINE_`
    /// 2. TOML file from `STORYLINE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("STORYLINE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("STORYLINE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Bearer token for API calls that need one.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no token is configured.
    pub fn require_auth_token(&self) -> Result<&str, ConfigError> {
        self.auth_token.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "auth_token".into(),
            hint: "Set STORYLINE_AUTH_TOKEN environment variable".into(),
        })
    }
}
