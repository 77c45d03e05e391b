//! Checks applied to an [`AppConfig`] once every layer has been merged.

use crate::config::AppConfig;
use std::ops::RangeInclusive;
use thiserror::Error;

const TIMEOUT_RANGE_MS: RangeInclusive<u64> = 100..=300_000;

/// Longest allowed replay tick (one day).
const MAX_SYNC_INTERVAL_SECS: u64 = 86_400;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.to_string(), reason: reason.into() }
}

fn require_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"))
        .ok_or_else(|| invalid(field, "must be an http(s) URL"))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(invalid(field, "must include a host"));
    }
    Ok(())
}

impl AppConfig {
    /// Reject values the router, lifecycle manager or API client cannot work with.
    ///
    /// An empty pre-cache manifest is allowed but logged, since install then
    /// has nothing to seed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_http_url("api_base_url", &self.api_base_url)?;
        require_http_url("app_base_url", &self.app_base_url)?;

        if !TIMEOUT_RANGE_MS.contains(&self.timeout_ms) {
            return Err(invalid(
                "timeout_ms",
                format!("must be between {} and {} ms", TIMEOUT_RANGE_MS.start(), TIMEOUT_RANGE_MS.end()),
            ));
        }

        if self.sync_interval_secs > MAX_SYNC_INTERVAL_SECS {
            return Err(invalid("sync_interval_secs", "must not exceed one day"));
        }

        if self.user_agent.trim().is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.vapid_public_key.trim().is_empty() {
            return Err(invalid("vapid_public_key", "must not be empty"));
        }

        if let Some(idx) = self.precache_manifest.iter().position(|p| p.trim().is_empty()) {
            return Err(invalid("precache_manifest", format!("entry {idx} is blank")));
        }
        if self.precache_manifest.is_empty() {
            tracing::warn!("precache_manifest is empty; install will not seed {}", self.static_cache_name());
        }

        Ok(())
    }
}
