//! Purge pipeline configuration.
//!
//! Controls how `X-Cache-Invalidate` decisions are forwarded downstream.

use serde::Deserialize;
use url::Url;

const DEFAULT_AUTO_CONSUME_INTERVAL_MS: u64 = 2000;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;

/// Purge configuration from the `[cache]` section of `quire.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Queue purge events at all.
    pub enabled: bool,
    /// Webhook receiving the merged purge plan. Without it purges are only logged.
    pub purge_url: Option<Url>,
    /// Forward purges as soon as a response carries the header.
    pub consume_immediately: bool,
    /// Auto-consume interval (ms) for queued purges.
    pub auto_consume_interval_ms: u64,
    /// Maximum events per consumption batch.
    pub consume_batch_limit: usize,
    /// Timeout for a single webhook call.
    pub request_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            purge_url: None,
            consume_immediately: false,
            auto_consume_interval_ms: DEFAULT_AUTO_CONSUME_INTERVAL_MS,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            purge_url: settings.purge_url.clone(),
            consume_immediately: settings.consume_immediately,
            auto_consume_interval_ms: settings.auto_consume_interval_ms,
            consume_batch_limit: settings.consume_batch_limit,
            request_timeout_ms: settings.request_timeout_ms,
        }
    }
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Batch limit clamped to at least one event.
    pub fn batch_limit(&self) -> usize {
        self.consume_batch_limit.max(1)
    }
}
