//! Engine-wide configuration.
//!
//! Assembled from a TOML file, environment variables, and CLI overrides, with
//! precedence CLI > env > file > default, resolved through an explicit loader
//! since this crate has no web-facing config surface to lean on.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Feature flags gating optional subsystems that may be absent entirely.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub external_fallback_enabled: bool,
    pub database_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            external_fallback_enabled: true,
            database_enabled: true,
        }
    }
}

/// Retry/backoff parameters for the object cache adapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 200,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

/// Circuit breaker tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    pub window: u32,
    pub threshold: u32,
    pub cool_down_ms: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            window: 20,
            threshold: 5,
            cool_down_ms: 30_000,
        }
    }
}

impl CircuitConfig {
    pub fn cool_down(&self) -> Duration {
        Duration::from_millis(self.cool_down_ms)
    }
}

/// Write-back tie-break policy for the object cache adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WriteBackPolicy {
    #[default]
    KeepExisting,
    PreferIncoming,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub feature: FeatureFlags,
    pub retry_s3: RetryConfig,
    pub search_view_refresh_interval_ms: u64,
    pub cache_local_directory: Option<PathBuf>,
    pub bypass_caches_override: bool,
    pub provider_api_key: Option<String>,
    pub circuit: CircuitConfig,
    pub write_back_policy: WriteBackPolicy,
    pub worker_threads: Option<usize>,
    pub database_url: Option<String>,
    pub object_store_bucket: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            feature: FeatureFlags::default(),
            retry_s3: RetryConfig::default(),
            search_view_refresh_interval_ms: 60_000,
            cache_local_directory: None,
            bypass_caches_override: false,
            provider_api_key: None,
            circuit: CircuitConfig::default(),
            write_back_policy: WriteBackPolicy::default(),
            worker_threads: None,
            database_url: None,
            object_store_bucket: None,
        }
    }
}

impl EngineConfig {
    pub fn search_view_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.search_view_refresh_interval_ms)
    }

    /// Load from an optional TOML file, then overlay recognised environment
    /// variables (dots become underscores, e.g.
    /// `FEATURE_EXTERNAL_FALLBACK_ENABLED`).
    pub fn load(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p)?;
                toml::from_str(&text)?
            }
            _ => EngineConfig::default(),
        };

        if let Ok(val) = std::env::var("FEATURE_EXTERNAL_FALLBACK_ENABLED") {
            config.feature.external_fallback_enabled = val.parse().unwrap_or(true);
        }
        if let Ok(val) = std::env::var("FEATURE_DATABASE_ENABLED") {
            config.feature.database_enabled = val.parse().unwrap_or(true);
        }
        if let Ok(val) = std::env::var("PROVIDER_API_KEY") {
            config.provider_api_key = Some(val);
        }
        if let Ok(val) = std::env::var("DATABASE_URL") {
            config.database_url = Some(val);
        }
        if let Ok(val) = std::env::var("BYPASS_CACHES_OVERRIDE") {
            config.bypass_caches_override = val.parse().unwrap_or(false);
        }
        if let Ok(val) = std::env::var("SEARCH_VIEW_REFRESH_INTERVAL_MS")
            && let Ok(parsed) = val.parse()
        {
            config.search_view_refresh_interval_ms = parsed;
        }

        Ok(config)
    }
}
