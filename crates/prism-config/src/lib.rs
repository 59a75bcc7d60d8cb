// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/prism.db".to_string(),
            pool_max_size: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    /// Emit JSON log lines instead of the human readable format.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory for the JSON file cache. `None` keeps the cache in memory.
    pub directory: Option<PathBuf>,
    pub ttl_hours: u64,
    pub max_entries: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours * 60 * 60)
    }

    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.ttl_hours as i64)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: None,
            ttl_hours: 24,
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    pub include_secondary_sources: bool,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
}

impl AggregationConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            include_secondary_sources: true,
            batch_size: 5,
            batch_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicBrainzConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub requests_per_minute: usize,
    pub timeout_secs: u64,
}

impl Default for MusicBrainzConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            requests_per_minute: 50,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub base_url: Option<String>,
    pub auth_url: Option<String>,
    pub requests_per_minute: usize,
    pub timeout_secs: u64,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            base_url: None,
            auth_url: None,
            requests_per_minute: 100,
            timeout_secs: 10,
        }
    }
}

/// Settings shared by the vendors that authenticate with a single key or token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyedSourceConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub requests_per_minute: usize,
    pub timeout_secs: u64,
}

impl KeyedSourceConfig {
    fn with_rate(requests_per_minute: usize) -> Self {
        Self {
            api_key: None,
            base_url: None,
            requests_per_minute,
            timeout_secs: 10,
        }
    }

    /// The configured key, ignoring blank values.
    pub fn key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub musicbrainz: MusicBrainzConfig,
    pub spotify: SpotifyConfig,
    pub youtube: KeyedSourceConfig,
    pub genius: KeyedSourceConfig,
    pub lastfm: KeyedSourceConfig,
    pub discogs: KeyedSourceConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            musicbrainz: MusicBrainzConfig::default(),
            spotify: SpotifyConfig::default(),
            youtube: KeyedSourceConfig::with_rate(100),
            genius: KeyedSourceConfig::with_rate(100),
            lastfm: KeyedSourceConfig::with_rate(60),
            discogs: KeyedSourceConfig::with_rate(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub telemetry: TelemetryConfig,
    pub cache: CacheConfig,
    pub aggregation: AggregationConfig,
    pub sources: SourcesConfig,
}

/// Load configuration from defaults, an optional TOML file and `PRISM_`
/// environment overrides.
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("PRISM_").split("__"));

    let config: AppConfig = figment.extract()?;
    info!(target: "config", "configuration loaded");
    Ok(config)
}
