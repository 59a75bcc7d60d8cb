// SPDX-License-Identifier: GPL-3.0-or-later
pub mod cache;
pub mod gateway;
pub mod sqlite_store;
pub mod store;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use prism_config::{AppConfig, CacheConfig};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

pub use cache::{CacheEntry, FileRecordCache, MemoryRecordCache, RecordCache};
pub use gateway::CacheGateway;
pub use sqlite_store::SqliteRecordStore;
pub use store::{RecordStore, SearchField, SearchPage, SearchQuery, StoreStats, TrackSummary};

/// Connect to the configured SQLite database and run migrations.
pub async fn init_database(config: &AppConfig) -> Result<SqlitePool> {
    info!(target: "infrastructure", "initializing database");

    let db_url = sqlite_url(&config.database.url)?;
    info!(target: "infrastructure", db_url = %db_url, "connecting to database");

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.pool_max_size)
        .connect(&db_url)
        .await?;

    info!(target: "infrastructure", db_url = %config.database.url, "running migrations");
    sqlx::migrate!("../../migrations").run(&pool).await?;

    info!(target: "infrastructure", "database initialized successfully");
    Ok(pool)
}

/// Turn a `sqlite://relative/path.db` URL into an absolute, create-on-open URL,
/// creating the parent directory on the way.
fn sqlite_url(url: &str) -> Result<String> {
    if !url.starts_with("sqlite://") || url.starts_with("sqlite://:memory:") {
        return Ok(url.to_string());
    }

    let db_path = url.trim_start_matches("sqlite://");
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    let path = Path::new(db_path);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
            info!(target: "infrastructure", path = %parent.display(), "created database directory");
        }
    }

    let absolute_path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    // SQLite accepts forward slashes on every platform.
    let path_str = absolute_path.to_string_lossy().replace('\\', "/");
    Ok(format!("sqlite://{}?mode=rwc", path_str))
}

/// The file cache when a directory is configured, the in-memory cache otherwise.
pub fn build_cache(config: &CacheConfig) -> Arc<dyn RecordCache> {
    match &config.directory {
        Some(directory) => {
            info!(target: "infrastructure", path = %directory.display(), "using file record cache");
            Arc::new(FileRecordCache::new(directory.clone()))
        }
        None => {
            info!(target: "infrastructure", max_entries = config.max_entries, "using in-memory record cache");
            Arc::new(MemoryRecordCache::new(config.max_entries, config.ttl()))
        }
    }
}

/// Cache plus optional SQLite store, as configured.
pub fn build_gateway(config: &AppConfig, pool: Option<SqlitePool>) -> CacheGateway {
    let store = pool.map(|pool| Arc::new(SqliteRecordStore::new(pool)) as Arc<dyn RecordStore>);
    CacheGateway::new(build_cache(&config.cache), store, config.cache.max_age())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_urls_are_untouched() {
        assert_eq!(sqlite_url("sqlite::memory:").unwrap(), "sqlite::memory:");
        assert_eq!(
            sqlite_url("sqlite://:memory:").unwrap(),
            "sqlite://:memory:"
        );
    }

    #[test]
    fn file_urls_become_absolute_and_create_parent() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("prism.db");
        let url = sqlite_url(&format!("sqlite://{}", db.display())).unwrap();

        assert!(url.starts_with("sqlite://"));
        assert!(url.ends_with("prism.db?mode=rwc"));
        assert!(dir.path().join("nested").is_dir());
    }

    #[tokio::test]
    async fn init_database_runs_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.database.url = format!("sqlite://{}", dir.path().join("prism.db").display());

        let pool = init_database(&config).await.expect("database initializes");
        let store = SqliteRecordStore::new(pool);
        assert_eq!(store.stats().await.unwrap().total_tracks, 0);
    }

    #[tokio::test]
    async fn gateway_without_store_uses_memory_cache() {
        let config = AppConfig::default();
        let gateway = build_gateway(&config, None);
        assert!(!gateway.has_store());
        assert_eq!(gateway.ttl(), chrono::Duration::hours(24));
        assert_eq!(gateway.stats().await.unwrap(), StoreStats::default());
    }
}
