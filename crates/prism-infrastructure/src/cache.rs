// SPDX-License-Identifier: GPL-3.0-or-later

//! Short-lived record caches sitting in front of the durable store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::sync::Cache;
use prism_domain::{AggregateRecord, Isrc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A cached record together with the moment it was cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub record: AggregateRecord,
    pub written_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(record: AggregateRecord) -> Self {
        Self::with_timestamp(record, Utc::now())
    }

    pub fn with_timestamp(record: AggregateRecord, written_at: DateTime<Utc>) -> Self {
        Self { record, written_at }
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.written_at
    }

    pub fn is_expired(&self, ttl: chrono::Duration) -> bool {
        self.age() > ttl
    }
}

#[async_trait]
pub trait RecordCache: Send + Sync {
    async fn get(&self, isrc: &Isrc) -> Result<Option<CacheEntry>>;
    async fn put(&self, record: &AggregateRecord) -> Result<()>;
    async fn remove(&self, isrc: &Isrc) -> Result<()>;
}

/// In-process cache bounded by entry count and time-to-live.
pub struct MemoryRecordCache {
    entries: Cache<Isrc, CacheEntry>,
}

impl MemoryRecordCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
        }
    }
}

#[async_trait]
impl RecordCache for MemoryRecordCache {
    async fn get(&self, isrc: &Isrc) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(isrc))
    }

    async fn put(&self, record: &AggregateRecord) -> Result<()> {
        self.entries
            .insert(record.isrc.clone(), CacheEntry::new(record.clone()));
        Ok(())
    }

    async fn remove(&self, isrc: &Isrc) -> Result<()> {
        self.entries.invalidate(isrc);
        Ok(())
    }
}

/// One pretty-printed JSON document per ISRC under a directory.
///
/// Survives restarts, which the in-memory cache does not.
pub struct FileRecordCache {
    directory: PathBuf,
}

impl FileRecordCache {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, isrc: &Isrc) -> PathBuf {
        self.directory.join(format!("{}.json", isrc))
    }
}

#[async_trait]
impl RecordCache for FileRecordCache {
    async fn get(&self, isrc: &Isrc) -> Result<Option<CacheEntry>> {
        let path = self.path_for(isrc);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(error).with_context(|| format!("reading {}", path.display()))
            }
        };

        let entry: CacheEntry = serde_json::from_str(&contents)
            .with_context(|| format!("decoding cache file {}", path.display()))?;
        debug!(target: "cache", %isrc, path = %path.display(), "file cache hit");
        Ok(Some(entry))
    }

    async fn put(&self, record: &AggregateRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .with_context(|| format!("creating cache directory {}", self.directory.display()))?;

        let path = self.path_for(&record.isrc);
        let body = serde_json::to_string_pretty(&CacheEntry::new(record.clone()))?;

        // Write then rename so readers never see a half-written document.
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, body)
            .await
            .with_context(|| format!("writing {}", staging.display()))?;
        tokio::fs::rename(&staging, &path)
            .await
            .with_context(|| format!("replacing {}", path.display()))?;

        debug!(target: "cache", isrc = %record.isrc, path = %path.display(), "cached record on disk");
        Ok(())
    }

    async fn remove(&self, isrc: &Isrc) -> Result<()> {
        let path = self.path_for(isrc);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error).with_context(|| format!("removing {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(raw: &str) -> AggregateRecord {
        let mut record = AggregateRecord::empty(Isrc::parse(raw).unwrap());
        record.title = Some("Bohemian Rhapsody".to_string());
        record.touch(Utc::now());
        record
    }

    #[tokio::test]
    async fn memory_cache_round_trip_and_remove() {
        let cache = MemoryRecordCache::new(100, Duration::from_secs(60));
        let record = record("USRC17607839");

        cache.put(&record).await.unwrap();
        let entry = cache.get(&record.isrc).await.unwrap().expect("cached");
        assert_eq!(entry.record, record);
        assert!(!entry.is_expired(chrono::Duration::hours(1)));

        cache.remove(&record.isrc).await.unwrap();
        assert!(cache.get(&record.isrc).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_cache_entries_expire() {
        let cache = MemoryRecordCache::new(100, Duration::from_millis(50));
        let record = record("USRC17607839");

        cache.put(&record).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get(&record.isrc).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileRecordCache::new(dir.path().join("cache"));
        let record = record("GBAYE0012345");

        assert!(cache.get(&record.isrc).await.unwrap().is_none());
        cache.put(&record).await.unwrap();

        let path = dir.path().join("cache").join("GBAYE0012345.json");
        assert!(path.exists());

        let entry = cache.get(&record.isrc).await.unwrap().expect("cached");
        assert_eq!(entry.record, record);

        cache.remove(&record.isrc).await.unwrap();
        assert!(!path.exists());
        // removing twice is fine
        cache.remove(&record.isrc).await.unwrap();
    }

    #[tokio::test]
    async fn file_cache_corrupt_document_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileRecordCache::new(dir.path());
        let isrc = Isrc::parse("USRC17607839").unwrap();

        std::fs::write(dir.path().join("USRC17607839.json"), "{ not json").unwrap();
        assert!(cache.get(&isrc).await.is_err());
    }

    #[test]
    fn entry_expiry() {
        let entry = CacheEntry::with_timestamp(
            record("USRC17607839"),
            Utc::now() - chrono::Duration::hours(25),
        );
        assert!(entry.is_expired(chrono::Duration::hours(24)));
        assert!(!entry.is_expired(chrono::Duration::hours(26)));
    }
}
