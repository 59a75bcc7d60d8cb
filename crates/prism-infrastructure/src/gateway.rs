// SPDX-License-Identifier: GPL-3.0-or-later
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use prism_domain::{AggregateRecord, Isrc};
use tracing::{debug, error, info, warn};

use crate::cache::RecordCache;
use crate::store::{RecordStore, SearchPage, SearchQuery, StoreStats};

/// Read-through access to cached and stored records.
///
/// Reads try the cache first, then the store (writing store hits back into
/// the cache). Writes go to both. Storage failures are logged and never
/// surface to callers: a broken cache or database degrades to a miss.
#[derive(Clone)]
pub struct CacheGateway {
    cache: Arc<dyn RecordCache>,
    store: Option<Arc<dyn RecordStore>>,
    ttl: Duration,
}

impl CacheGateway {
    pub fn new(
        cache: Arc<dyn RecordCache>,
        store: Option<Arc<dyn RecordStore>>,
        ttl: Duration,
    ) -> Self {
        Self { cache, store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    pub async fn get(&self, isrc: &Isrc) -> Option<AggregateRecord> {
        match self.cache.get(isrc).await {
            Ok(Some(entry)) if !entry.is_expired(self.ttl) => {
                info!(
                    target: "cache",
                    %isrc,
                    age_secs = entry.age().num_seconds(),
                    "cache hit"
                );
                return Some(entry.record);
            }
            Ok(Some(_)) => debug!(target: "cache", %isrc, "cache entry expired"),
            Ok(None) => debug!(target: "cache", %isrc, "cache miss"),
            Err(error) => warn!(target: "cache", %isrc, error = %error, "cache read failed, treating as miss"),
        }

        let store = self.store.as_ref()?;
        match store.get(isrc).await {
            Ok(Some(record)) => {
                info!(target: "cache", %isrc, "store hit");
                if let Err(error) = self.cache.put(&record).await {
                    warn!(target: "cache", %isrc, error = %error, "failed to refresh cache from store");
                }
                Some(record)
            }
            Ok(None) => None,
            Err(error) => {
                warn!(target: "cache", %isrc, error = %error, "store read failed");
                None
            }
        }
    }

    pub async fn put(&self, record: &AggregateRecord) {
        let isrc = &record.isrc;
        if let Err(error) = self.cache.put(record).await {
            warn!(target: "cache", %isrc, error = %error, "cache write failed");
        }

        if let Some(store) = &self.store {
            match store.put(record).await {
                Ok(()) => debug!(target: "cache", %isrc, "record persisted"),
                Err(error) => error!(target: "cache", %isrc, error = %error, "store write failed"),
            }
        }
    }

    /// Drop the record from the cache and the store. Returns whether the
    /// store held it.
    pub async fn invalidate(&self, isrc: &Isrc) -> bool {
        if let Err(error) = self.cache.remove(isrc).await {
            warn!(target: "cache", %isrc, error = %error, "cache removal failed");
        }

        let Some(store) = &self.store else {
            return false;
        };
        match store.delete(isrc).await {
            Ok(removed) => {
                info!(target: "cache", %isrc, removed, "record invalidated");
                removed
            }
            Err(error) => {
                warn!(target: "cache", %isrc, error = %error, "store removal failed");
                false
            }
        }
    }

    /// True when the record has no timestamp or is older than `max_age`.
    pub fn is_stale(record: &AggregateRecord, max_age: Duration) -> bool {
        Self::is_stale_at(record, max_age, Utc::now())
    }

    pub fn is_stale_at(record: &AggregateRecord, max_age: Duration, now: DateTime<Utc>) -> bool {
        match record.last_updated {
            Some(updated) => now - updated > max_age,
            None => true,
        }
    }

    pub fn is_stale_default(&self, record: &AggregateRecord) -> bool {
        Self::is_stale(record, self.ttl)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        match &self.store {
            Some(store) => store.stats().await,
            None => Ok(StoreStats::default()),
        }
    }

    /// Search the store. Without a store nothing is searchable.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        match &self.store {
            Some(store) => store.search(query).await,
            None => Ok(SearchPage::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, MemoryRecordCache};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn record(raw: &str, updated: Option<DateTime<Utc>>) -> AggregateRecord {
        let mut record = AggregateRecord::empty(Isrc::parse(raw).unwrap());
        record.title = Some("Song".to_string());
        record.last_updated = updated;
        record
    }

    #[derive(Default)]
    struct MapStore {
        records: Mutex<Vec<AggregateRecord>>,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl RecordStore for MapStore {
        async fn get(&self, isrc: &Isrc) -> Result<Option<AggregateRecord>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|r| &r.isrc == isrc)
                .cloned())
        }

        async fn put(&self, record: &AggregateRecord) -> Result<()> {
            let mut records = self.records.lock().unwrap();
            records.retain(|r| r.isrc != record.isrc);
            records.push(record.clone());
            Ok(())
        }

        async fn delete(&self, isrc: &Isrc) -> Result<bool> {
            let mut records = self.records.lock().unwrap();
            let before = records.len();
            records.retain(|r| &r.isrc != isrc);
            Ok(records.len() != before)
        }

        async fn stats(&self) -> Result<StoreStats> {
            Ok(StoreStats {
                total_tracks: self.records.lock().unwrap().len() as u64,
                ..StoreStats::default()
            })
        }

        async fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
            let records = self.records.lock().unwrap();
            let hits: Vec<_> = records.iter().filter(|r| query.matches(r)).collect();
            Ok(SearchPage {
                total: hits.len() as u64,
                results: hits
                    .into_iter()
                    .skip(query.offset as usize)
                    .take(query.limit as usize)
                    .map(Into::into)
                    .collect(),
            })
        }
    }

    struct BrokenCache;

    #[async_trait]
    impl RecordCache for BrokenCache {
        async fn get(&self, _isrc: &Isrc) -> Result<Option<CacheEntry>> {
            Err(anyhow!("disk on fire"))
        }

        async fn put(&self, _record: &AggregateRecord) -> Result<()> {
            Err(anyhow!("disk on fire"))
        }

        async fn remove(&self, _isrc: &Isrc) -> Result<()> {
            Err(anyhow!("disk on fire"))
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl RecordStore for BrokenStore {
        async fn get(&self, _isrc: &Isrc) -> Result<Option<AggregateRecord>> {
            Err(anyhow!("database locked"))
        }

        async fn put(&self, _record: &AggregateRecord) -> Result<()> {
            Err(anyhow!("database locked"))
        }

        async fn delete(&self, _isrc: &Isrc) -> Result<bool> {
            Err(anyhow!("database locked"))
        }

        async fn stats(&self) -> Result<StoreStats> {
            Err(anyhow!("database locked"))
        }

        async fn search(&self, _query: &SearchQuery) -> Result<SearchPage> {
            Err(anyhow!("database locked"))
        }
    }

    fn memory_cache() -> Arc<dyn RecordCache> {
        Arc::new(MemoryRecordCache::new(100, std::time::Duration::from_secs(3600)))
    }

    #[tokio::test]
    async fn put_then_get_returns_equal_record() {
        let store = Arc::new(MapStore::default());
        let gateway = CacheGateway::new(
            memory_cache(),
            Some(store.clone() as Arc<dyn RecordStore>),
            Duration::hours(24),
        );
        let record = record("USRC17607839", Some(Utc::now()));

        gateway.put(&record).await;
        assert_eq!(gateway.get(&record.isrc).await, Some(record.clone()));
        // served from cache
        assert_eq!(store.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn store_hit_is_written_back_to_cache() {
        let store = Arc::new(MapStore::default());
        let cache = memory_cache();
        let record = record("USRC17607839", Some(Utc::now()));
        store.put(&record).await.unwrap();

        let gateway = CacheGateway::new(
            cache.clone(),
            Some(store.clone() as Arc<dyn RecordStore>),
            Duration::hours(24),
        );
        assert_eq!(gateway.get(&record.isrc).await, Some(record.clone()));
        assert!(cache.get(&record.isrc).await.unwrap().is_some());

        gateway.get(&record.isrc).await;
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_degrade_to_miss() {
        let gateway = CacheGateway::new(
            Arc::new(BrokenCache),
            Some(Arc::new(BrokenStore) as Arc<dyn RecordStore>),
            Duration::hours(24),
        );
        let record = record("USRC17607839", Some(Utc::now()));

        gateway.put(&record).await;
        assert!(gateway.get(&record.isrc).await.is_none());
        assert!(!gateway.invalidate(&record.isrc).await);
        assert!(gateway.stats().await.is_err());
        assert!(gateway.search(&SearchQuery::new("song")).await.is_err());
    }

    #[tokio::test]
    async fn search_goes_to_the_store() {
        let store = Arc::new(MapStore::default());
        let gateway = CacheGateway::new(
            memory_cache(),
            Some(store.clone() as Arc<dyn RecordStore>),
            Duration::hours(24),
        );
        gateway.put(&record("USRC17607839", Some(Utc::now()))).await;
        gateway.put(&record("GBUM71029604", Some(Utc::now()))).await;

        let page = gateway.search(&SearchQuery::new("SONG").page(1, 1)).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.results.len(), 1);

        let cache_only = CacheGateway::new(memory_cache(), None, Duration::hours(24));
        assert_eq!(
            cache_only.search(&SearchQuery::new("song")).await.unwrap(),
            SearchPage::default()
        );
    }

    #[tokio::test]
    async fn invalidate_removes_everywhere() {
        let store = Arc::new(MapStore::default());
        let gateway = CacheGateway::new(
            memory_cache(),
            Some(store.clone() as Arc<dyn RecordStore>),
            Duration::hours(24),
        );
        let record = record("USRC17607839", Some(Utc::now()));

        gateway.put(&record).await;
        assert!(gateway.invalidate(&record.isrc).await);
        assert!(gateway.get(&record.isrc).await.is_none());
        assert_eq!(gateway.stats().await.unwrap().total_tracks, 0);
    }

    #[test]
    fn staleness() {
        let now = Utc::now();
        let max_age = Duration::hours(24);

        assert!(CacheGateway::is_stale_at(&record("USRC17607839", None), max_age, now));
        assert!(CacheGateway::is_stale_at(
            &record("USRC17607839", Some(now - Duration::hours(25))),
            max_age,
            now
        ));
        assert!(!CacheGateway::is_stale_at(
            &record("USRC17607839", Some(now - Duration::hours(1))),
            max_age,
            now
        ));
    }
}
