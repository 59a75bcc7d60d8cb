// SPDX-License-Identifier: GPL-3.0-or-later

//! The aggregation entry point: validate, consult the cache, collect, merge,
//! score and persist.

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::FutureExt;
use prism_config::AggregationConfig;
use prism_domain::{AggregateRecord, Isrc, IsrcError, SourceKind, SourceName};
use prism_infrastructure::{CacheGateway, SearchPage, SearchQuery, StoreStats};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::collector::{panic_message, Collector};
use crate::merge::merge;
use crate::scoring::apply_score;

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error(transparent)]
    Validation(#[from] IsrcError),

    #[error("No metadata sources are configured")]
    NoSourcesConfigured,
}

pub type AggregationResult<T> = Result<T, AggregationError>;

#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub include_secondary_sources: bool,
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self::from(&AggregationConfig::default())
    }
}

impl From<&AggregationConfig> for AggregatorSettings {
    fn from(config: &AggregationConfig) -> Self {
        Self {
            include_secondary_sources: config.include_secondary_sources,
            batch_size: config.batch_size.max(1),
            batch_delay: config.batch_delay(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Skip the cache check and rebuild from the sources.
    pub force_refresh: bool,
    pub include_secondary_sources: bool,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            force_refresh: false,
            include_secondary_sources: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkFailure {
    pub identifier: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkOutcome {
    pub successes: Vec<AggregateRecord>,
    pub failures: Vec<BulkFailure>,
}

type LockMap = Mutex<HashMap<Isrc, Arc<AsyncMutex<()>>>>;

/// A claim on the per-ISRC build lock. Dropping it (including when the
/// owning future is cancelled or unwinds) removes the map entry once no
/// other task holds a claim.
struct InFlight<'a> {
    locks: &'a LockMap,
    isrc: Isrc,
    lock: Arc<AsyncMutex<()>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map plus ours: nobody else is waiting.
        if Arc::strong_count(&self.lock) <= 2 {
            locks.remove(&self.isrc);
        }
    }
}

pub struct MetadataAggregator {
    collector: Collector,
    gateway: CacheGateway,
    settings: AggregatorSettings,
    in_flight: LockMap,
}

impl MetadataAggregator {
    pub fn new(
        collector: Collector,
        gateway: CacheGateway,
        settings: AggregatorSettings,
    ) -> AggregationResult<Self> {
        if collector.is_empty() {
            return Err(AggregationError::NoSourcesConfigured);
        }
        Ok(Self {
            collector,
            gateway,
            settings,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn settings(&self) -> &AggregatorSettings {
        &self.settings
    }

    /// Options carrying the configured secondary-source default.
    pub fn default_options(&self) -> AggregateOptions {
        AggregateOptions {
            force_refresh: false,
            include_secondary_sources: self.settings.include_secondary_sources,
        }
    }

    /// Build (or fetch) the aggregate record for one identifier.
    ///
    /// Only a malformed identifier is an error. Source, cache and store
    /// failures degrade the result instead: an ISRC nobody knows about yields
    /// an empty record with zero confidence.
    pub async fn aggregate(
        &self,
        raw: &str,
        options: AggregateOptions,
    ) -> AggregationResult<AggregateRecord> {
        let isrc = Isrc::parse(raw)?;

        if !options.force_refresh {
            if let Some(record) = self.fresh_hit(&isrc).await {
                return Ok(record);
            }
        }

        let entry = self.key_lock(&isrc);
        let record = {
            let _guard = entry.lock.lock().await;

            // Someone else may have finished the same build while we waited.
            let cached = if options.force_refresh {
                None
            } else {
                self.fresh_hit(&isrc).await
            };

            match cached {
                Some(record) => record,
                None => self.build(&isrc, options.include_secondary_sources).await,
            }
        };
        drop(entry);

        Ok(record)
    }

    async fn build(&self, isrc: &Isrc, include_secondary: bool) -> AggregateRecord {
        let started = Instant::now();
        info!(target: "aggregator", %isrc, include_secondary, "aggregating metadata");

        let collection = self.collector.collect(isrc, include_secondary).await;
        let mut record = merge(isrc, &collection);
        let score = apply_score(&mut record);

        self.gateway.put(&record).await;

        info!(
            target: "aggregator",
            %isrc,
            sources = record.sources.len(),
            confidence = score.confidence,
            completeness = score.completeness,
            rating = %score.rating,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "aggregation complete"
        );
        record
    }

    async fn fresh_hit(&self, isrc: &Isrc) -> Option<AggregateRecord> {
        let record = self.gateway.get(isrc).await?;
        if self.gateway.is_stale_default(&record) {
            debug!(target: "aggregator", %isrc, "stored record is stale");
            return None;
        }
        Some(record)
    }

    fn key_lock(&self, isrc: &Isrc) -> InFlight<'_> {
        let mut locks = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = locks.entry(isrc.clone()).or_default().clone();
        InFlight {
            locks: &self.in_flight,
            isrc: isrc.clone(),
            lock,
        }
    }

    /// Aggregate many identifiers in chunks of `batch_size`, pausing
    /// `batch_delay` between chunks. A bad identifier or a panicking build
    /// only fails its own entry.
    pub async fn aggregate_many<S: AsRef<str>>(
        &self,
        identifiers: &[S],
        options: AggregateOptions,
    ) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        let chunks: Vec<&[S]> = identifiers.chunks(self.settings.batch_size.max(1)).collect();
        let total = chunks.len();

        info!(
            target: "aggregator",
            identifiers = identifiers.len(),
            batches = total,
            "bulk aggregation started"
        );

        for (index, chunk) in chunks.into_iter().enumerate() {
            if index > 0 && !self.settings.batch_delay.is_zero() {
                tokio::time::sleep(self.settings.batch_delay).await;
            }

            let builds = chunk.iter().map(|raw| {
                let raw = raw.as_ref();
                async move {
                    let result = AssertUnwindSafe(self.aggregate(raw, options))
                        .catch_unwind()
                        .await;
                    (raw, result)
                }
            });

            for (raw, result) in join_all(builds).await {
                match result {
                    Ok(Ok(record)) => outcome.successes.push(record),
                    Ok(Err(error)) => outcome.failures.push(BulkFailure {
                        identifier: raw.to_string(),
                        error: error.to_string(),
                    }),
                    Err(panic) => {
                        let message = panic_message(&panic);
                        warn!(target: "aggregator", identifier = raw, error = %message, "aggregation panicked");
                        outcome.failures.push(BulkFailure {
                            identifier: raw.to_string(),
                            error: format!("aggregation panicked: {}", message),
                        });
                    }
                }
            }

            debug!(target: "aggregator", batch = index + 1, batches = total, "batch finished");
        }

        info!(
            target: "aggregator",
            succeeded = outcome.successes.len(),
            failed = outcome.failures.len(),
            "bulk aggregation finished"
        );
        outcome
    }

    /// Whatever the cache or store holds, stale or not, without contacting
    /// any source.
    pub async fn lookup_cached(&self, raw: &str) -> AggregationResult<Option<AggregateRecord>> {
        let isrc = Isrc::parse(raw)?;
        Ok(self.gateway.get(&isrc).await)
    }

    pub async fn invalidate(&self, raw: &str) -> AggregationResult<bool> {
        let isrc = Isrc::parse(raw)?;
        Ok(self.gateway.invalidate(&isrc).await)
    }

    pub async fn stats(&self) -> anyhow::Result<StoreStats> {
        self.gateway.stats().await
    }

    /// Search persisted records. Never contacts a source.
    pub async fn search(&self, query: &SearchQuery) -> anyhow::Result<SearchPage> {
        self.gateway.search(query).await
    }

    pub fn source_status(&self) -> BTreeMap<SourceName, SourceKind> {
        self.collector.sources()
    }
}
