// SPDX-License-Identifier: GPL-3.0-or-later
use std::sync::Arc;

use anyhow::Result;
use prism_config::AppConfig;
use tracing::info;

pub mod aggregator;
pub mod collector;
pub mod merge;
pub mod registry;
pub mod scoring;
#[cfg(test)]
mod test_support;

pub use aggregator::{
    AggregateOptions, AggregationError, AggregationResult, AggregatorSettings, BulkFailure,
    BulkOutcome, MetadataAggregator,
};
pub use collector::{Collection, Collector};
pub use merge::{merge, merge_at};
pub use registry::build_sources;
pub use scoring::{apply_score, score, Score, ScoreBreakdown};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub aggregator: Arc<MetadataAggregator>,
}

impl AppState {
    pub fn new(config: AppConfig, aggregator: Arc<MetadataAggregator>) -> Self {
        Self { config, aggregator }
    }

    /// Wire database, cache, source clients and aggregator from configuration.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let pool = prism_infrastructure::init_database(&config).await?;
        let gateway = prism_infrastructure::build_gateway(&config, Some(pool));
        let collector = Collector::new(build_sources(&config.sources)?);
        let settings = AggregatorSettings::from(&config.aggregation);
        let aggregator = MetadataAggregator::new(collector, gateway, settings)?;

        Ok(Self::new(config, Arc::new(aggregator)))
    }

    pub fn on_start(&self) {
        info!(
            target: "application",
            sources = self.aggregator.source_status().len(),
            "application state initialized"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn from_config_wires_default_sources() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.database.url = format!("sqlite://{}", dir.path().join("prism.db").display());

        let state = AppState::from_config(config).await.unwrap();
        let sources = state.aggregator.source_status();
        assert_eq!(sources.len(), 1);
        assert!(sources.contains_key(&prism_domain::SourceName::MusicBrainz));
    }

    #[tokio::test]
    async fn from_config_fails_without_sources() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.database.url = format!("sqlite://{}", dir.path().join("prism.db").display());
        config.sources.musicbrainz.enabled = false;

        let error = AppState::from_config(config).await.err().unwrap();
        assert!(error.to_string().contains("No metadata sources"));
    }
}
