// SPDX-License-Identifier: GPL-3.0-or-later

//! Concurrent fan-out to the configured source clients.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use prism_domain::{
    non_empty, Isrc, PartialRecord, SourceKind, SourceName, SourceOutcome, TrackSeed,
    PRIMARY_PRIORITY,
};
use prism_sources::SourceClient;
use tracing::{debug, info, warn};

/// Every configured source's answer for one ISRC.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    pub outcomes: BTreeMap<SourceName, SourceOutcome>,
    /// Title/artist used for the secondary lookups, if one was found.
    pub seed: Option<TrackSeed>,
}

impl Collection {
    pub fn outcome(&self, source: SourceName) -> Option<&SourceOutcome> {
        self.outcomes.get(&source)
    }

    pub fn found(&self, source: SourceName) -> Option<&PartialRecord> {
        self.outcomes.get(&source).and_then(SourceOutcome::partial)
    }

    pub fn found_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|outcome| outcome.partial().is_some())
            .count()
    }
}

pub struct Collector {
    clients: Vec<Arc<dyn SourceClient>>,
}

impl Collector {
    pub fn new(clients: Vec<Arc<dyn SourceClient>>) -> Self {
        Self { clients }
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Configured sources and whether each is primary or secondary.
    pub fn sources(&self) -> BTreeMap<SourceName, SourceKind> {
        self.clients
            .iter()
            .map(|client| (client.name(), client.kind()))
            .collect()
    }

    /// Query primaries concurrently, derive a seed, then query secondaries
    /// concurrently. A client that panics is recorded as an error outcome;
    /// its siblings keep running.
    pub async fn collect(&self, isrc: &Isrc, include_secondary: bool) -> Collection {
        let (primaries, secondaries): (Vec<_>, Vec<_>) = self
            .clients
            .iter()
            .partition(|client| client.kind() == SourceKind::Primary);

        let mut collection = Collection::default();
        for (name, outcome) in run_lookups(&primaries, isrc, None).await {
            log_outcome(isrc, name, &outcome);
            collection.outcomes.insert(name, outcome);
        }

        collection.seed = derive_seed(&collection);

        match (&collection.seed, include_secondary) {
            (Some(seed), true) if !secondaries.is_empty() => {
                debug!(
                    target: "collector",
                    %isrc,
                    title = %seed.title,
                    artist = %seed.artist,
                    "querying secondary sources"
                );
                for (name, outcome) in run_lookups(&secondaries, isrc, Some(seed)).await {
                    log_outcome(isrc, name, &outcome);
                    collection.outcomes.insert(name, outcome);
                }
            }
            _ => {
                for client in &secondaries {
                    let name = client.name();
                    debug!(
                        target: "collector",
                        %isrc,
                        source = %name,
                        seeded = collection.seed.is_some(),
                        include_secondary,
                        "secondary source skipped"
                    );
                    collection.outcomes.insert(name, SourceOutcome::NotFound);
                }
            }
        }

        info!(
            target: "collector",
            %isrc,
            found = collection.found_count(),
            queried = collection.outcomes.len(),
            "collection finished"
        );
        collection
    }
}

async fn run_lookups(
    clients: &[&Arc<dyn SourceClient>],
    isrc: &Isrc,
    seed: Option<&TrackSeed>,
) -> Vec<(SourceName, SourceOutcome)> {
    let lookups = clients.iter().map(|client| async move {
        let name = client.name();
        let outcome = AssertUnwindSafe(client.lookup(isrc, seed))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                SourceOutcome::Error(format!("source panicked: {}", panic_message(&panic)))
            });
        (name, outcome)
    });
    join_all(lookups).await
}

/// First primary in priority order that found both a title and an artist.
fn derive_seed(collection: &Collection) -> Option<TrackSeed> {
    PRIMARY_PRIORITY.iter().find_map(|source| {
        let partial = collection.found(*source)?;
        if !(non_empty(&partial.title) && non_empty(&partial.artist)) {
            return None;
        }
        Some(TrackSeed {
            title: partial.title.as_deref()?.trim().to_string(),
            artist: partial.artist.as_deref()?.trim().to_string(),
            album: partial
                .album
                .as_deref()
                .map(str::trim)
                .filter(|album| !album.is_empty())
                .map(str::to_string),
        })
    })
}

fn log_outcome(isrc: &Isrc, source: SourceName, outcome: &SourceOutcome) {
    match outcome {
        SourceOutcome::Found(partial) => debug!(
            target: "collector",
            %isrc,
            %source,
            confidence = partial.confidence,
            "source returned data"
        ),
        SourceOutcome::NotFound => debug!(target: "collector", %isrc, %source, "source has no data"),
        SourceOutcome::Error(error) => warn!(
            target: "collector",
            %isrc,
            %source,
            error = %error,
            "source lookup failed"
        ),
    }
}

pub(crate) fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{isrc, FakeSource};

    #[tokio::test]
    async fn every_configured_source_gets_an_entry() {
        let collector = Collector::new(vec![
            FakeSource::found(SourceName::MusicBrainz, Some("Song A"), Some("Artist X")).arc(),
            FakeSource::not_found(SourceName::Spotify).arc(),
            FakeSource::views(SourceName::YouTube, 1000).arc(),
            FakeSource::error(SourceName::Genius, "boom").arc(),
        ]);

        let collection = collector.collect(&isrc(), true).await;

        assert_eq!(collection.outcomes.len(), 4);
        assert!(collection.found(SourceName::MusicBrainz).is_some());
        assert_eq!(
            collection.outcome(SourceName::Spotify),
            Some(&SourceOutcome::NotFound)
        );
        assert!(collection.found(SourceName::YouTube).is_some());
        assert!(matches!(
            collection.outcome(SourceName::Genius),
            Some(SourceOutcome::Error(_))
        ));
        assert_eq!(
            collection.seed,
            Some(TrackSeed {
                title: "Song A".to_string(),
                artist: "Artist X".to_string(),
                album: None,
            })
        );
    }

    #[tokio::test]
    async fn secondaries_receive_the_seed() {
        let youtube = FakeSource::views(SourceName::YouTube, 1000);
        let seen = youtube.seen_seeds();
        let collector = Collector::new(vec![
            FakeSource::found(SourceName::MusicBrainz, Some("Song A"), Some("Artist X")).arc(),
            youtube.arc(),
        ]);

        collector.collect(&isrc(), true).await;

        let seeds = seen.lock().unwrap().clone();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].as_ref().map(|s| s.title.as_str()), Some("Song A"));
    }

    #[tokio::test]
    async fn seed_prefers_musicbrainz_over_spotify() {
        let collector = Collector::new(vec![
            FakeSource::found(SourceName::Spotify, Some("Spotify Title"), Some("Spotify Artist"))
                .arc(),
            FakeSource::found(SourceName::MusicBrainz, Some("MB Title"), Some("MB Artist")).arc(),
        ]);

        let collection = collector.collect(&isrc(), true).await;
        assert_eq!(collection.seed.unwrap().title, "MB Title");
    }

    #[tokio::test]
    async fn seed_needs_title_and_artist() {
        let youtube = FakeSource::views(SourceName::YouTube, 1000);
        let calls = youtube.calls();
        let collector = Collector::new(vec![
            FakeSource::found(SourceName::MusicBrainz, Some("Song A"), None).arc(),
            FakeSource::found(SourceName::Spotify, None, Some("Artist X")).arc(),
            youtube.arc(),
        ]);

        let collection = collector.collect(&isrc(), true).await;

        assert!(collection.seed.is_none());
        assert_eq!(
            collection.outcome(SourceName::YouTube),
            Some(&SourceOutcome::NotFound)
        );
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn secondaries_skipped_when_disabled() {
        let youtube = FakeSource::views(SourceName::YouTube, 1000);
        let calls = youtube.calls();
        let collector = Collector::new(vec![
            FakeSource::found(SourceName::MusicBrainz, Some("Song A"), Some("Artist X")).arc(),
            youtube.arc(),
        ]);

        let collection = collector.collect(&isrc(), false).await;

        assert_eq!(
            collection.outcome(SourceName::YouTube),
            Some(&SourceOutcome::NotFound)
        );
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn panicking_source_is_isolated() {
        let collector = Collector::new(vec![
            FakeSource::panicking(SourceName::Spotify).arc(),
            FakeSource::found(SourceName::MusicBrainz, Some("Song A"), Some("Artist X")).arc(),
        ]);

        let collection = collector.collect(&isrc(), true).await;

        match collection.outcome(SourceName::Spotify) {
            Some(SourceOutcome::Error(message)) => assert!(message.contains("panicked")),
            other => panic!("expected error outcome, got {:?}", other),
        }
        assert!(collection.found(SourceName::MusicBrainz).is_some());
    }

    #[tokio::test]
    async fn primaries_run_concurrently() {
        let delay = std::time::Duration::from_millis(150);
        let collector = Collector::new(vec![
            FakeSource::found(SourceName::MusicBrainz, Some("Song A"), Some("Artist X"))
                .with_delay(delay)
                .arc(),
            FakeSource::found(SourceName::Spotify, Some("Song A"), Some("Artist X"))
                .with_delay(delay)
                .arc(),
        ]);

        let start = std::time::Instant::now();
        collector.collect(&isrc(), true).await;
        assert!(start.elapsed() < delay * 2);
    }
}
