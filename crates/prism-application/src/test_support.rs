// SPDX-License-Identifier: GPL-3.0-or-later

//! Scriptable source clients for collector and aggregator tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use prism_domain::{Isrc, PartialRecord, SourceName, SourceOutcome, TrackSeed};
use prism_sources::SourceClient;

pub fn isrc() -> Isrc {
    Isrc::parse("USRC17607839").unwrap()
}

enum Behavior {
    Found(PartialRecord),
    NotFound,
    Error(String),
    Panic,
}

pub struct FakeSource {
    name: SourceName,
    behavior: Behavior,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    seeds: Arc<Mutex<Vec<Option<TrackSeed>>>>,
}

impl FakeSource {
    fn with_behavior(name: SourceName, behavior: Behavior) -> Self {
        Self {
            name,
            behavior,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            seeds: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn partial(name: SourceName, partial: PartialRecord) -> Self {
        Self::with_behavior(name, Behavior::Found(partial))
    }

    pub fn found(name: SourceName, title: Option<&str>, artist: Option<&str>) -> Self {
        let mut partial = PartialRecord::with_confidence(0.9);
        partial.title = title.map(str::to_string);
        partial.artist = artist.map(str::to_string);
        Self::partial(name, partial)
    }

    pub fn views(name: SourceName, views: u64) -> Self {
        let mut partial = PartialRecord::with_confidence(0.7);
        partial.view_count = Some(views);
        Self::partial(name, partial)
    }

    pub fn not_found(name: SourceName) -> Self {
        Self::with_behavior(name, Behavior::NotFound)
    }

    pub fn error(name: SourceName, message: &str) -> Self {
        Self::with_behavior(name, Behavior::Error(message.to_string()))
    }

    pub fn panicking(name: SourceName) -> Self {
        Self::with_behavior(name, Behavior::Panic)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn seen_seeds(&self) -> Arc<Mutex<Vec<Option<TrackSeed>>>> {
        self.seeds.clone()
    }

    pub fn arc(self) -> Arc<dyn SourceClient> {
        Arc::new(self)
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    fn name(&self) -> SourceName {
        self.name
    }

    async fn lookup(&self, _isrc: &Isrc, seed: Option<&TrackSeed>) -> SourceOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seeds.lock().unwrap().push(seed.cloned());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            Behavior::Found(partial) => SourceOutcome::Found(partial.clone()),
            Behavior::NotFound => SourceOutcome::NotFound,
            Behavior::Error(message) => SourceOutcome::Error(message.clone()),
            Behavior::Panic => panic!("{} exploded", self.name),
        }
    }
}
