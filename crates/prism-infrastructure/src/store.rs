// SPDX-License-Identifier: GPL-3.0-or-later
use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use prism_domain::{AggregateRecord, Isrc};
use serde::{Deserialize, Serialize};

/// Durable storage for aggregated records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, isrc: &Isrc) -> Result<Option<AggregateRecord>>;

    /// Insert or replace the record, its credits and its lyrics info.
    async fn put(&self, record: &AggregateRecord) -> Result<()>;

    /// Returns whether a record was removed.
    async fn delete(&self, isrc: &Isrc) -> Result<bool>;

    async fn stats(&self) -> Result<StoreStats>;

    /// Case-insensitive substring search over stored tracks.
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage>;
}

/// Summary of everything in the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_tracks: u64,
    pub average_confidence: f64,
    pub average_completeness: f64,
    pub with_spotify: u64,
    pub with_youtube: u64,
    pub with_musicbrainz: u64,
    pub with_lyrics: u64,
    /// Track count per quality rating label.
    pub by_rating: BTreeMap<String, u64>,
}

/// Column a search term is matched against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchField {
    Title,
    Artist,
    Album,
    #[default]
    All,
}

impl SearchField {
    /// Unknown field names search everything.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "title" => SearchField::Title,
            "artist" => SearchField::Artist,
            "album" => SearchField::Album,
            _ => SearchField::All,
        }
    }

    pub(crate) fn columns(&self) -> &'static [&'static str] {
        match self {
            SearchField::Title => &["title"],
            SearchField::Artist => &["artist"],
            SearchField::Album => &["album"],
            SearchField::All => &["title", "artist", "album"],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub term: String,
    pub field: SearchField,
    pub limit: u32,
    pub offset: u32,
}

impl SearchQuery {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            field: SearchField::All,
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn field(mut self, field: SearchField) -> Self {
        self.field = field;
        self
    }

    pub fn page(mut self, limit: u32, offset: u32) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Whether `record` would match this query, ignoring paging.
    pub fn matches(&self, record: &AggregateRecord) -> bool {
        let needle = self.term.to_lowercase();
        self.field.columns().iter().any(|column| {
            let value = match *column {
                "title" => record.title.as_deref(),
                "artist" => record.artist.as_deref(),
                _ => record.album.as_deref(),
            };
            value.is_some_and(|v| v.to_lowercase().contains(&needle))
        })
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub isrc: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub confidence_score: f64,
}

impl From<&AggregateRecord> for TrackSummary {
    fn from(record: &AggregateRecord) -> Self {
        Self {
            isrc: record.isrc.to_string(),
            title: record.title.clone(),
            artist: record.artist.clone(),
            album: record.album.clone(),
            confidence_score: record.confidence_score,
        }
    }
}

/// A page of search hits plus the unpaged match count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub total: u64,
    pub results: Vec<TrackSummary>,
}
