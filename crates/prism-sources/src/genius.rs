// SPDX-License-Identifier: GPL-3.0-or-later

//! Genius client for credits and lyrics availability.

use async_trait::async_trait;
use prism_domain::{
    Credit, CreditType, Isrc, LyricsInfo, PartialRecord, SourceName, SourceOutcome, TrackSeed,
};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::client::{clean, outcome_from, SourceClient};
use crate::error::Result;
use crate::http::{ClientOptions, SourceHttp};

pub const DEFAULT_BASE_URL: &str = "https://api.genius.com";
pub const CONFIDENCE: f64 = 0.80;

const ARTIST_CREDIT_CONFIDENCE: f64 = 0.90;
const CONTRIBUTOR_CREDIT_CONFIDENCE: f64 = 0.85;

pub struct GeniusClient {
    http: SourceHttp,
    base_url: String,
    access_token: String,
}

impl GeniusClient {
    pub fn default_options() -> ClientOptions {
        ClientOptions::new(DEFAULT_BASE_URL).requests_per_minute(100)
    }

    pub fn new(access_token: impl Into<String>, options: ClientOptions) -> Result<Self> {
        let http = SourceHttp::new(SourceName::Genius, &options)?;
        debug!(target: "genius", base_url = %options.base_url, "Initialized Genius client");
        Ok(Self {
            http,
            base_url: options.base_url,
            access_token: access_token.into(),
        })
    }

    #[instrument(skip(self), fields(title = %seed.title, artist = %seed.artist))]
    pub async fn fetch(&self, seed: &TrackSeed) -> Result<Option<PartialRecord>> {
        let search_url = format!("{}/search", self.base_url);
        let query = format!("{} {}", seed.title, seed.artist);
        debug!(target: "genius", url = %search_url, query = %query, "Searching songs");

        let search: Envelope<SearchBody> = self
            .http
            .get_json(
                self.http
                    .client()
                    .get(&search_url)
                    .bearer_auth(&self.access_token)
                    .query(&[("q", query.as_str())]),
            )
            .await?;

        let Some(hit) = search.response.hits.into_iter().next() else {
            debug!(target: "genius", "no song matched");
            return Ok(None);
        };
        let song = hit.result;

        let detail = match self.fetch_song(song.id).await {
            Ok(detail) => Some(detail),
            Err(error) => {
                warn!(target: "genius", song_id = song.id, %error, "song detail unavailable");
                None
            }
        };

        Ok(Some(build_partial(song, detail)))
    }

    async fn fetch_song(&self, song_id: u64) -> Result<Song> {
        let url = format!("{}/songs/{}", self.base_url, song_id);
        debug!(target: "genius", url = %url, "Fetching song detail");

        let detail: Envelope<SongBody> = self
            .http
            .get_json(
                self.http
                    .client()
                    .get(&url)
                    .bearer_auth(&self.access_token),
            )
            .await?;
        Ok(detail.response.song)
    }
}

#[async_trait]
impl SourceClient for GeniusClient {
    fn name(&self) -> SourceName {
        SourceName::Genius
    }

    async fn lookup(&self, _isrc: &Isrc, seed: Option<&TrackSeed>) -> SourceOutcome {
        match seed {
            Some(seed) => outcome_from(self.fetch(seed).await),
            None => SourceOutcome::NotFound,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: T,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    result: Song,
}

#[derive(Debug, Deserialize)]
struct SongBody {
    song: Song,
}

/// Shape shared by search hits and the song detail; detail adds the credit lists.
#[derive(Debug, Deserialize)]
struct Song {
    id: u64,
    title: Option<String>,
    url: Option<String>,
    primary_artist: Option<GeniusArtist>,
    lyrics_state: Option<String>,
    stats: Option<Stats>,
    release_date: Option<String>,
    release_date_for_display: Option<String>,
    language: Option<String>,
    #[serde(default)]
    explicit: bool,
    #[serde(default)]
    featured_artists: Vec<GeniusArtist>,
    #[serde(default)]
    producer_artists: Vec<GeniusArtist>,
    #[serde(default)]
    writer_artists: Vec<GeniusArtist>,
}

#[derive(Debug, Deserialize)]
struct GeniusArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Stats {
    pageviews: Option<u64>,
}

fn build_partial(hit: Song, detail: Option<Song>) -> PartialRecord {
    let mut partial = PartialRecord::with_confidence(CONFIDENCE);

    partial.title = clean(hit.title.clone());
    partial.artist = hit
        .primary_artist
        .as_ref()
        .and_then(|artist| clean(Some(artist.name.clone())));
    partial.external_id = Some(hit.id.to_string());
    partial.external_url = clean(hit.url.clone());

    let mut lyrics = LyricsInfo {
        source: Some(SourceName::Genius),
        song_id: Some(hit.id.to_string()),
        url: clean(hit.url.clone()),
        language: None,
        explicit: false,
        lyrics_state: clean(hit.lyrics_state.clone()),
        page_views: hit.stats.as_ref().and_then(|stats| stats.pageviews),
    };

    let song = detail.unwrap_or(hit);
    partial.release_date = clean(song.release_date.clone())
        .or_else(|| clean(song.release_date_for_display.clone()));
    lyrics.language = clean(song.language.clone());
    lyrics.explicit = song.explicit;
    partial.credits = credits(&song);
    partial.lyrics = Some(lyrics);

    partial
}

fn credits(song: &Song) -> Vec<Credit> {
    let listed = |artists: &[GeniusArtist], credit_type: CreditType, confidence: f64| {
        artists
            .iter()
            .map(move |artist| {
                Credit::new(artist.name.as_str(), credit_type, SourceName::Genius, confidence)
            })
            .collect::<Vec<_>>()
    };

    let mut credits = Vec::new();
    if let Some(primary) = &song.primary_artist {
        credits.push(Credit::new(
            primary.name.as_str(),
            CreditType::PrimaryArtist,
            SourceName::Genius,
            ARTIST_CREDIT_CONFIDENCE,
        ));
    }
    credits.extend(listed(
        &song.featured_artists,
        CreditType::FeaturedArtist,
        ARTIST_CREDIT_CONFIDENCE,
    ));
    credits.extend(listed(
        &song.producer_artists,
        CreditType::Producer,
        CONTRIBUTOR_CREDIT_CONFIDENCE,
    ));
    credits.extend(listed(
        &song.writer_artists,
        CreditType::Writer,
        CONTRIBUTOR_CREDIT_CONFIDENCE,
    ));
    credits.retain(|credit| !credit.name.is_empty());
    credits
}
