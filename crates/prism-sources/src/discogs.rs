// SPDX-License-Identifier: GPL-3.0-or-later

//! Discogs release lookups for genres, styles and credits.

use async_trait::async_trait;
use prism_domain::{Credit, CreditType, Isrc, PartialRecord, SourceName, SourceOutcome, TrackSeed};
use reqwest::RequestBuilder;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::client::{clean, outcome_from, SourceClient};
use crate::error::Result;
use crate::http::{ClientOptions, SourceHttp};

pub const DEFAULT_BASE_URL: &str = "https://api.discogs.com";
pub const CONFIDENCE: f64 = 0.70;

pub struct DiscogsClient {
    http: SourceHttp,
    base_url: String,
    token: String,
}

impl DiscogsClient {
    /// Discogs allows 60 authenticated requests per minute.
    pub fn default_options() -> ClientOptions {
        ClientOptions::new(DEFAULT_BASE_URL).requests_per_minute(60)
    }

    pub fn new(token: impl Into<String>, options: ClientOptions) -> Result<Self> {
        let http = SourceHttp::new(SourceName::Discogs, &options)?;
        debug!(target: "discogs", base_url = %options.base_url, "Initialized Discogs client");
        Ok(Self {
            http,
            base_url: options.base_url,
            token: token.into(),
        })
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("Authorization", format!("Discogs token={}", self.token))
    }

    #[instrument(skip(self), fields(title = %seed.title, artist = %seed.artist))]
    pub async fn fetch(&self, seed: &TrackSeed) -> Result<Option<PartialRecord>> {
        let search_url = format!("{}/database/search", self.base_url);
        debug!(target: "discogs", url = %search_url, "Searching Discogs releases");

        let search: SearchResponse = self
            .http
            .get_json(self.request(self.http.client().get(&search_url)).query(&[
                ("type", "release"),
                ("artist", seed.artist.as_str()),
                ("track", seed.title.as_str()),
            ]))
            .await?;

        let Some(release_id) = search.results.iter().find_map(|result| result.id) else {
            debug!(target: "discogs", "no release matched");
            return Ok(None);
        };

        let release_url = format!("{}/releases/{}", self.base_url, release_id);
        debug!(target: "discogs", url = %release_url, "Fetching Discogs release detail");

        let release: Release = self
            .http
            .get_json(self.request(self.http.client().get(&release_url)))
            .await?;

        Ok(Some(build_partial(release, &seed.title)))
    }
}

#[async_trait]
impl SourceClient for DiscogsClient {
    fn name(&self) -> SourceName {
        SourceName::Discogs
    }

    async fn lookup(&self, _isrc: &Isrc, seed: Option<&TrackSeed>) -> SourceOutcome {
        match seed {
            Some(seed) => outcome_from(self.fetch(seed).await),
            None => SourceOutcome::NotFound,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Release {
    id: u64,
    title: Option<String>,
    released: Option<String>,
    year: Option<u32>,
    uri: Option<String>,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    styles: Vec<String>,
    #[serde(default)]
    extraartists: Vec<ExtraArtist>,
    #[serde(default)]
    tracklist: Vec<TrackEntry>,
}

#[derive(Debug, Deserialize)]
struct TrackEntry {
    title: Option<String>,
    #[serde(default)]
    extraartists: Vec<ExtraArtist>,
}

#[derive(Debug, Deserialize)]
struct ExtraArtist {
    name: String,
    #[serde(default)]
    role: String,
}

fn build_partial(release: Release, track_title: &str) -> PartialRecord {
    let mut partial = PartialRecord::with_confidence(CONFIDENCE);

    partial.album = clean(release.title);
    partial.release_date = clean(release.released)
        .filter(|date| !date.starts_with('0'))
        .or_else(|| release.year.filter(|y| *y > 0).map(|y| y.to_string()));
    partial.genres = release.genres;
    partial.styles = release.styles;
    partial.external_id = Some(release.id.to_string());
    partial.external_url = clean(release.uri);

    // Release-wide credits plus those attached to the matching track.
    let track_credits = release
        .tracklist
        .into_iter()
        .filter(|entry| {
            entry
                .title
                .as_deref()
                .is_some_and(|title| title.trim().eq_ignore_ascii_case(track_title.trim()))
        })
        .flat_map(|entry| entry.extraartists);

    partial.credits = release
        .extraartists
        .into_iter()
        .chain(track_credits)
        .map(|artist| {
            Credit::new(
                strip_disambiguation(&artist.name),
                credit_type_for_role(&artist.role),
                SourceName::Discogs,
                CONFIDENCE,
            )
            .with_role(artist.role)
        })
        .filter(|credit| !credit.name.is_empty())
        .collect();

    partial
}

fn credit_type_for_role(role: &str) -> CreditType {
    let role = role.to_lowercase();
    if role.contains("featuring") {
        CreditType::FeaturedArtist
    } else if role.contains("producer") {
        CreditType::Producer
    } else if role.contains("written") || role.contains("lyrics") || role.contains("songwriter") {
        CreditType::Writer
    } else if role.contains("composed") || role.contains("music by") {
        CreditType::Composer
    } else if role.contains("engineer") || role.contains("mixed") || role.contains("mastered") {
        CreditType::Engineer
    } else if role.contains("vocals")
        || role.contains("guitar")
        || role.contains("bass")
        || role.contains("drums")
        || role.contains("keyboards")
        || role.contains("piano")
    {
        CreditType::Performer
    } else {
        CreditType::Other
    }
}

/// Discogs suffixes homonymous artists with a numeric marker: "John Smith (4)".
fn strip_disambiguation(name: &str) -> &str {
    let trimmed = name.trim();
    if let Some(open) = trimmed.rfind(" (") {
        let marker = &trimmed[open + 2..];
        if let Some(digits) = marker.strip_suffix(')') {
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                return &trimmed[..open];
            }
        }
    }
    trimmed
}
