// SPDX-License-Identifier: GPL-3.0-or-later

//! Last.fm `track.getInfo` client.

use async_trait::async_trait;
use prism_domain::{Isrc, PartialRecord, SourceName, SourceOutcome, TrackSeed};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::client::{clean, outcome_from, SourceClient};
use crate::error::{Result, SourceError};
use crate::http::{ClientOptions, SourceHttp};

pub const DEFAULT_BASE_URL: &str = "https://ws.audioscrobbler.com/2.0";
pub const CONFIDENCE: f64 = 0.75;

/// Last.fm error code for "the track you supplied could not be found".
const TRACK_NOT_FOUND: i64 = 6;

pub struct LastFmClient {
    http: SourceHttp,
    base_url: String,
    api_key: String,
}

impl LastFmClient {
    pub fn default_options() -> ClientOptions {
        ClientOptions::new(DEFAULT_BASE_URL).requests_per_minute(60)
    }

    pub fn new(api_key: impl Into<String>, options: ClientOptions) -> Result<Self> {
        let http = SourceHttp::new(SourceName::LastFm, &options)?;
        debug!(target: "lastfm", base_url = %options.base_url, "Initialized Last.fm client");
        Ok(Self {
            http,
            base_url: options.base_url,
            api_key: api_key.into(),
        })
    }

    #[instrument(skip(self), fields(title = %seed.title, artist = %seed.artist))]
    pub async fn fetch(&self, seed: &TrackSeed) -> Result<Option<PartialRecord>> {
        let url = format!("{}/", self.base_url);
        debug!(target: "lastfm", url = %url, "Fetching track info");

        let request = self.http.client().get(&url).query(&[
            ("method", "track.getInfo"),
            ("api_key", self.api_key.as_str()),
            ("artist", seed.artist.as_str()),
            ("track", seed.title.as_str()),
            ("autocorrect", "1"),
            ("format", "json"),
        ]);

        let response: TrackInfoResponse = match self.http.get_json(request).await {
            Ok(response) => response,
            // Errors arrive as JSON bodies, sometimes with a 4xx status.
            Err(SourceError::Api { status, message }) => match parse_lastfm_error(&message) {
                Some((TRACK_NOT_FOUND, _)) => return Ok(None),
                Some((code, detail)) => {
                    return Err(SourceError::Api {
                        status,
                        message: format!("Last.fm error {}: {}", code, detail),
                    })
                }
                None => return Err(SourceError::Api { status, message }),
            },
            Err(error) => return Err(error),
        };

        if let Some(code) = response.error {
            if code == TRACK_NOT_FOUND {
                debug!(target: "lastfm", "track not found");
                return Ok(None);
            }
            return Err(SourceError::Api {
                status: 200,
                message: format!(
                    "Last.fm error {}: {}",
                    code,
                    response.message.unwrap_or_default()
                ),
            });
        }

        Ok(response.track.map(build_partial))
    }
}

#[async_trait]
impl SourceClient for LastFmClient {
    fn name(&self) -> SourceName {
        SourceName::LastFm
    }

    async fn lookup(&self, _isrc: &Isrc, seed: Option<&TrackSeed>) -> SourceOutcome {
        match seed {
            Some(seed) => outcome_from(self.fetch(seed).await),
            None => SourceOutcome::NotFound,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TrackInfoResponse {
    error: Option<i64>,
    message: Option<String>,
    track: Option<TrackInfo>,
}

#[derive(Debug, Deserialize)]
struct TrackInfo {
    name: Option<String>,
    url: Option<String>,
    // Counts are usually numeric strings.
    duration: Option<Value>,
    listeners: Option<Value>,
    playcount: Option<Value>,
    artist: Option<NamedArtist>,
    album: Option<AlbumInfo>,
    toptags: Option<TopTags>,
}

#[derive(Debug, Deserialize)]
struct NamedArtist {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlbumInfo {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TopTags {
    // Either a list or, with a single tag, a bare object.
    #[serde(default)]
    tag: Value,
}

fn build_partial(track: TrackInfo) -> PartialRecord {
    let mut partial = PartialRecord::with_confidence(CONFIDENCE);

    partial.title = clean(track.name);
    partial.artist = track.artist.and_then(|artist| clean(artist.name));
    partial.album = track.album.and_then(|album| clean(album.title));
    partial.duration_ms = track.duration.as_ref().and_then(as_count).filter(|d| *d > 0);
    partial.listeners = track.listeners.as_ref().and_then(as_count);
    partial.play_count = track.playcount.as_ref().and_then(as_count);
    partial.tags = track.toptags.map(|tags| tag_names(&tags.tag)).unwrap_or_default();
    partial.external_url = clean(track.url);
    partial.external_id = partial.external_url.clone();

    partial
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn tag_names(tags: &Value) -> Vec<String> {
    let name = |tag: &Value| {
        tag.get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    };

    match tags {
        Value::Array(items) => items.iter().filter_map(name).collect(),
        Value::Object(_) => name(tags).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn parse_lastfm_error(body: &str) -> Option<(i64, String)> {
    let value: Value = serde_json::from_str(body).ok()?;
    let code = value.get("error")?.as_i64()?;
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some((code, message))
}
