// SPDX-License-Identifier: GPL-3.0-or-later

//! Spotify Web API client using the client-credentials flow.

use async_trait::async_trait;
use prism_domain::{
    AudioFeatures, Credit, CreditType, Isrc, PartialRecord, SourceName, SourceOutcome, TrackSeed,
};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::client::{clean, outcome_from, SourceClient};
use crate::error::{Result, SourceError};
use crate::http::{ClientOptions, SourceHttp};

pub const DEFAULT_BASE_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/api/token";
pub const CONFIDENCE: f64 = 0.85;

/// Tokens are refreshed this long before the vendor-reported expiry.
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

pub struct SpotifyClient {
    http: SourceHttp,
    base_url: String,
    auth_url: String,
    credentials: SpotifyCredentials,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn default_options() -> ClientOptions {
        ClientOptions::new(DEFAULT_BASE_URL).requests_per_minute(100)
    }

    pub fn new(credentials: SpotifyCredentials, options: ClientOptions) -> Result<Self> {
        let http = SourceHttp::new(SourceName::Spotify, &options)?;
        debug!(target: "spotify", base_url = %options.base_url, "Initialized Spotify client");
        Ok(Self {
            http,
            base_url: options.base_url,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            credentials,
            token: Mutex::new(None),
        })
    }

    /// Use a different token endpoint (useful for testing with mock servers).
    pub fn with_auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self
    }

    /// Return the cached bearer token, requesting a new one when it has expired.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        debug!(target: "spotify", url = %self.auth_url, "Requesting access token");
        let request = self
            .http
            .client()
            .post(&self.auth_url)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[("grant_type", "client_credentials")]);

        let response: TokenResponse = self
            .http
            .get_json(request)
            .await
            .map_err(|error| match error {
                SourceError::Api { status, message } => {
                    SourceError::Auth(format!("token request failed with {}: {}", status, message))
                }
                SourceError::NotFound(url) => {
                    SourceError::Auth(format!("token endpoint not found: {}", url))
                }
                other => other,
            })?;

        let lifetime = response
            .expires_in
            .unwrap_or(3600)
            .saturating_sub(TOKEN_EXPIRY_MARGIN_SECS);
        let token = AccessToken {
            value: response.access_token,
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        };
        info!(target: "spotify", "access token obtained, valid for {}s", lifetime);

        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Find the track carrying `isrc` and attach its audio features.
    #[instrument(skip(self), fields(isrc = %isrc))]
    pub async fn fetch(&self, isrc: &Isrc) -> Result<Option<PartialRecord>> {
        let token = self.access_token().await?;

        let search_url = format!("{}/search", self.base_url);
        debug!(target: "spotify", url = %search_url, "Searching track by ISRC");

        let search: SearchResponse = self
            .http
            .get_json(
                self.http
                    .client()
                    .get(&search_url)
                    .bearer_auth(&token)
                    .query(&[
                        ("q", format!("isrc:{}", isrc)),
                        ("type", "track".to_string()),
                        ("limit", "1".to_string()),
                    ]),
            )
            .await?;

        let Some(track) = search.tracks.and_then(|page| page.items.into_iter().next()) else {
            debug!(target: "spotify", "no track matched");
            return Ok(None);
        };

        let features = match self.fetch_audio_features(&token, &track.id).await {
            Ok(features) => Some(features),
            Err(error) => {
                warn!(
                    target: "spotify",
                    track_id = %track.id,
                    %error,
                    "audio features unavailable"
                );
                None
            }
        };

        Ok(Some(build_partial(track, features)))
    }

    async fn fetch_audio_features(&self, token: &str, track_id: &str) -> Result<AudioFeatures> {
        let url = format!("{}/audio-features/{}", self.base_url, track_id);
        debug!(target: "spotify", url = %url, "Fetching audio features");

        let raw: RawAudioFeatures = self
            .http
            .get_json(self.http.client().get(&url).bearer_auth(token))
            .await?;
        Ok(raw.into())
    }
}

#[async_trait]
impl SourceClient for SpotifyClient {
    fn name(&self) -> SourceName {
        SourceName::Spotify
    }

    async fn lookup(&self, isrc: &Isrc, _seed: Option<&TrackSeed>) -> SourceOutcome {
        outcome_from(self.fetch(isrc).await)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Option<TrackPage>,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<Track>,
}

#[derive(Debug, Deserialize)]
struct Track {
    id: String,
    name: Option<String>,
    #[serde(default)]
    artists: Vec<Artist>,
    album: Option<Album>,
    duration_ms: Option<u64>,
    popularity: Option<u32>,
    external_urls: Option<ExternalUrls>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Album {
    name: Option<String>,
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAudioFeatures {
    tempo: Option<f64>,
    key: Option<i32>,
    mode: Option<i32>,
    time_signature: Option<i32>,
    energy: Option<f64>,
    danceability: Option<f64>,
    valence: Option<f64>,
    loudness: Option<f64>,
    speechiness: Option<f64>,
    acousticness: Option<f64>,
    instrumentalness: Option<f64>,
    liveness: Option<f64>,
}

impl From<RawAudioFeatures> for AudioFeatures {
    fn from(raw: RawAudioFeatures) -> Self {
        Self {
            tempo: raw.tempo,
            // -1 means no key was detected
            key: raw.key.filter(|key| *key >= 0),
            mode: raw.mode,
            time_signature: raw.time_signature,
            energy: raw.energy,
            danceability: raw.danceability,
            valence: raw.valence,
            loudness: raw.loudness,
            speechiness: raw.speechiness,
            acousticness: raw.acousticness,
            instrumentalness: raw.instrumentalness,
            liveness: raw.liveness,
        }
    }
}

fn build_partial(track: Track, features: Option<AudioFeatures>) -> PartialRecord {
    let mut partial = PartialRecord::with_confidence(CONFIDENCE);

    let artist_names: Vec<&str> = track.artists.iter().map(|a| a.name.as_str()).collect();
    partial.title = clean(track.name);
    partial.artist = clean(Some(artist_names.join(", ")));
    if let Some(album) = track.album {
        partial.album = clean(album.name);
        partial.release_date = clean(album.release_date);
    }
    partial.duration_ms = track.duration_ms.filter(|d| *d > 0);
    partial.popularity = track.popularity;
    partial.external_url = track.external_urls.and_then(|urls| clean(urls.spotify));
    partial.audio_features = features.filter(|features| !features.is_empty());
    partial.credits = artist_names
        .iter()
        .map(|name| Credit::new(*name, CreditType::PrimaryArtist, SourceName::Spotify, CONFIDENCE))
        .filter(|credit| !credit.name.is_empty())
        .collect();
    partial.external_id = Some(track.id);

    partial
}
