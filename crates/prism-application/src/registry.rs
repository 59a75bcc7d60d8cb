// SPDX-License-Identifier: GPL-3.0-or-later

//! Build the configured source clients.

use std::sync::Arc;
use std::time::Duration;

use prism_config::{KeyedSourceConfig, SourcesConfig};
use prism_sources::{
    ClientOptions, DiscogsClient, GeniusClient, LastFmClient, MusicBrainzClient, SourceClient,
    SourceError, SpotifyClient, SpotifyCredentials, YouTubeClient,
};
use tracing::{info, warn};

fn blank_to_none(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn apply(
    options: ClientOptions,
    base_url: &Option<String>,
    rpm: usize,
    timeout_secs: u64,
) -> ClientOptions {
    options
        .maybe_base_url(base_url.clone())
        .requests_per_minute(rpm)
        .timeout(Duration::from_secs(timeout_secs))
}

fn keyed(defaults: ClientOptions, config: &KeyedSourceConfig) -> ClientOptions {
    apply(defaults, &config.base_url, config.requests_per_minute, config.timeout_secs)
}

/// One client per vendor that is enabled and has credentials. Vendors
/// without credentials are skipped with a warning.
pub fn build_sources(config: &SourcesConfig) -> Result<Vec<Arc<dyn SourceClient>>, SourceError> {
    let mut clients: Vec<Arc<dyn SourceClient>> = Vec::new();

    let musicbrainz = &config.musicbrainz;
    if musicbrainz.enabled {
        let options = apply(
            MusicBrainzClient::default_options(),
            &musicbrainz.base_url,
            musicbrainz.requests_per_minute,
            musicbrainz.timeout_secs,
        );
        clients.push(Arc::new(MusicBrainzClient::new(options)?));
    } else {
        info!(target: "registry", "musicbrainz disabled");
    }

    let spotify = &config.spotify;
    match (blank_to_none(&spotify.client_id), blank_to_none(&spotify.client_secret)) {
        (Some(client_id), Some(client_secret)) => {
            let options = apply(
                SpotifyClient::default_options(),
                &spotify.base_url,
                spotify.requests_per_minute,
                spotify.timeout_secs,
            );
            let credentials = SpotifyCredentials {
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
            };
            let mut client = SpotifyClient::new(credentials, options)?;
            if let Some(auth_url) = blank_to_none(&spotify.auth_url) {
                client = client.with_auth_url(auth_url);
            }
            clients.push(Arc::new(client));
        }
        _ => warn!(target: "registry", "spotify credentials missing, source disabled"),
    }

    match config.youtube.key() {
        Some(key) => clients.push(Arc::new(YouTubeClient::new(
            key,
            keyed(YouTubeClient::default_options(), &config.youtube),
        )?)),
        None => warn!(target: "registry", "youtube api key missing, source disabled"),
    }

    match config.genius.key() {
        Some(key) => clients.push(Arc::new(GeniusClient::new(
            key,
            keyed(GeniusClient::default_options(), &config.genius),
        )?)),
        None => warn!(target: "registry", "genius access token missing, source disabled"),
    }

    match config.lastfm.key() {
        Some(key) => clients.push(Arc::new(LastFmClient::new(
            key,
            keyed(LastFmClient::default_options(), &config.lastfm),
        )?)),
        None => warn!(target: "registry", "last.fm api key missing, source disabled"),
    }

    match config.discogs.key() {
        Some(key) => clients.push(Arc::new(DiscogsClient::new(
            key,
            keyed(DiscogsClient::default_options(), &config.discogs),
        )?)),
        None => warn!(target: "registry", "discogs token missing, source disabled"),
    }

    info!(
        target: "registry",
        sources = ?clients.iter().map(|c| c.name().as_str()).collect::<Vec<_>>(),
        "source clients ready"
    );
    Ok(clients)
}
