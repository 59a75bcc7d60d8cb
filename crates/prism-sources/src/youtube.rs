// SPDX-License-Identifier: GPL-3.0-or-later

//! YouTube Data API v3 client.

use async_trait::async_trait;
use prism_domain::{Isrc, PartialRecord, SourceName, SourceOutcome, TrackSeed};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::client::{outcome_from, SourceClient};
use crate::error::Result;
use crate::http::{ClientOptions, SourceHttp};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
pub const CONFIDENCE: f64 = 0.70;

/// YouTube's "Music" video category.
const MUSIC_CATEGORY_ID: &str = "10";
const MAX_SEARCH_RESULTS: &str = "5";

pub struct YouTubeClient {
    http: SourceHttp,
    base_url: String,
    api_key: String,
}

impl YouTubeClient {
    pub fn default_options() -> ClientOptions {
        ClientOptions::new(DEFAULT_BASE_URL).requests_per_minute(100)
    }

    pub fn new(api_key: impl Into<String>, options: ClientOptions) -> Result<Self> {
        let http = SourceHttp::new(SourceName::YouTube, &options)?;
        debug!(target: "youtube", base_url = %options.base_url, "Initialized YouTube client");
        Ok(Self {
            http,
            base_url: options.base_url,
            api_key: api_key.into(),
        })
    }

    /// Search music videos for the seed and read the statistics of the best hit.
    ///
    /// A hit whose description mentions the ISRC wins over search rank.
    #[instrument(
        skip(self, seed),
        fields(isrc = %isrc, title = %seed.title, artist = %seed.artist)
    )]
    pub async fn fetch(&self, isrc: &Isrc, seed: &TrackSeed) -> Result<Option<PartialRecord>> {
        let search_url = format!("{}/search", self.base_url);
        let query = format!("\"{}\" \"{}\"", seed.artist, seed.title);
        debug!(target: "youtube", url = %search_url, query = %query, "Searching videos");

        let search: SearchResponse = self
            .http
            .get_json(self.http.client().get(&search_url).query(&[
                ("part", "snippet"),
                ("q", query.as_str()),
                ("type", "video"),
                ("videoCategoryId", MUSIC_CATEGORY_ID),
                ("maxResults", MAX_SEARCH_RESULTS),
                ("key", self.api_key.as_str()),
            ]))
            .await?;

        let Some(video_id) = pick_video(&search.items, isrc) else {
            debug!(target: "youtube", "no video matched");
            return Ok(None);
        };

        let videos_url = format!("{}/videos", self.base_url);
        debug!(target: "youtube", url = %videos_url, video_id = %video_id, "Fetching video statistics");

        let videos: VideosResponse = self
            .http
            .get_json(self.http.client().get(&videos_url).query(&[
                ("part", "snippet,statistics"),
                ("id", video_id.as_str()),
                ("key", self.api_key.as_str()),
            ]))
            .await?;

        let Some(video) = videos.items.into_iter().next() else {
            return Ok(None);
        };

        let mut partial = PartialRecord::with_confidence(CONFIDENCE);
        partial.external_url = Some(format!("https://www.youtube.com/watch?v={}", video.id));
        partial.view_count = video
            .statistics
            .and_then(|stats| stats.view_count)
            .and_then(|count| count.parse::<u64>().ok());
        partial.external_id = Some(video.id);
        Ok(Some(partial))
    }
}

#[async_trait]
impl SourceClient for YouTubeClient {
    fn name(&self) -> SourceName {
        SourceName::YouTube
    }

    async fn lookup(&self, isrc: &Isrc, seed: Option<&TrackSeed>) -> SourceOutcome {
        match seed {
            Some(seed) => outcome_from(self.fetch(isrc, seed).await),
            None => SourceOutcome::NotFound,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    id: String,
    statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    // The API reports counts as decimal strings.
    view_count: Option<String>,
}

fn pick_video(items: &[SearchItem], isrc: &Isrc) -> Option<String> {
    let mentions_isrc = |item: &&SearchItem| {
        item.snippet
            .as_ref()
            .is_some_and(|snippet| snippet.description.to_uppercase().contains(isrc.as_str()))
    };

    items
        .iter()
        .filter(|item| item.id.video_id.is_some())
        .find(mentions_isrc)
        .or_else(|| items.iter().find(|item| item.id.video_id.is_some()))
        .and_then(|item| item.id.video_id.clone())
}
