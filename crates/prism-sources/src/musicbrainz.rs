// SPDX-License-Identifier: GPL-3.0-or-later

//! MusicBrainz recording lookups.

use async_trait::async_trait;
use prism_domain::{
    Credit, CreditType, Isrc, PartialRecord, SourceName, SourceOutcome, TrackSeed,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::client::{clean, outcome_from, SourceClient};
use crate::error::Result;
use crate::http::{ClientOptions, SourceHttp};

pub const DEFAULT_BASE_URL: &str = "https://musicbrainz.org/ws/2";
pub const CONFIDENCE: f64 = 0.90;

pub struct MusicBrainzClient {
    http: SourceHttp,
    base_url: String,
}

impl MusicBrainzClient {
    /// MusicBrainz asks anonymous clients for about one request per second.
    pub fn default_options() -> ClientOptions {
        ClientOptions::new(DEFAULT_BASE_URL)
            .requests_per_minute(50)
            .timeout(Duration::from_secs(15))
    }

    pub fn new(options: ClientOptions) -> Result<Self> {
        let http = SourceHttp::new(SourceName::MusicBrainz, &options)?;
        debug!(target: "musicbrainz", base_url = %options.base_url, "Initialized MusicBrainz client");
        Ok(Self {
            http,
            base_url: options.base_url,
        })
    }

    /// Search recordings by ISRC and enrich the first hit with its relations.
    #[instrument(skip(self), fields(isrc = %isrc))]
    pub async fn fetch(&self, isrc: &Isrc) -> Result<Option<PartialRecord>> {
        let search_url = format!("{}/recording", self.base_url);
        debug!(target: "musicbrainz", url = %search_url, "Searching recordings by ISRC");

        let search: RecordingSearch = self
            .http
            .get_json(self.http.client().get(&search_url).query(&[
                ("query", format!("isrc:{}", isrc)),
                ("fmt", "json".to_string()),
            ]))
            .await?;

        let Some(recording) = search.recordings.into_iter().next() else {
            debug!(target: "musicbrainz", "no recording matched");
            return Ok(None);
        };

        let relations = match self.fetch_relations(&recording.id).await {
            Ok(relations) => relations,
            Err(error) => {
                warn!(
                    target: "musicbrainz",
                    recording_id = %recording.id,
                    %error,
                    "recording detail unavailable, continuing with search data"
                );
                Vec::new()
            }
        };

        Ok(Some(build_partial(recording, relations)))
    }

    async fn fetch_relations(&self, recording_id: &str) -> Result<Vec<Relation>> {
        let detail_url = format!("{}/recording/{}", self.base_url, recording_id);
        debug!(target: "musicbrainz", url = %detail_url, "Fetching recording detail");

        let detail: RecordingDetail = self
            .http
            .get_json(
                self.http
                    .client()
                    .get(&detail_url)
                    .query(&[("inc", "artist-rels+work-rels"), ("fmt", "json")]),
            )
            .await?;
        Ok(detail.relations)
    }
}

#[async_trait]
impl SourceClient for MusicBrainzClient {
    fn name(&self) -> SourceName {
        SourceName::MusicBrainz
    }

    async fn lookup(&self, isrc: &Isrc, _seed: Option<&TrackSeed>) -> SourceOutcome {
        outcome_from(self.fetch(isrc).await)
    }
}

#[derive(Debug, Deserialize)]
struct RecordingSearch {
    #[serde(default)]
    recordings: Vec<Recording>,
}

#[derive(Debug, Deserialize)]
struct Recording {
    id: String,
    title: Option<String>,
    length: Option<u64>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<ArtistCredit>,
    #[serde(default)]
    releases: Vec<Release>,
    #[serde(rename = "first-release-date")]
    first_release_date: Option<String>,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct ArtistCredit {
    name: String,
    #[serde(default)]
    joinphrase: String,
}

#[derive(Debug, Deserialize)]
struct Release {
    title: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
    #[serde(default)]
    count: i64,
}

#[derive(Debug, Deserialize)]
struct RecordingDetail {
    #[serde(default)]
    relations: Vec<Relation>,
}

#[derive(Debug, Deserialize)]
struct Relation {
    #[serde(rename = "type")]
    relation_type: String,
    artist: Option<RelationArtist>,
    #[serde(default)]
    attributes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RelationArtist {
    name: String,
}

fn build_partial(recording: Recording, relations: Vec<Relation>) -> PartialRecord {
    let mut partial = PartialRecord::with_confidence(CONFIDENCE);

    partial.title = clean(recording.title);
    partial.artist = clean(Some(join_artist_credit(&recording.artist_credit)));
    partial.album = recording
        .releases
        .first()
        .and_then(|release| clean(release.title.clone()));
    partial.duration_ms = recording.length.filter(|length| *length > 0);
    partial.release_date = clean(recording.first_release_date).or_else(|| {
        recording
            .releases
            .iter()
            .find_map(|release| clean(release.date.clone()))
    });
    partial.external_id = Some(recording.id);

    let mut tags = recording.tags;
    tags.sort_by(|a, b| b.count.cmp(&a.count));
    partial.tags = tags
        .into_iter()
        .filter_map(|tag| clean(Some(tag.name)))
        .collect();

    partial.credits = recording
        .artist_credit
        .iter()
        .map(|credit| {
            Credit::new(
                credit.name.as_str(),
                CreditType::PrimaryArtist,
                SourceName::MusicBrainz,
                CONFIDENCE,
            )
        })
        .chain(relations.into_iter().filter_map(relation_credit))
        .filter(|credit| !credit.name.is_empty())
        .collect();

    partial
}

/// "Artist A feat. Artist B" from the credit list and its join phrases.
fn join_artist_credit(credits: &[ArtistCredit]) -> String {
    credits
        .iter()
        .map(|credit| format!("{}{}", credit.name, credit.joinphrase))
        .collect::<String>()
        .trim()
        .to_string()
}

fn relation_credit(relation: Relation) -> Option<Credit> {
    let artist = relation.artist?;
    let credit_type = match relation.relation_type.as_str() {
        "producer" => CreditType::Producer,
        "composer" => CreditType::Composer,
        "lyricist" | "writer" => CreditType::Writer,
        "engineer" | "mix" | "recording" | "mastering" | "audio" => CreditType::Engineer,
        "instrument" | "vocal" | "performer" | "performing orchestra" => CreditType::Performer,
        _ => CreditType::Other,
    };

    let role = if relation.attributes.is_empty() {
        relation.relation_type
    } else {
        format!("{} ({})", relation.relation_type, relation.attributes.join(", "))
    };

    Some(
        Credit::new(artist.name, credit_type, SourceName::MusicBrainz, CONFIDENCE).with_role(role),
    )
}
