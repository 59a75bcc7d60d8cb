// SPDX-License-Identifier: GPL-3.0-or-later
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod isrc;

pub use isrc::{extract_all, normalize, validate, Isrc, IsrcError};

/// Maximum number of genres, styles and tags kept per category.
pub const MAX_TAGS_PER_CATEGORY: usize = 5;

/// Maximum number of credits kept on a merged record.
pub const MAX_CREDITS: usize = 20;

// ============================================================================
// Sources
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceName {
    MusicBrainz,
    Spotify,
    YouTube,
    Genius,
    LastFm,
    Discogs,
}

/// Primary sources can be queried by ISRC alone; secondary sources need a
/// title and artist seed obtained from a primary source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Primary,
    Secondary,
}

impl SourceName {
    pub const ALL: [SourceName; 6] = [
        SourceName::MusicBrainz,
        SourceName::Spotify,
        SourceName::YouTube,
        SourceName::Genius,
        SourceName::LastFm,
        SourceName::Discogs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceName::MusicBrainz => "MusicBrainz",
            SourceName::Spotify => "Spotify",
            SourceName::YouTube => "YouTube",
            SourceName::Genius => "Genius",
            SourceName::LastFm => "LastFm",
            SourceName::Discogs => "Discogs",
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            SourceName::MusicBrainz | SourceName::Spotify => SourceKind::Primary,
            _ => SourceKind::Secondary,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl std::fmt::Display for SourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order in which sources win single-valued fields. The recording database
/// is the bibliographic authority, the commercial catalog comes next.
pub const MERGE_PRIORITY: [SourceName; 6] = [
    SourceName::MusicBrainz,
    SourceName::Spotify,
    SourceName::Discogs,
    SourceName::LastFm,
    SourceName::Genius,
    SourceName::YouTube,
];

/// Order in which primary results are consulted for the secondary-lookup seed.
pub const PRIMARY_PRIORITY: [SourceName; 2] = [SourceName::MusicBrainz, SourceName::Spotify];

/// The only source allowed to populate audio features.
pub const AUDIO_FEATURE_AUTHORITY: SourceName = SourceName::Spotify;

// ============================================================================
// Per-source results
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub tempo: Option<f64>,
    pub key: Option<i32>,
    pub mode: Option<i32>,
    pub time_signature: Option<i32>,
    pub energy: Option<f64>,
    pub danceability: Option<f64>,
    pub valence: Option<f64>,
    pub loudness: Option<f64>,
    pub speechiness: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub liveness: Option<f64>,
}

impl AudioFeatures {
    /// Number of the features used for scoring (tempo, key, energy,
    /// danceability, valence) that are present.
    pub fn scored_present(&self) -> usize {
        [
            self.tempo.is_some(),
            self.key.is_some(),
            self.energy.is_some(),
            self.danceability.is_some(),
            self.valence.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }

    pub const SCORED_COUNT: usize = 5;

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditType {
    PrimaryArtist,
    FeaturedArtist,
    Producer,
    Writer,
    Composer,
    Engineer,
    Performer,
    Other,
}

impl CreditType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditType::PrimaryArtist => "primary_artist",
            CreditType::FeaturedArtist => "featured_artist",
            CreditType::Producer => "producer",
            CreditType::Writer => "writer",
            CreditType::Composer => "composer",
            CreditType::Engineer => "engineer",
            CreditType::Performer => "performer",
            CreditType::Other => "other",
        }
    }

    /// Unknown labels fall back to `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "primary_artist" => CreditType::PrimaryArtist,
            "featured_artist" => CreditType::FeaturedArtist,
            "producer" => CreditType::Producer,
            "writer" => CreditType::Writer,
            "composer" => CreditType::Composer,
            "engineer" => CreditType::Engineer,
            "performer" => CreditType::Performer,
            _ => CreditType::Other,
        }
    }
}

impl std::fmt::Display for CreditType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credit {
    pub name: String,
    pub credit_type: CreditType,
    /// Free-form role detail as reported by the source ("Mixed By", "lyricist").
    pub role: Option<String>,
    pub source: SourceName,
    pub confidence: f64,
}

impl Credit {
    pub fn new(
        name: impl Into<String>,
        credit_type: CreditType,
        source: SourceName,
        confidence: f64,
    ) -> Self {
        Self {
            name: name.into().trim().to_string(),
            credit_type,
            role: None,
            source,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        let role = role.into();
        if !role.trim().is_empty() {
            self.role = Some(role.trim().to_string());
        }
        self
    }

    /// Key used to deduplicate credits reported by several sources.
    pub fn dedup_key(&self) -> (String, CreditType) {
        (self.name.trim().to_lowercase(), self.credit_type)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LyricsInfo {
    pub source: Option<SourceName>,
    pub song_id: Option<String>,
    pub url: Option<String>,
    pub language: Option<String>,
    pub explicit: bool,
    pub lyrics_state: Option<String>,
    pub page_views: Option<u64>,
}

/// Sparse bag of fields returned by a single source for one ISRC.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialRecord {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_ms: Option<u64>,
    pub release_date: Option<String>,
    pub external_id: Option<String>,
    pub external_url: Option<String>,
    /// Source-specific trust weight in `[0, 1]`.
    pub confidence: f64,
    pub audio_features: Option<AudioFeatures>,
    pub popularity: Option<u32>,
    pub view_count: Option<u64>,
    pub play_count: Option<u64>,
    pub listeners: Option<u64>,
    pub genres: Vec<String>,
    pub styles: Vec<String>,
    pub tags: Vec<String>,
    pub credits: Vec<Credit>,
    pub lyrics: Option<LyricsInfo>,
}

impl PartialRecord {
    pub fn with_confidence(confidence: f64) -> Self {
        Self {
            confidence: confidence.clamp(0.0, 1.0),
            ..Self::default()
        }
    }

    pub fn has_usable_field(&self) -> bool {
        non_empty(&self.title)
            || non_empty(&self.artist)
            || non_empty(&self.album)
            || self.duration_ms.is_some_and(|d| d > 0)
            || non_empty(&self.release_date)
            || non_empty(&self.external_id)
            || non_empty(&self.external_url)
            || self.audio_features.as_ref().is_some_and(|f| !f.is_empty())
            || self.popularity.is_some()
            || self.view_count.is_some()
            || self.play_count.is_some()
            || self.listeners.is_some()
            || !self.genres.is_empty()
            || !self.styles.is_empty()
            || !self.tags.is_empty()
            || !self.credits.is_empty()
            || self.lyrics.is_some()
    }
}

/// Result of asking one source about one ISRC.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Found(PartialRecord),
    NotFound,
    Error(String),
}

impl SourceOutcome {
    pub fn partial(&self) -> Option<&PartialRecord> {
        match self {
            SourceOutcome::Found(partial) => Some(partial),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceOutcome::Found(_) => "found",
            SourceOutcome::NotFound => "not_found",
            SourceOutcome::Error(_) => "error",
        }
    }
}

/// Title/artist pair (plus album when known) used to query secondary sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSeed {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
}

// ============================================================================
// Aggregate record
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalIds {
    pub musicbrainz_recording_id: Option<String>,
    pub spotify_id: Option<String>,
    pub youtube_video_id: Option<String>,
    pub genius_song_id: Option<String>,
    pub lastfm_url: Option<String>,
    pub discogs_release_id: Option<String>,
}

impl ExternalIds {
    pub const SLOTS: usize = 6;

    pub fn get(&self, source: SourceName) -> Option<&str> {
        match source {
            SourceName::MusicBrainz => self.musicbrainz_recording_id.as_deref(),
            SourceName::Spotify => self.spotify_id.as_deref(),
            SourceName::YouTube => self.youtube_video_id.as_deref(),
            SourceName::Genius => self.genius_song_id.as_deref(),
            SourceName::LastFm => self.lastfm_url.as_deref(),
            SourceName::Discogs => self.discogs_release_id.as_deref(),
        }
    }

    pub fn set(&mut self, source: SourceName, value: Option<String>) {
        let slot = match source {
            SourceName::MusicBrainz => &mut self.musicbrainz_recording_id,
            SourceName::Spotify => &mut self.spotify_id,
            SourceName::YouTube => &mut self.youtube_video_id,
            SourceName::Genius => &mut self.genius_song_id,
            SourceName::LastFm => &mut self.lastfm_url,
            SourceName::Discogs => &mut self.discogs_release_id,
        };
        *slot = value;
    }

    pub fn present_count(&self) -> usize {
        SourceName::ALL
            .iter()
            .filter(|source| self.get(**source).is_some_and(|id| !id.is_empty()))
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityRating {
    Excellent,
    Good,
    Fair,
    Poor,
    Insufficient,
}

impl QualityRating {
    /// Map a 0-100 confidence score to a rating; lower bounds are inclusive.
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            QualityRating::Excellent
        } else if score >= 75.0 {
            QualityRating::Good
        } else if score >= 60.0 {
            QualityRating::Fair
        } else if score >= 40.0 {
            QualityRating::Poor
        } else {
            QualityRating::Insufficient
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityRating::Excellent => "Excellent",
            QualityRating::Good => "Good",
            QualityRating::Fair => "Fair",
            QualityRating::Poor => "Poor",
            QualityRating::Insufficient => "Insufficient",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Excellent" => Some(QualityRating::Excellent),
            "Good" => Some(QualityRating::Good),
            "Fair" => Some(QualityRating::Fair),
            "Poor" => Some(QualityRating::Poor),
            "Insufficient" => Some(QualityRating::Insufficient),
            _ => None,
        }
    }
}

impl std::fmt::Display for QualityRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical merged metadata for one ISRC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub isrc: Isrc,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_ms: Option<u64>,
    pub release_date: Option<String>,
    #[serde(default)]
    pub external_ids: ExternalIds,
    #[serde(default)]
    pub audio_features: AudioFeatures,
    pub popularity: Option<u32>,
    pub youtube_views: Option<u64>,
    pub lastfm_listeners: Option<u64>,
    pub lastfm_playcount: Option<u64>,
    pub spotify_url: Option<String>,
    pub youtube_url: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub credits: Vec<Credit>,
    pub lyrics: Option<LyricsInfo>,
    #[serde(default)]
    pub sources: Vec<SourceName>,
    pub confidence_score: f64,
    pub data_completeness: f64,
    pub quality_rating: QualityRating,
    pub last_updated: Option<DateTime<Utc>>,
}

impl AggregateRecord {
    /// The "nothing found" record: no sources, zero confidence.
    pub fn empty(isrc: Isrc) -> Self {
        Self {
            isrc,
            title: None,
            artist: None,
            album: None,
            duration_ms: None,
            release_date: None,
            external_ids: ExternalIds::default(),
            audio_features: AudioFeatures::default(),
            popularity: None,
            youtube_views: None,
            lastfm_listeners: None,
            lastfm_playcount: None,
            spotify_url: None,
            youtube_url: None,
            genres: Vec::new(),
            styles: Vec::new(),
            tags: Vec::new(),
            credits: Vec::new(),
            lyrics: None,
            sources: Vec::new(),
            confidence_score: 0.0,
            data_completeness: 0.0,
            quality_rating: QualityRating::Insufficient,
            last_updated: None,
        }
    }

    pub fn has_lyrics(&self) -> bool {
        self.lyrics.is_some()
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = Some(now);
    }
}

pub fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_boundaries_are_inclusive_lower_bounds() {
        assert_eq!(QualityRating::from_score(100.0), QualityRating::Excellent);
        assert_eq!(QualityRating::from_score(90.0), QualityRating::Excellent);
        assert_eq!(QualityRating::from_score(89.999), QualityRating::Good);
        assert_eq!(QualityRating::from_score(75.0), QualityRating::Good);
        assert_eq!(QualityRating::from_score(74.999), QualityRating::Fair);
        assert_eq!(QualityRating::from_score(60.0), QualityRating::Fair);
        assert_eq!(QualityRating::from_score(59.999), QualityRating::Poor);
        assert_eq!(QualityRating::from_score(40.0), QualityRating::Poor);
        assert_eq!(QualityRating::from_score(39.999), QualityRating::Insufficient);
        assert_eq!(QualityRating::from_score(0.0), QualityRating::Insufficient);
    }

    #[test]
    fn rating_string_round_trip() {
        for rating in [
            QualityRating::Excellent,
            QualityRating::Good,
            QualityRating::Fair,
            QualityRating::Poor,
            QualityRating::Insufficient,
        ] {
            assert_eq!(QualityRating::parse(rating.as_str()), Some(rating));
        }
    }

    #[test]
    fn source_kinds() {
        assert_eq!(SourceName::MusicBrainz.kind(), SourceKind::Primary);
        assert_eq!(SourceName::Spotify.kind(), SourceKind::Primary);
        for secondary in [
            SourceName::YouTube,
            SourceName::Genius,
            SourceName::LastFm,
            SourceName::Discogs,
        ] {
            assert_eq!(secondary.kind(), SourceKind::Secondary);
        }
        assert_eq!(SourceName::parse("lastfm"), Some(SourceName::LastFm));
        assert_eq!(SourceName::parse(" MUSICBRAINZ "), Some(SourceName::MusicBrainz));
        assert_eq!(SourceName::parse("napster"), None);
    }

    #[test]
    fn credit_type_labels_round_trip() {
        for credit_type in [
            CreditType::PrimaryArtist,
            CreditType::FeaturedArtist,
            CreditType::Producer,
            CreditType::Writer,
            CreditType::Composer,
            CreditType::Engineer,
            CreditType::Performer,
            CreditType::Other,
        ] {
            assert_eq!(CreditType::parse(credit_type.as_str()), credit_type);
        }
        assert_eq!(CreditType::parse("lyricist"), CreditType::Other);
    }

    #[test]
    fn credit_confidence_is_clamped_and_name_trimmed() {
        let credit = Credit::new("  Max Martin ", CreditType::Producer, SourceName::Genius, 1.4);
        assert_eq!(credit.name, "Max Martin");
        assert_eq!(credit.confidence, 1.0);
        assert_eq!(credit.dedup_key(), ("max martin".to_string(), CreditType::Producer));
    }

    #[test]
    fn empty_partial_has_no_usable_field() {
        let mut partial = PartialRecord::with_confidence(0.9);
        assert!(!partial.has_usable_field());
        partial.title = Some("   ".to_string());
        assert!(!partial.has_usable_field());
        partial.view_count = Some(0);
        assert!(partial.has_usable_field());
    }

    #[test]
    fn external_id_slots() {
        let mut ids = ExternalIds::default();
        ids.set(SourceName::Spotify, Some("abc".to_string()));
        ids.set(SourceName::Discogs, Some("42".to_string()));
        assert_eq!(ids.get(SourceName::Spotify), Some("abc"));
        assert_eq!(ids.present_count(), 2);
    }

    #[test]
    fn empty_record_is_insufficient() {
        let record = AggregateRecord::empty(Isrc::parse("USRC17607839").unwrap());
        assert!(record.sources.is_empty());
        assert_eq!(record.confidence_score, 0.0);
        assert_eq!(record.quality_rating, QualityRating::Insufficient);
        assert!(record.last_updated.is_none());
    }
}
