// SPDX-License-Identifier: GPL-3.0-or-later

//! Weighted confidence score and data-completeness metric.

use prism_domain::{
    non_empty, AggregateRecord, AudioFeatures, ExternalIds, QualityRating, SourceName,
};
use serde::Serialize;

const WEIGHT_SOURCES: f64 = 0.25;
const WEIGHT_ESSENTIAL: f64 = 0.20;
const WEIGHT_AUDIO: f64 = 0.15;
const WEIGHT_EXTERNAL_IDS: f64 = 0.10;
const WEIGHT_POPULARITY: f64 = 0.10;
const WEIGHT_LYRICS: f64 = 0.10;
const WEIGHT_CREDITS: f64 = 0.05;
const WEIGHT_AGREEMENT: f64 = 0.05;

const ESSENTIAL_FIELDS: usize = 5;
const POINTS_PER_CREDIT: f64 = 20.0;

/// Fields counted by [`completeness`].
pub const TRACKED_FIELDS: usize = 35;

/// Per-factor sub-scores, each in `[0, 100]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub data_sources: f64,
    pub essential_fields: f64,
    pub audio_features: f64,
    pub external_ids: f64,
    pub popularity: f64,
    pub lyrics: f64,
    pub credits: f64,
    pub agreement: f64,
}

impl ScoreBreakdown {
    pub fn weighted_sum(&self) -> f64 {
        self.data_sources * WEIGHT_SOURCES
            + self.essential_fields * WEIGHT_ESSENTIAL
            + self.audio_features * WEIGHT_AUDIO
            + self.external_ids * WEIGHT_EXTERNAL_IDS
            + self.popularity * WEIGHT_POPULARITY
            + self.lyrics * WEIGHT_LYRICS
            + self.credits * WEIGHT_CREDITS
            + self.agreement * WEIGHT_AGREEMENT
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Score {
    pub confidence: f64,
    pub completeness: f64,
    pub rating: QualityRating,
    pub multiplier: f64,
    pub breakdown: ScoreBreakdown,
}

pub fn score(record: &AggregateRecord) -> Score {
    let breakdown = breakdown(record);
    let multiplier = source_multiplier(record.sources.len());

    let confidence = if record.sources.is_empty() {
        0.0
    } else {
        round2((breakdown.weighted_sum() * multiplier).clamp(0.0, 100.0))
    };

    Score {
        confidence,
        completeness: completeness(record),
        rating: QualityRating::from_score(confidence),
        multiplier,
        breakdown,
    }
}

/// Score the record and write confidence, completeness and rating back.
pub fn apply_score(record: &mut AggregateRecord) -> Score {
    let result = score(record);
    record.confidence_score = result.confidence;
    record.data_completeness = result.completeness;
    record.quality_rating = result.rating;
    result
}

pub fn breakdown(record: &AggregateRecord) -> ScoreBreakdown {
    let essential_present = [
        non_empty(&record.title),
        non_empty(&record.artist),
        non_empty(&record.album),
        record.duration_ms.is_some_and(|d| d > 0),
        non_empty(&record.release_date),
    ]
    .iter()
    .filter(|present| **present)
    .count();

    let mut popularity = 0.0;
    if record.popularity.is_some_and(|p| p > 0) {
        popularity += 50.0;
    }
    if record.youtube_views.is_some_and(|v| v > 0) {
        popularity += 50.0;
    }

    ScoreBreakdown {
        data_sources: coverage_points(&record.sources),
        essential_fields: percent(essential_present, ESSENTIAL_FIELDS),
        audio_features: percent(
            record.audio_features.scored_present(),
            AudioFeatures::SCORED_COUNT,
        ),
        external_ids: percent(record.external_ids.present_count(), ExternalIds::SLOTS),
        popularity,
        lyrics: if record.has_lyrics() { 100.0 } else { 0.0 },
        credits: (record.credits.len() as f64 * POINTS_PER_CREDIT).min(100.0),
        agreement: match record.sources.len() {
            0 | 1 => 0.0,
            2 => 70.0,
            _ => 100.0,
        },
    }
}

fn coverage_points(sources: &[SourceName]) -> f64 {
    let points: f64 = sources
        .iter()
        .map(|source| match source {
            SourceName::MusicBrainz | SourceName::Spotify => 35.0,
            SourceName::YouTube => 30.0,
            SourceName::Genius | SourceName::LastFm | SourceName::Discogs => 10.0,
        })
        .sum();
    points.min(100.0)
}

pub fn source_multiplier(source_count: usize) -> f64 {
    match source_count {
        0 => 0.3,
        1 => 0.7,
        2 => 0.9,
        _ => 1.0,
    }
}

/// Percentage of the tracked fields that hold a non-empty, non-zero value.
pub fn completeness(record: &AggregateRecord) -> f64 {
    let features = &record.audio_features;
    let ids = &record.external_ids;

    let present = [
        non_empty(&record.title),
        non_empty(&record.artist),
        non_empty(&record.album),
        record.duration_ms.is_some_and(|d| d > 0),
        non_empty(&record.release_date),
        non_empty(&ids.musicbrainz_recording_id),
        non_empty(&ids.spotify_id),
        non_empty(&ids.youtube_video_id),
        non_empty(&ids.genius_song_id),
        non_empty(&ids.lastfm_url),
        non_empty(&ids.discogs_release_id),
        nonzero_f(features.tempo),
        features.key.is_some(),
        features.mode.is_some(),
        features.time_signature.is_some_and(|t| t > 0),
        nonzero_f(features.energy),
        nonzero_f(features.danceability),
        nonzero_f(features.valence),
        nonzero_f(features.loudness),
        nonzero_f(features.speechiness),
        nonzero_f(features.acousticness),
        nonzero_f(features.instrumentalness),
        nonzero_f(features.liveness),
        record.popularity.is_some_and(|p| p > 0),
        record.youtube_views.is_some_and(|v| v > 0),
        record.lastfm_listeners.is_some_and(|v| v > 0),
        record.lastfm_playcount.is_some_and(|v| v > 0),
        non_empty(&record.spotify_url),
        non_empty(&record.youtube_url),
        !record.genres.is_empty(),
        !record.styles.is_empty(),
        !record.tags.is_empty(),
        !record.credits.is_empty(),
        record.has_lyrics(),
        !record.sources.is_empty(),
    ];
    debug_assert_eq!(present.len(), TRACKED_FIELDS);

    let count = present.iter().filter(|p| **p).count();
    round2(percent(count, TRACKED_FIELDS))
}

fn nonzero_f(value: Option<f64>) -> bool {
    value.is_some_and(|v| v != 0.0 && v.is_finite())
}

fn percent(present: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    present as f64 / total as f64 * 100.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::isrc;
    use prism_domain::{Credit, CreditType, LyricsInfo};

    fn record_with(sources: Vec<SourceName>) -> AggregateRecord {
        let mut record = AggregateRecord::empty(isrc());
        record.title = Some("Song A".into());
        record.artist = Some("Artist X".into());
        record.sources = sources;
        record
    }

    fn full_record() -> AggregateRecord {
        let mut record = record_with(SourceName::ALL.to_vec());
        record.album = Some("Album".into());
        record.duration_ms = Some(354_000);
        record.release_date = Some("1975-10-31".into());
        for source in SourceName::ALL {
            record.external_ids.set(source, Some(format!("{}-id", source)));
        }
        record.audio_features = AudioFeatures {
            tempo: Some(72.0),
            key: Some(10),
            mode: Some(0),
            time_signature: Some(4),
            energy: Some(0.4),
            danceability: Some(0.3),
            valence: Some(0.2),
            loudness: Some(-9.9),
            speechiness: Some(0.05),
            acousticness: Some(0.3),
            instrumentalness: Some(0.001),
            liveness: Some(0.2),
        };
        record.popularity = Some(80);
        record.youtube_views = Some(1_000_000);
        record.lastfm_listeners = Some(10);
        record.lastfm_playcount = Some(100);
        record.spotify_url = Some("https://open.spotify.com/track/x".into());
        record.youtube_url = Some("https://www.youtube.com/watch?v=x".into());
        record.genres = vec!["rock".into()];
        record.styles = vec!["prog rock".into()];
        record.tags = vec!["classic".into()];
        record.credits = (0..5)
            .map(|i| {
                Credit::new(format!("Person {}", i), CreditType::Writer, SourceName::Genius, 0.85)
            })
            .collect();
        record.lyrics = Some(LyricsInfo {
            source: Some(SourceName::Genius),
            ..LyricsInfo::default()
        });
        record
    }

    #[test]
    fn weights_sum_to_one() {
        let total = WEIGHT_SOURCES
            + WEIGHT_ESSENTIAL
            + WEIGHT_AUDIO
            + WEIGHT_EXTERNAL_IDS
            + WEIGHT_POPULARITY
            + WEIGHT_LYRICS
            + WEIGHT_CREDITS
            + WEIGHT_AGREEMENT;
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn no_sources_scores_zero() {
        let mut record = record_with(Vec::new());
        let result = apply_score(&mut record);

        assert_eq!(result.confidence, 0.0);
        assert_eq!(record.confidence_score, 0.0);
        assert_eq!(record.quality_rating, QualityRating::Insufficient);
        assert_eq!(result.multiplier, 0.3);
    }

    #[test]
    fn fully_populated_record_is_excellent() {
        let result = score(&full_record());

        assert_eq!(result.confidence, 100.0);
        assert_eq!(result.completeness, 100.0);
        assert_eq!(result.rating, QualityRating::Excellent);
    }

    #[test]
    fn two_source_example() {
        let mut record = record_with(vec![SourceName::MusicBrainz, SourceName::YouTube]);
        record.youtube_views = Some(1000);

        let result = score(&record);

        // coverage 65, essential 40, popularity 50, agreement 70
        assert_eq!(result.breakdown.data_sources, 65.0);
        assert_eq!(result.breakdown.essential_fields, 40.0);
        assert_eq!(result.breakdown.popularity, 50.0);
        assert_eq!(result.breakdown.agreement, 70.0);
        assert_eq!(result.multiplier, 0.9);
        assert!((result.confidence - 32.75 * 0.9).abs() < 0.01);
        assert_eq!(result.rating, QualityRating::Insufficient);
        assert!((result.completeness - 11.43).abs() < 1e-9);
    }

    #[test]
    fn adding_a_source_never_lowers_the_score() {
        let one = score(&record_with(vec![SourceName::Discogs]));
        let two = score(&record_with(vec![SourceName::Discogs, SourceName::LastFm]));
        let three = score(&record_with(vec![
            SourceName::Discogs,
            SourceName::LastFm,
            SourceName::Genius,
        ]));

        assert!(one.confidence <= two.confidence);
        assert!(two.confidence <= three.confidence);
    }

    #[test]
    fn scores_stay_in_bounds() {
        let records = vec![
            record_with(Vec::new()),
            record_with(vec![SourceName::Spotify]),
            full_record(),
            {
                let mut r = full_record();
                r.credits = (0..40)
                    .map(|i| {
                        Credit::new(format!("P{}", i), CreditType::Producer, SourceName::Discogs, 1.0)
                    })
                    .collect();
                r
            },
        ];

        for record in &records {
            let result = score(record);
            assert!((0.0..=100.0).contains(&result.confidence));
            assert!((0.0..=100.0).contains(&result.completeness));
            let b = result.breakdown;
            for sub in [
                b.data_sources,
                b.essential_fields,
                b.audio_features,
                b.external_ids,
                b.popularity,
                b.lyrics,
                b.credits,
                b.agreement,
            ] {
                assert!((0.0..=100.0).contains(&sub));
            }
        }
    }

    #[test]
    fn coverage_is_capped() {
        assert_eq!(coverage_points(&SourceName::ALL), 100.0);
        assert_eq!(coverage_points(&[SourceName::Genius, SourceName::LastFm]), 20.0);
    }

    #[test]
    fn zero_values_do_not_count_as_present() {
        let mut record = record_with(vec![SourceName::Spotify]);
        record.popularity = Some(0);
        record.youtube_views = Some(0);
        record.duration_ms = Some(0);

        let result = score(&record);
        assert_eq!(result.breakdown.popularity, 0.0);
        assert_eq!(result.breakdown.essential_fields, 40.0);
    }
}
