// SPDX-License-Identifier: GPL-3.0-or-later

//! Priority-ordered merge of per-source partial records.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use prism_domain::{
    non_empty, AggregateRecord, Credit, Isrc, PartialRecord, SourceName, AUDIO_FEATURE_AUTHORITY,
    MAX_CREDITS, MAX_TAGS_PER_CATEGORY, MERGE_PRIORITY,
};

use crate::collector::Collection;

/// Merge a collection into a fresh record stamped with the current time.
pub fn merge(isrc: &Isrc, collection: &Collection) -> AggregateRecord {
    merge_at(isrc, collection, Utc::now())
}

/// Deterministic merge: single-valued fields take the first non-empty value
/// in [`MERGE_PRIORITY`] order, vendor-specific fields come only from their
/// vendor, and list fields are unioned in priority order. Scores are left at
/// zero for the scorer to fill in.
pub fn merge_at(isrc: &Isrc, collection: &Collection, now: DateTime<Utc>) -> AggregateRecord {
    let mut record = AggregateRecord::empty(isrc.clone());

    let contributing: Vec<(SourceName, &PartialRecord)> = MERGE_PRIORITY
        .iter()
        .filter_map(|source| {
            collection
                .found(*source)
                .filter(|partial| partial.has_usable_field())
                .map(|partial| (*source, partial))
        })
        .collect();

    for (source, partial) in &contributing {
        let source = *source;
        record.sources.push(source);

        fill_text(&mut record.title, &partial.title);
        fill_text(&mut record.artist, &partial.artist);
        fill_text(&mut record.album, &partial.album);
        fill_text(&mut record.release_date, &partial.release_date);
        if record.duration_ms.is_none() {
            record.duration_ms = partial.duration_ms.filter(|d| *d > 0);
        }

        if non_empty(&partial.external_id) {
            record.external_ids.set(
                source,
                partial.external_id.as_deref().map(|id| id.trim().to_string()),
            );
        }

        if record.lyrics.is_none() {
            record.lyrics = partial.lyrics.clone();
        }

        match source {
            SourceName::Spotify => {
                record.popularity = partial.popularity;
                record.spotify_url = trimmed(&partial.external_url);
            }
            SourceName::YouTube => {
                record.youtube_views = partial.view_count;
                record.youtube_url = trimmed(&partial.external_url);
            }
            SourceName::LastFm => {
                record.lastfm_listeners = partial.listeners;
                record.lastfm_playcount = partial.play_count;
            }
            _ => {}
        }

        if source == AUDIO_FEATURE_AUTHORITY {
            if let Some(features) = &partial.audio_features {
                record.audio_features = features.clone();
            }
        }
    }

    record.genres = union_capped(contributing.iter().map(|(_, p)| &p.genres));
    record.styles = union_capped(contributing.iter().map(|(_, p)| &p.styles));
    record.tags = union_capped(contributing.iter().map(|(_, p)| &p.tags));
    record.credits = merge_credits(contributing.iter().map(|(_, p)| &p.credits));

    record.touch(now);
    record
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn fill_text(slot: &mut Option<String>, candidate: &Option<String>) {
    if slot.is_none() {
        *slot = trimmed(candidate);
    }
}

/// Order-preserving, case-insensitive union capped at [`MAX_TAGS_PER_CATEGORY`].
fn union_capped<'a>(lists: impl Iterator<Item = &'a Vec<String>>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    for value in lists.flatten() {
        if merged.len() == MAX_TAGS_PER_CATEGORY {
            break;
        }
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if seen.insert(value.to_lowercase()) {
            merged.push(value.to_string());
        }
    }

    merged
}

/// Concatenate in priority order, keep the first of each (name, type), cap at
/// [`MAX_CREDITS`].
fn merge_credits<'a>(lists: impl Iterator<Item = &'a Vec<Credit>>) -> Vec<Credit> {
    let mut seen = HashSet::new();
    lists
        .flatten()
        .filter(|credit| !credit.name.trim().is_empty())
        .filter(|credit| seen.insert(credit.dedup_key()))
        .take(MAX_CREDITS)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::isrc;
    use prism_domain::{AudioFeatures, CreditType, LyricsInfo, SourceOutcome};

    fn partial(confidence: f64) -> PartialRecord {
        PartialRecord::with_confidence(confidence)
    }

    fn collection(entries: Vec<(SourceName, SourceOutcome)>) -> Collection {
        Collection {
            outcomes: entries.into_iter().collect(),
            seed: None,
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn single_valued_fields_follow_priority() {
        let mut mb = partial(0.9);
        mb.title = Some("MB Title".into());
        mb.album = Some("   ".into());

        let mut spotify = partial(0.85);
        spotify.title = Some("Spotify Title".into());
        spotify.artist = Some("Spotify Artist".into());
        spotify.album = Some("Spotify Album".into());

        let mut discogs = partial(0.7);
        discogs.album = Some("Discogs Album".into());
        discogs.release_date = Some("1975".into());

        let merged = merge_at(
            &isrc(),
            &collection(vec![
                (SourceName::Discogs, SourceOutcome::Found(discogs)),
                (SourceName::Spotify, SourceOutcome::Found(spotify)),
                (SourceName::MusicBrainz, SourceOutcome::Found(mb)),
            ]),
            fixed_now(),
        );

        assert_eq!(merged.title.as_deref(), Some("MB Title"));
        assert_eq!(merged.artist.as_deref(), Some("Spotify Artist"));
        assert_eq!(merged.album.as_deref(), Some("Spotify Album"));
        assert_eq!(merged.release_date.as_deref(), Some("1975"));
        assert_eq!(
            merged.sources,
            vec![SourceName::MusicBrainz, SourceName::Spotify, SourceName::Discogs]
        );
        assert_eq!(merged.last_updated, Some(fixed_now()));
    }

    #[test]
    fn merge_is_deterministic() {
        let mut mb = partial(0.9);
        mb.title = Some("Song".into());
        mb.tags = vec!["rock".into(), "Pop".into()];
        let mut lastfm = partial(0.75);
        lastfm.tags = vec!["ROCK".into(), "indie".into()];
        lastfm.listeners = Some(10);

        let input = collection(vec![
            (SourceName::MusicBrainz, SourceOutcome::Found(mb)),
            (SourceName::LastFm, SourceOutcome::Found(lastfm)),
            (SourceName::Genius, SourceOutcome::Error("timeout".into())),
        ]);

        let first = merge_at(&isrc(), &input, fixed_now());
        let second = merge_at(&isrc(), &input, fixed_now());
        assert_eq!(first, second);
        assert_eq!(first.tags, vec!["rock", "Pop", "indie"]);
    }

    #[test]
    fn audio_features_only_from_authority() {
        let mut mb = partial(0.9);
        mb.title = Some("Song".into());
        mb.audio_features = Some(AudioFeatures {
            tempo: Some(90.0),
            ..AudioFeatures::default()
        });

        let merged = merge_at(
            &isrc(),
            &collection(vec![(SourceName::MusicBrainz, SourceOutcome::Found(mb))]),
            fixed_now(),
        );
        assert!(merged.audio_features.is_empty());

        let mut spotify = partial(0.85);
        spotify.audio_features = Some(AudioFeatures {
            tempo: Some(120.0),
            energy: Some(0.8),
            ..AudioFeatures::default()
        });
        let merged = merge_at(
            &isrc(),
            &collection(vec![(SourceName::Spotify, SourceOutcome::Found(spotify))]),
            fixed_now(),
        );
        assert_eq!(merged.audio_features.tempo, Some(120.0));
    }

    #[test]
    fn vendor_specific_fields_come_from_their_vendor() {
        let mut spotify = partial(0.85);
        spotify.popularity = Some(70);
        spotify.external_id = Some("sp1".into());
        spotify.external_url = Some("https://open.spotify.com/track/sp1".into());

        let mut youtube = partial(0.7);
        youtube.view_count = Some(1000);
        youtube.popularity = Some(99);
        youtube.external_id = Some("yt1".into());
        youtube.external_url = Some("https://www.youtube.com/watch?v=yt1".into());

        let mut lastfm = partial(0.75);
        lastfm.listeners = Some(5);
        lastfm.play_count = Some(50);
        lastfm.view_count = Some(7);

        let merged = merge_at(
            &isrc(),
            &collection(vec![
                (SourceName::Spotify, SourceOutcome::Found(spotify)),
                (SourceName::YouTube, SourceOutcome::Found(youtube)),
                (SourceName::LastFm, SourceOutcome::Found(lastfm)),
            ]),
            fixed_now(),
        );

        assert_eq!(merged.popularity, Some(70));
        assert_eq!(merged.youtube_views, Some(1000));
        assert_eq!(merged.lastfm_listeners, Some(5));
        assert_eq!(merged.lastfm_playcount, Some(50));
        assert_eq!(merged.external_ids.spotify_id.as_deref(), Some("sp1"));
        assert_eq!(merged.external_ids.youtube_video_id.as_deref(), Some("yt1"));
        assert!(merged.spotify_url.unwrap().contains("spotify"));
        assert!(merged.youtube_url.unwrap().contains("youtube"));
    }

    #[test]
    fn tags_are_capped_per_category() {
        let mut mb = partial(0.9);
        mb.genres = (0..4).map(|i| format!("genre {}", i)).collect();
        let mut discogs = partial(0.7);
        discogs.genres = (2..8).map(|i| format!("Genre {}", i)).collect();

        let merged = merge_at(
            &isrc(),
            &collection(vec![
                (SourceName::MusicBrainz, SourceOutcome::Found(mb)),
                (SourceName::Discogs, SourceOutcome::Found(discogs)),
            ]),
            fixed_now(),
        );

        assert_eq!(
            merged.genres,
            vec!["genre 0", "genre 1", "genre 2", "genre 3", "Genre 4"]
        );
    }

    #[test]
    fn credits_are_deduplicated_and_capped() {
        let mut mb = partial(0.9);
        mb.credits = vec![
            Credit::new("Queen", CreditType::PrimaryArtist, SourceName::MusicBrainz, 0.9),
            Credit::new("Roy Thomas Baker", CreditType::Producer, SourceName::MusicBrainz, 0.9),
        ];
        let mut genius = partial(0.8);
        genius.credits = vec![
            Credit::new("queen", CreditType::PrimaryArtist, SourceName::Genius, 0.9),
            Credit::new("Queen", CreditType::Producer, SourceName::Genius, 0.85),
        ];
        genius.credits.extend((0..30).map(|i| {
            Credit::new(format!("Writer {}", i), CreditType::Writer, SourceName::Genius, 0.85)
        }));

        let merged = merge_at(
            &isrc(),
            &collection(vec![
                (SourceName::Genius, SourceOutcome::Found(genius)),
                (SourceName::MusicBrainz, SourceOutcome::Found(mb)),
            ]),
            fixed_now(),
        );

        assert_eq!(merged.credits.len(), MAX_CREDITS);
        assert_eq!(merged.credits[0].source, SourceName::MusicBrainz);
        assert_eq!(merged.credits[2].name, "Queen");
        assert_eq!(merged.credits[2].credit_type, CreditType::Producer);
        assert_eq!(
            merged
                .credits
                .iter()
                .filter(|c| c.credit_type == CreditType::PrimaryArtist)
                .count(),
            1
        );
    }

    #[test]
    fn lyrics_come_from_first_source_with_lyrics() {
        let mut genius = partial(0.8);
        genius.lyrics = Some(LyricsInfo {
            source: Some(SourceName::Genius),
            song_id: Some("1".into()),
            ..LyricsInfo::default()
        });

        let merged = merge_at(
            &isrc(),
            &collection(vec![(SourceName::Genius, SourceOutcome::Found(genius))]),
            fixed_now(),
        );
        assert!(merged.has_lyrics());
    }

    #[test]
    fn empty_partials_do_not_count_as_sources() {
        let merged = merge_at(
            &isrc(),
            &collection(vec![
                (SourceName::MusicBrainz, SourceOutcome::Found(partial(0.9))),
                (SourceName::Spotify, SourceOutcome::NotFound),
            ]),
            fixed_now(),
        );

        assert!(merged.sources.is_empty());
        assert!(merged.title.is_none());
    }
}
