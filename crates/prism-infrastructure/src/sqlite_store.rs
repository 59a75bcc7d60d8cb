// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use prism_domain::{
    AggregateRecord, AudioFeatures, Credit, CreditType, ExternalIds, Isrc, LyricsInfo,
    QualityRating, SourceName,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::store::{RecordStore, SearchPage, SearchQuery, StoreStats, TrackSummary};

const UPSERT_TRACK: &str = r#"
    INSERT INTO tracks (
        isrc, title, artist, album, duration_ms, release_date,
        musicbrainz_recording_id, spotify_id, youtube_video_id, genius_song_id,
        lastfm_url, discogs_release_id,
        tempo, musical_key, mode, time_signature, energy, danceability, valence,
        loudness, speechiness, acousticness, instrumentalness, liveness,
        popularity, youtube_views, lastfm_listeners, lastfm_playcount,
        spotify_url, youtube_url,
        genres, styles, tags, sources,
        confidence_score, data_completeness, quality_rating, last_updated
    ) VALUES (
        ?, ?, ?, ?, ?, ?,
        ?, ?, ?, ?,
        ?, ?,
        ?, ?, ?, ?, ?, ?, ?,
        ?, ?, ?, ?, ?,
        ?, ?, ?, ?,
        ?, ?,
        ?, ?, ?, ?,
        ?, ?, ?, ?
    )
    ON CONFLICT(isrc) DO UPDATE SET
        title = excluded.title,
        artist = excluded.artist,
        album = excluded.album,
        duration_ms = excluded.duration_ms,
        release_date = excluded.release_date,
        musicbrainz_recording_id = excluded.musicbrainz_recording_id,
        spotify_id = excluded.spotify_id,
        youtube_video_id = excluded.youtube_video_id,
        genius_song_id = excluded.genius_song_id,
        lastfm_url = excluded.lastfm_url,
        discogs_release_id = excluded.discogs_release_id,
        tempo = excluded.tempo,
        musical_key = excluded.musical_key,
        mode = excluded.mode,
        time_signature = excluded.time_signature,
        energy = excluded.energy,
        danceability = excluded.danceability,
        valence = excluded.valence,
        loudness = excluded.loudness,
        speechiness = excluded.speechiness,
        acousticness = excluded.acousticness,
        instrumentalness = excluded.instrumentalness,
        liveness = excluded.liveness,
        popularity = excluded.popularity,
        youtube_views = excluded.youtube_views,
        lastfm_listeners = excluded.lastfm_listeners,
        lastfm_playcount = excluded.lastfm_playcount,
        spotify_url = excluded.spotify_url,
        youtube_url = excluded.youtube_url,
        genres = excluded.genres,
        styles = excluded.styles,
        tags = excluded.tags,
        sources = excluded.sources,
        confidence_score = excluded.confidence_score,
        data_completeness = excluded.data_completeness,
        quality_rating = excluded.quality_rating,
        last_updated = excluded.last_updated
"#;

/// SQLx-backed record store over the `tracks`, `track_credits` and
/// `track_lyrics` tables.
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_credits(&self, isrc: &Isrc) -> Result<Vec<Credit>> {
        let rows = sqlx::query(
            "SELECT person_name, credit_type, role, source, confidence FROM track_credits WHERE isrc = ? ORDER BY position",
        )
        .bind(isrc.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_credit).collect()
    }

    async fn load_lyrics(&self, isrc: &Isrc) -> Result<Option<LyricsInfo>> {
        let row = sqlx::query("SELECT * FROM track_lyrics WHERE isrc = ? LIMIT 1")
            .bind(isrc.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_lyrics).transpose()
    }
}

#[async_trait::async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, isrc: &Isrc) -> Result<Option<AggregateRecord>> {
        debug!(target: "repository", %isrc, "fetching track by isrc");
        let row = sqlx::query("SELECT * FROM tracks WHERE isrc = ? LIMIT 1")
            .bind(isrc.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut record = row_to_record(&row)?;
        record.credits = self.load_credits(isrc).await?;
        record.lyrics = self.load_lyrics(isrc).await?;
        Ok(Some(record))
    }

    async fn put(&self, record: &AggregateRecord) -> Result<()> {
        debug!(target: "repository", isrc = %record.isrc, "upserting track");
        let features = &record.audio_features;
        let ids = &record.external_ids;

        let mut tx = self.pool.begin().await?;

        sqlx::query(UPSERT_TRACK)
            .bind(record.isrc.as_str())
            .bind(record.title.clone())
            .bind(record.artist.clone())
            .bind(record.album.clone())
            .bind(to_i64(record.duration_ms))
            .bind(record.release_date.clone())
            .bind(ids.musicbrainz_recording_id.clone())
            .bind(ids.spotify_id.clone())
            .bind(ids.youtube_video_id.clone())
            .bind(ids.genius_song_id.clone())
            .bind(ids.lastfm_url.clone())
            .bind(ids.discogs_release_id.clone())
            .bind(features.tempo)
            .bind(features.key)
            .bind(features.mode)
            .bind(features.time_signature)
            .bind(features.energy)
            .bind(features.danceability)
            .bind(features.valence)
            .bind(features.loudness)
            .bind(features.speechiness)
            .bind(features.acousticness)
            .bind(features.instrumentalness)
            .bind(features.liveness)
            .bind(record.popularity.map(i64::from))
            .bind(to_i64(record.youtube_views))
            .bind(to_i64(record.lastfm_listeners))
            .bind(to_i64(record.lastfm_playcount))
            .bind(record.spotify_url.clone())
            .bind(record.youtube_url.clone())
            .bind(serde_json::to_string(&record.genres)?)
            .bind(serde_json::to_string(&record.styles)?)
            .bind(serde_json::to_string(&record.tags)?)
            .bind(serde_json::to_string(&record.sources)?)
            .bind(record.confidence_score)
            .bind(record.data_completeness)
            .bind(record.quality_rating.as_str())
            .bind(record.last_updated.map(|dt| dt.to_rfc3339()))
            .execute(&mut *tx)
            .await?;

        // Credits are replaced wholesale on every upsert.
        sqlx::query("DELETE FROM track_credits WHERE isrc = ?")
            .bind(record.isrc.as_str())
            .execute(&mut *tx)
            .await?;

        for (position, credit) in record.credits.iter().enumerate() {
            sqlx::query(
                "INSERT INTO track_credits (isrc, position, person_name, credit_type, role, source, confidence) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(record.isrc.as_str())
            .bind(position as i64)
            .bind(credit.name.as_str())
            .bind(credit.credit_type.as_str())
            .bind(credit.role.clone())
            .bind(credit.source.as_str())
            .bind(credit.confidence)
            .execute(&mut *tx)
            .await?;
        }

        match &record.lyrics {
            Some(lyrics) => {
                sqlx::query(
                    r#"
                    INSERT OR REPLACE INTO track_lyrics (
                        isrc, source, song_id, url, language, explicit, lyrics_state, page_views
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(record.isrc.as_str())
                .bind(lyrics.source.map(|source| source.as_str()))
                .bind(lyrics.song_id.clone())
                .bind(lyrics.url.clone())
                .bind(lyrics.language.clone())
                .bind(lyrics.explicit)
                .bind(lyrics.lyrics_state.clone())
                .bind(to_i64(lyrics.page_views))
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM track_lyrics WHERE isrc = ?")
                    .bind(record.isrc.as_str())
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, isrc: &Isrc) -> Result<bool> {
        debug!(target: "repository", %isrc, "deleting track");
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM track_credits WHERE isrc = ?")
            .bind(isrc.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM track_lyrics WHERE isrc = ?")
            .bind(isrc.as_str())
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM tracks WHERE isrc = ?")
            .bind(isrc.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(removed > 0)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let totals = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(AVG(confidence_score), 0.0) AS average_confidence,
                COALESCE(AVG(data_completeness), 0.0) AS average_completeness,
                COUNT(spotify_id) AS with_spotify,
                COUNT(youtube_video_id) AS with_youtube,
                COUNT(musicbrainz_recording_id) AS with_musicbrainz
            FROM tracks
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let with_lyrics: i64 = sqlx::query("SELECT COUNT(*) AS total FROM track_lyrics")
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let mut stats = StoreStats {
            total_tracks: count(&totals, "total")?,
            average_confidence: round2(totals.try_get("average_confidence")?),
            average_completeness: round2(totals.try_get("average_completeness")?),
            with_spotify: count(&totals, "with_spotify")?,
            with_youtube: count(&totals, "with_youtube")?,
            with_musicbrainz: count(&totals, "with_musicbrainz")?,
            with_lyrics: with_lyrics.max(0) as u64,
            ..StoreStats::default()
        };

        let rows = sqlx::query(
            "SELECT quality_rating, COUNT(*) AS total FROM tracks GROUP BY quality_rating",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            let rating: String = row.try_get("quality_rating")?;
            stats.by_rating.insert(rating, count(&row, "total")?);
        }

        Ok(stats)
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        debug!(
            target: "repository",
            term = %query.term,
            field = ?query.field,
            limit = query.limit,
            offset = query.offset,
            "searching tracks"
        );

        let pattern = format!("%{}%", escape_like(&query.term));
        let filter = query
            .field
            .columns()
            .iter()
            .map(|column| format!("{} LIKE ? ESCAPE '\\'", column))
            .collect::<Vec<_>>()
            .join(" OR ");

        let count_sql = format!("SELECT COUNT(*) AS total FROM tracks WHERE {}", filter);
        let mut count_query = sqlx::query(&count_sql);
        for _ in query.field.columns() {
            count_query = count_query.bind(pattern.as_str());
        }
        let total = count(&count_query.fetch_one(&self.pool).await?, "total")?;

        let page_sql = format!(
            "SELECT isrc, title, artist, album, confidence_score FROM tracks WHERE {} \
             ORDER BY confidence_score DESC, isrc LIMIT ? OFFSET ?",
            filter
        );
        let mut page_query = sqlx::query(&page_sql);
        for _ in query.field.columns() {
            page_query = page_query.bind(pattern.as_str());
        }
        let rows = page_query
            .bind(i64::from(query.limit))
            .bind(i64::from(query.offset))
            .fetch_all(&self.pool)
            .await?;

        let results = rows
            .iter()
            .map(|row| -> Result<TrackSummary> {
                Ok(TrackSummary {
                    isrc: row.try_get("isrc")?,
                    title: row.try_get("title")?,
                    artist: row.try_get("artist")?,
                    album: row.try_get("album")?,
                    confidence_score: row.try_get("confidence_score")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SearchPage { total, results })
    }
}

fn count(row: &SqliteRow, column: &str) -> Result<u64> {
    let value: i64 = row.try_get(column)?;
    Ok(value.max(0) as u64)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Escape LIKE wildcards so the term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn to_i64(value: Option<u64>) -> Option<i64> {
    value.and_then(|v| i64::try_from(v).ok())
}

fn to_u64(value: Option<i64>) -> Option<u64> {
    value.and_then(|v| u64::try_from(v).ok())
}

fn parse_dt(s: String) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // SQLite CURRENT_TIMESTAMP format
    let ndt = NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")?;
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
}

fn parse_json_list<T: serde::de::DeserializeOwned>(
    row: &SqliteRow,
    column: &str,
) -> Result<Vec<T>> {
    let raw: String = row.try_get(column)?;
    Ok(serde_json::from_str(&raw)?)
}

fn parse_source(raw: &str) -> Result<SourceName> {
    SourceName::parse(raw).ok_or_else(|| anyhow!("unknown source: {}", raw))
}

fn row_to_record(row: &SqliteRow) -> Result<AggregateRecord> {
    let isrc_str: String = row.try_get("isrc")?;
    let isrc = Isrc::parse(&isrc_str)?;

    let rating_str: String = row.try_get("quality_rating")?;
    let quality_rating = QualityRating::parse(&rating_str)
        .ok_or_else(|| anyhow!("unknown quality rating: {}", rating_str))?;

    let last_updated: Option<String> = row.try_get("last_updated")?;
    let popularity: Option<i64> = row.try_get("popularity")?;

    let sources: Vec<String> = parse_json_list(row, "sources")?;
    let sources = sources
        .iter()
        .map(|source| parse_source(source))
        .collect::<Result<Vec<_>>>()?;

    Ok(AggregateRecord {
        isrc,
        title: row.try_get("title")?,
        artist: row.try_get("artist")?,
        album: row.try_get("album")?,
        duration_ms: to_u64(row.try_get("duration_ms")?),
        release_date: row.try_get("release_date")?,
        external_ids: ExternalIds {
            musicbrainz_recording_id: row.try_get("musicbrainz_recording_id")?,
            spotify_id: row.try_get("spotify_id")?,
            youtube_video_id: row.try_get("youtube_video_id")?,
            genius_song_id: row.try_get("genius_song_id")?,
            lastfm_url: row.try_get("lastfm_url")?,
            discogs_release_id: row.try_get("discogs_release_id")?,
        },
        audio_features: AudioFeatures {
            tempo: row.try_get("tempo")?,
            key: row.try_get("musical_key")?,
            mode: row.try_get("mode")?,
            time_signature: row.try_get("time_signature")?,
            energy: row.try_get("energy")?,
            danceability: row.try_get("danceability")?,
            valence: row.try_get("valence")?,
            loudness: row.try_get("loudness")?,
            speechiness: row.try_get("speechiness")?,
            acousticness: row.try_get("acousticness")?,
            instrumentalness: row.try_get("instrumentalness")?,
            liveness: row.try_get("liveness")?,
        },
        popularity: popularity.and_then(|p| u32::try_from(p).ok()),
        youtube_views: to_u64(row.try_get("youtube_views")?),
        lastfm_listeners: to_u64(row.try_get("lastfm_listeners")?),
        lastfm_playcount: to_u64(row.try_get("lastfm_playcount")?),
        spotify_url: row.try_get("spotify_url")?,
        youtube_url: row.try_get("youtube_url")?,
        genres: parse_json_list(row, "genres")?,
        styles: parse_json_list(row, "styles")?,
        tags: parse_json_list(row, "tags")?,
        credits: Vec::new(),
        lyrics: None,
        sources,
        confidence_score: row.try_get("confidence_score")?,
        data_completeness: row.try_get("data_completeness")?,
        quality_rating,
        last_updated: last_updated.map(parse_dt).transpose()?,
    })
}

fn row_to_credit(row: &SqliteRow) -> Result<Credit> {
    let name: String = row.try_get("person_name")?;
    let credit_type: String = row.try_get("credit_type")?;
    let role: Option<String> = row.try_get("role")?;
    let source: String = row.try_get("source")?;
    let confidence: f64 = row.try_get("confidence")?;

    let credit = Credit::new(
        name,
        CreditType::parse(&credit_type),
        parse_source(&source)?,
        confidence,
    );
    Ok(match role {
        Some(role) => credit.with_role(role),
        None => credit,
    })
}

fn row_to_lyrics(row: &SqliteRow) -> Result<LyricsInfo> {
    let source: Option<String> = row.try_get("source")?;
    let page_views: Option<i64> = row.try_get("page_views")?;

    Ok(LyricsInfo {
        source: source.as_deref().map(parse_source).transpose()?,
        song_id: row.try_get("song_id")?,
        url: row.try_get("url")?,
        language: row.try_get("language")?,
        explicit: row.try_get("explicit")?,
        lyrics_state: row.try_get("lyrics_state")?,
        page_views: to_u64(page_views),
    })
}
