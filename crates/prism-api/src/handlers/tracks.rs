// SPDX-License-Identifier: GPL-3.0-or-later
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use prism_application::{AggregateOptions, AppState};
use prism_domain::{AggregateRecord, Credit, LyricsInfo};
use prism_infrastructure::{SearchField, SearchQuery, TrackSummary};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use utoipa::{IntoParams, ToSchema};

use super::{aggregation_error, error_response, ErrorResponse};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TrackQuery {
    /// Rebuild from the sources instead of reading the cache.
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreditsResponse {
    pub isrc: String,
    #[schema(value_type = Vec<Object>)]
    pub credits: Vec<Credit>,
    pub total: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LyricsResponse {
    pub isrc: String,
    #[schema(value_type = Object)]
    pub lyrics: LyricsInfo,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClearCacheResponse {
    pub status: &'static str,
    pub removed: bool,
    pub message: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Text to look for
    pub q: String,
    /// `title`, `artist`, `album` or `all`
    #[serde(rename = "type")]
    pub field: Option<String>,
    /// Page size, 1 to 100 (default 10)
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchHit {
    pub isrc: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub confidence_score: f64,
}

impl From<TrackSummary> for SearchHit {
    fn from(summary: TrackSummary) -> Self {
        Self {
            isrc: summary.isrc,
            title: summary.title,
            artist: summary.artist,
            album: summary.album,
            confidence_score: summary.confidence_score,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    pub total: u64,
    pub offset: u32,
    pub limit: u32,
    pub results: Vec<SearchHit>,
}

async fn cached_record(
    state: &AppState,
    isrc: &str,
) -> Result<AggregateRecord, axum::response::Response> {
    match state.aggregator.lookup_cached(isrc).await {
        Ok(Some(record)) => Ok(record),
        Ok(None) => Err(error_response(StatusCode::NOT_FOUND, "Track not found")),
        Err(error) => Err(aggregation_error(error)),
    }
}

/// Cached record for an ISRC; aggregates it when nothing is cached or
/// `?refresh=true` is given
#[utoipa::path(
    get,
    path = "/api/v1/track/{isrc}",
    params(
        ("isrc" = String, Path, description = "ISRC, with or without separators"),
        TrackQuery
    ),
    responses(
        (status = 200, description = "Aggregate record as JSON"),
        (status = 400, description = "Invalid ISRC", body = ErrorResponse)
    ),
    tag = "tracks"
)]
pub async fn get_track(
    State(state): State<AppState>,
    Path(isrc): Path<String>,
    Query(query): Query<TrackQuery>,
) -> impl IntoResponse {
    debug!(target: "api", %isrc, refresh = query.refresh, "fetching track");

    if !query.refresh {
        match state.aggregator.lookup_cached(&isrc).await {
            Ok(Some(record)) => return (StatusCode::OK, Json(record)).into_response(),
            Ok(None) => debug!(target: "api", %isrc, "track not cached, aggregating"),
            Err(error) => return aggregation_error(error),
        }
    }

    let options = AggregateOptions {
        force_refresh: query.refresh,
        ..state.aggregator.default_options()
    };
    match state.aggregator.aggregate(&isrc, options).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(error) => aggregation_error(error),
    }
}

/// Merged credits of a cached track
#[utoipa::path(
    get,
    path = "/api/v1/credits/{isrc}",
    params(("isrc" = String, Path, description = "ISRC")),
    responses(
        (status = 200, description = "Credits", body = CreditsResponse),
        (status = 404, description = "No credits cached", body = ErrorResponse)
    ),
    tag = "tracks"
)]
pub async fn get_credits(
    State(state): State<AppState>,
    Path(isrc): Path<String>,
) -> impl IntoResponse {
    let record = match cached_record(&state, &isrc).await {
        Ok(record) => record,
        Err(response) => return response,
    };
    if record.credits.is_empty() {
        return error_response(StatusCode::NOT_FOUND, "No credits found for this ISRC");
    }

    Json(CreditsResponse {
        isrc: record.isrc.to_string(),
        total: record.credits.len(),
        credits: record.credits,
    })
    .into_response()
}

/// Lyrics metadata of a cached track
#[utoipa::path(
    get,
    path = "/api/v1/lyrics/{isrc}",
    params(("isrc" = String, Path, description = "ISRC")),
    responses(
        (status = 200, description = "Lyrics metadata", body = LyricsResponse),
        (status = 404, description = "No lyrics cached", body = ErrorResponse)
    ),
    tag = "tracks"
)]
pub async fn get_lyrics(
    State(state): State<AppState>,
    Path(isrc): Path<String>,
) -> impl IntoResponse {
    let record = match cached_record(&state, &isrc).await {
        Ok(record) => record,
        Err(response) => return response,
    };

    match record.lyrics {
        Some(lyrics) => Json(LyricsResponse {
            isrc: record.isrc.to_string(),
            lyrics,
        })
        .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No lyrics found for this ISRC"),
    }
}

/// Drop a track from the cache and the database
#[utoipa::path(
    delete,
    path = "/api/v1/cache/{isrc}",
    params(("isrc" = String, Path, description = "ISRC")),
    responses(
        (status = 200, description = "Cache cleared", body = ClearCacheResponse),
        (status = 400, description = "Invalid ISRC", body = ErrorResponse)
    ),
    tag = "tracks"
)]
pub async fn clear_cache(
    State(state): State<AppState>,
    Path(isrc): Path<String>,
) -> impl IntoResponse {
    match state.aggregator.invalidate(&isrc).await {
        Ok(removed) => Json(ClearCacheResponse {
            status: "success",
            removed,
            message: format!("Cache cleared for {}", prism_domain::normalize(&isrc)),
        })
        .into_response(),
        Err(error) => aggregation_error(error),
    }
}

/// Search stored tracks by title, artist or album
#[utoipa::path(
    get,
    path = "/api/v1/search",
    params(SearchParams),
    responses(
        (status = 200, description = "Matching tracks", body = SearchResponse),
        (status = 400, description = "Empty query or bad page size", body = ErrorResponse),
        (status = 500, description = "Database unavailable", body = ErrorResponse)
    ),
    tag = "tracks"
)]
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let term = params.q.trim();
    if term.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Search query must not be empty");
    }

    let limit = params.limit.unwrap_or(SearchQuery::DEFAULT_LIMIT);
    if !(1..=SearchQuery::MAX_LIMIT).contains(&limit) {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("limit must be between 1 and {}", SearchQuery::MAX_LIMIT),
        );
    }
    let offset = params.offset.unwrap_or(0);

    let field = params.field.as_deref().map(SearchField::parse).unwrap_or_default();
    let query = SearchQuery::new(term).field(field).page(limit, offset);
    debug!(target: "api", term, ?field, limit, offset, "searching tracks");

    match state.aggregator.search(&query).await {
        Ok(page) => Json(SearchResponse {
            total: page.total,
            offset,
            limit,
            results: page.results.into_iter().map(SearchHit::from).collect(),
        })
        .into_response(),
        Err(err) => {
            error!(target: "api", error = %err, "track search failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to search tracks")
        }
    }
}
