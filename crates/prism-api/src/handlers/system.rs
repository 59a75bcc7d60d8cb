// SPDX-License-Identifier: GPL-3.0-or-later
use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use prism_application::AppState;
use prism_infrastructure::StoreStats;
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use super::{error_response, ErrorResponse};

#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub total_tracks: u64,
    pub tracks_with_spotify: u64,
    pub tracks_with_youtube: u64,
    pub tracks_with_musicbrainz: u64,
    pub tracks_with_lyrics: u64,
    pub average_confidence: f64,
    pub average_completeness: f64,
    pub by_quality_rating: BTreeMap<String, u64>,
    pub generated_at: String,
}

impl From<StoreStats> for StatsResponse {
    fn from(stats: StoreStats) -> Self {
        Self {
            total_tracks: stats.total_tracks,
            tracks_with_spotify: stats.with_spotify,
            tracks_with_youtube: stats.with_youtube,
            tracks_with_musicbrainz: stats.with_musicbrainz,
            tracks_with_lyrics: stats.with_lyrics,
            average_confidence: stats.average_confidence,
            average_completeness: stats.average_completeness,
            by_quality_rating: stats.by_rating,
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SourceStatus {
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SourcesResponse {
    pub sources: Vec<SourceStatus>,
}

/// Stored-record statistics
#[utoipa::path(
    get,
    path = "/api/v1/stats",
    responses(
        (status = 200, description = "Database statistics", body = StatsResponse),
        (status = 500, description = "Database unavailable", body = ErrorResponse)
    ),
    tag = "system"
)]
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.aggregator.stats().await {
        Ok(stats) => Json(StatsResponse::from(stats)).into_response(),
        Err(err) => {
            error!(target: "api", error = %err, "failed to read statistics");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read statistics")
        }
    }
}

/// Configured metadata sources
#[utoipa::path(
    get,
    path = "/api/v1/sources",
    responses(
        (status = 200, description = "Configured sources and their kind", body = SourcesResponse)
    ),
    tag = "system"
)]
pub async fn sources(State(state): State<AppState>) -> impl IntoResponse {
    let sources = state
        .aggregator
        .source_status()
        .into_iter()
        .map(|(name, kind)| SourceStatus {
            name: name.as_str().to_string(),
            kind: format!("{:?}", kind).to_lowercase(),
        })
        .collect();
    Json(SourcesResponse { sources })
}
