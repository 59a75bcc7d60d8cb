// SPDX-License-Identifier: GPL-3.0-or-later
use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use prism_application::{AggregateOptions, AppState, BulkFailure};
use prism_domain::{extract_all, AggregateRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::ToSchema;

use super::{aggregation_error, error_response, ErrorResponse};

/// Largest batch accepted by the bulk endpoint.
pub const MAX_BULK_ISRCS: usize = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    pub isrc: String,
    #[serde(default)]
    pub force_refresh: bool,
    /// Defaults to the configured aggregation setting.
    pub include_secondary_sources: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnalyzeResponse {
    pub isrc: String,
    pub status: &'static str,
    pub confidence_score: f64,
    pub data_completeness: f64,
    pub quality_rating: String,
    pub sources: Vec<String>,
    pub processing_time_ms: u64,
    #[schema(value_type = Object)]
    pub metadata: AggregateRecord,
}

impl AnalyzeResponse {
    fn new(record: AggregateRecord, started: Instant) -> Self {
        Self {
            isrc: record.isrc.to_string(),
            status: "success",
            confidence_score: record.confidence_score,
            data_completeness: record.data_completeness,
            quality_rating: record.quality_rating.to_string(),
            sources: record.sources.iter().map(|s| s.as_str().to_string()).collect(),
            processing_time_ms: started.elapsed().as_millis() as u64,
            metadata: record,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkAnalyzeRequest {
    pub isrcs: Vec<String>,
    #[serde(default)]
    pub force_refresh: bool,
    pub include_secondary_sources: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkErrorEntry {
    pub isrc: String,
    pub error: String,
}

impl From<BulkFailure> for BulkErrorEntry {
    fn from(failure: BulkFailure) -> Self {
        Self {
            isrc: failure.identifier,
            error: failure.error,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkAnalyzeResponse {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    #[schema(value_type = Vec<Object>)]
    pub results: Vec<AggregateRecord>,
    pub errors: Vec<BulkErrorEntry>,
    pub processing_time_seconds: f64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExtractRequest {
    pub text: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExtractResponse {
    pub isrcs: Vec<String>,
    pub count: usize,
}

fn options(
    state: &AppState,
    force_refresh: bool,
    include_secondary: Option<bool>,
) -> AggregateOptions {
    let defaults = state.aggregator.default_options();
    AggregateOptions {
        force_refresh,
        include_secondary_sources: include_secondary.unwrap_or(defaults.include_secondary_sources),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Aggregate metadata for one ISRC
#[utoipa::path(
    post,
    path = "/api/v1/analyze",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Aggregated record", body = AnalyzeResponse),
        (status = 400, description = "Invalid ISRC", body = ErrorResponse)
    ),
    tag = "analysis"
)]
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> impl IntoResponse {
    debug!(target: "api", isrc = %request.isrc, force_refresh = request.force_refresh, "analyze requested");
    let started = Instant::now();
    let options = options(&state, request.force_refresh, request.include_secondary_sources);

    match state.aggregator.aggregate(&request.isrc, options).await {
        Ok(record) => (StatusCode::OK, Json(AnalyzeResponse::new(record, started))).into_response(),
        Err(error) => aggregation_error(error),
    }
}

/// Aggregate metadata for up to 100 ISRCs
#[utoipa::path(
    post,
    path = "/api/v1/analyze/bulk",
    request_body = BulkAnalyzeRequest,
    responses(
        (status = 200, description = "Per-ISRC results and errors", body = BulkAnalyzeResponse),
        (status = 400, description = "Empty or oversized batch", body = ErrorResponse)
    ),
    tag = "analysis"
)]
pub async fn analyze_bulk(
    State(state): State<AppState>,
    Json(request): Json<BulkAnalyzeRequest>,
) -> impl IntoResponse {
    if request.isrcs.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No ISRCs provided");
    }
    if request.isrcs.len() > MAX_BULK_ISRCS {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("At most {} ISRCs per request", MAX_BULK_ISRCS),
        );
    }

    info!(target: "api", count = request.isrcs.len(), "bulk analysis requested");
    let started = Instant::now();
    let options = options(&state, request.force_refresh, request.include_secondary_sources);
    let outcome = state.aggregator.aggregate_many(&request.isrcs, options).await;

    let response = BulkAnalyzeResponse {
        total: request.isrcs.len(),
        successful: outcome.successes.len(),
        failed: outcome.failures.len(),
        results: outcome.successes,
        errors: outcome.failures.into_iter().map(BulkErrorEntry::from).collect(),
        processing_time_seconds: started.elapsed().as_secs_f64(),
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// Find every valid ISRC in free text
#[utoipa::path(
    post,
    path = "/api/v1/extract",
    request_body = ExtractRequest,
    responses(
        (status = 200, description = "Normalized, deduplicated ISRCs", body = ExtractResponse)
    ),
    tag = "analysis"
)]
pub async fn extract(Json(request): Json<ExtractRequest>) -> impl IntoResponse {
    let isrcs: Vec<String> = extract_all(&request.text).into_iter().collect();
    Json(ExtractResponse {
        count: isrcs.len(),
        isrcs,
    })
}
