// SPDX-License-Identifier: GPL-3.0-or-later
pub mod handlers;

use axum::{
    routing::{delete, get, post},
    Json, Router,
};
use handlers::analysis::{
    analyze, analyze_bulk, extract, AnalyzeRequest, AnalyzeResponse, BulkAnalyzeRequest,
    BulkAnalyzeResponse, BulkErrorEntry, ExtractRequest, ExtractResponse, __path_analyze,
    __path_analyze_bulk, __path_extract,
};
use handlers::system::{
    sources, stats, SourceStatus, SourcesResponse, StatsResponse, __path_sources, __path_stats,
};
use handlers::tracks::{
    clear_cache, get_credits, get_lyrics, get_track, search, ClearCacheResponse, CreditsResponse,
    LyricsResponse, SearchHit, SearchResponse, __path_clear_cache, __path_get_credits,
    __path_get_lyrics, __path_get_track, __path_search,
};
use handlers::ErrorResponse;
use prism_application::AppState;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Serialize, utoipa::ToSchema)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
#[allow(dead_code)]
async fn health() -> Json<HealthResponse> {
    health_handler().await
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        analyze,
        analyze_bulk,
        extract,
        get_track,
        get_credits,
        get_lyrics,
        clear_cache,
        search,
        stats,
        sources,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorResponse,
            AnalyzeRequest,
            AnalyzeResponse,
            BulkAnalyzeRequest,
            BulkAnalyzeResponse,
            BulkErrorEntry,
            ExtractRequest,
            ExtractResponse,
            CreditsResponse,
            LyricsResponse,
            ClearCacheResponse,
            SearchHit,
            SearchResponse,
            StatsResponse,
            SourceStatus,
            SourcesResponse,
        )
    ),
    tags(
        (name = "system", description = "Health, statistics and source status"),
        (name = "analysis", description = "Multi-source metadata aggregation"),
        (name = "tracks", description = "Cached track records")
    ),
    info(
        title = "PRISM Analytics API",
        version = "0.1.0",
        description = "ISRC metadata aggregation and confidence scoring",
    )
)]
struct ApiDoc;

pub fn router(state: AppState) -> Router {
    info!(target: "api", "building router");

    let api_v1 = Router::new()
        .route("/analyze", post(analyze))
        .route("/analyze/bulk", post(analyze_bulk))
        .route("/extract", post(extract))
        .route("/track/:isrc", get(get_track))
        .route("/credits/:isrc", get(get_credits))
        .route("/lyrics/:isrc", get(get_lyrics))
        .route("/cache/:isrc", delete(clear_cache))
        .route("/search", get(search))
        .route("/stats", get(stats))
        .route("/sources", get(sources));

    let openapi = ApiDoc::openapi();

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/v1", api_v1)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", openapi))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
