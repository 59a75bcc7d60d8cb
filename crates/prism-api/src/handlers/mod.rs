// SPDX-License-Identifier: GPL-3.0-or-later
pub mod analysis;
pub mod system;
pub mod tracks;

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use prism_application::AggregationError;
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

pub(crate) fn aggregation_error(error: AggregationError) -> Response {
    match error {
        AggregationError::Validation(_) => {
            error_response(StatusCode::BAD_REQUEST, error.to_string())
        }
        AggregationError::NoSourcesConfigured => {
            error!(target: "api", "aggregation requested with no sources configured");
            error_response(StatusCode::SERVICE_UNAVAILABLE, error.to_string())
        }
    }
}
