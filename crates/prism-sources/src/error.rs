// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SourceError>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limit exceeded after retry")]
    RateLimited,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl SourceError {
    /// Classify a transport error, separating timeouts from other failures.
    pub fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            SourceError::Timeout(error.to_string())
        } else {
            SourceError::Http(error)
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::NotFound(_))
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(error: serde_json::Error) -> Self {
        SourceError::InvalidResponse(format!("Failed to parse response: {}", error))
    }
}
