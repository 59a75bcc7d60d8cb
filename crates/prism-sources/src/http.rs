// SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::{Result, SourceError};
use crate::rate_limiter::SlidingWindowRateLimiter;
use prism_domain::SourceName;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

pub const USER_AGENT: &str = concat!(
    "PRISM-Analytics/",
    env!("CARGO_PKG_VERSION"),
    " ( https://precise.digital )"
);

/// Upper bound on a server-provided `Retry-After` wait.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Connection settings shared by every source client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub requests_per_minute: usize,
    pub timeout: Duration,
    /// Wait applied after a 429 that carries no usable `Retry-After` header.
    pub default_retry_after: Duration,
}

impl ClientOptions {
    pub fn new(default_base_url: &str) -> Self {
        Self {
            base_url: default_base_url.trim_end_matches('/').to_string(),
            requests_per_minute: 60,
            timeout: Duration::from_secs(10),
            default_retry_after: Duration::from_secs(1),
        }
    }

    /// Set a custom base URL (useful for testing with mock servers).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the base URL only when one is configured.
    pub fn maybe_base_url(self, url: Option<String>) -> Self {
        match url {
            Some(url) if !url.trim().is_empty() => self.base_url(url),
            _ => self,
        }
    }

    pub fn requests_per_minute(mut self, requests_per_minute: usize) -> Self {
        self.requests_per_minute = requests_per_minute;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn default_retry_after(mut self, wait: Duration) -> Self {
        self.default_retry_after = wait;
        self
    }
}

/// Rate-limited HTTP transport owned by a single source client.
#[derive(Debug, Clone)]
pub struct SourceHttp {
    source: SourceName,
    client: Client,
    rate_limiter: SlidingWindowRateLimiter,
    default_retry_after: Duration,
}

impl SourceHttp {
    pub fn new(source: SourceName, options: &ClientOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            source,
            client,
            rate_limiter: SlidingWindowRateLimiter::per_minute(options.requests_per_minute),
            default_retry_after: options.default_retry_after,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn rate_limiter(&self) -> &SlidingWindowRateLimiter {
        &self.rate_limiter
    }

    /// Send a request through the rate limiter.
    ///
    /// A throttled response (429, or 503 used by some vendors for the same
    /// purpose) is retried exactly once after the server-provided delay.
    /// 404 maps to [`SourceError::NotFound`], any other failure status to
    /// [`SourceError::Api`].
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let retry = request.try_clone();
        let response = self.execute(request).await?;

        if !is_throttled(response.status()) {
            return check_status(response).await;
        }

        let wait = retry_after(&response)
            .unwrap_or(self.default_retry_after)
            .min(MAX_RETRY_AFTER);
        warn!(
            target: "sources",
            source = %self.source,
            status = response.status().as_u16(),
            "rate limited by vendor, retrying in {:?}",
            wait
        );
        sleep(wait).await;

        let Some(retry) = retry else {
            return Err(SourceError::RateLimited);
        };
        let response = self.execute(retry).await?;
        if is_throttled(response.status()) {
            return Err(SourceError::RateLimited);
        }
        check_status(response).await
    }

    /// Send a request and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        let body = response.text().await.map_err(SourceError::from_transport)?;
        trace!(target: "sources", source = %self.source, "response body: {}", body);
        Ok(serde_json::from_str(&body)?)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        self.rate_limiter.acquire().await;
        let response = request.send().await.map_err(SourceError::from_transport)?;
        debug!(
            target: "sources",
            source = %self.source,
            url = %response.url(),
            "response status: {}",
            response.status()
        );
        Ok(response)
    }
}

fn is_throttled(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();

    if status == StatusCode::NOT_FOUND {
        return Err(SourceError::NotFound(response.url().to_string()));
    }

    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(SourceError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response)
}
