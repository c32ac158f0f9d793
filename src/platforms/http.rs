//! Shared HTTP plumbing for the platform clients
//!
//! Builds the `reqwest` client and turns raw responses into typed payloads or
//! `HarvestError`s the classifier understands:
//!
//! | Response | Error |
//! |----------|-------|
//! | Timeout | `Timeout` (retryable) |
//! | Connect/transport failure | `Http` (retryable) |
//! | HTTP 429 | `RateLimited` with the `Retry-After` hint |
//! | HTTP 404 | `NotFound` |
//! | Other non-2xx | `Status` |
//! | Undecodable body | `Decode` |

use crate::config::ClientConfig;
use crate::HarvestError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Builds the HTTP client shared by a platform scraper
pub fn build_http_client(config: &ClientConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.timeout())
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Sends `request` and decodes a JSON body into `T`
///
/// A literal `null` body decodes into `T` as usual, so callers expecting
/// absent items should ask for an `Option`.
pub async fn send_json<T: DeserializeOwned>(
    client: &Client,
    request: RequestBuilder,
) -> Result<T, HarvestError> {
    let request = request.build()?;
    let url = request.url().to_string();

    let response = client
        .execute(request)
        .await
        .map_err(|source| transport_error(&url, source))?;
    let response = check_status(&url, response)?;

    response.json::<T>().await.map_err(|source| {
        if source.is_decode() {
            HarvestError::Decode {
                message: source.to_string(),
                url,
            }
        } else {
            transport_error(&url, source)
        }
    })
}

fn transport_error(url: &str, source: reqwest::Error) -> HarvestError {
    if source.is_timeout() {
        HarvestError::Timeout {
            url: url.to_string(),
        }
    } else {
        HarvestError::Http {
            url: url.to_string(),
            source,
        }
    }
}

fn check_status(url: &str, response: Response) -> Result<Response, HarvestError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = url.to_string();
    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => HarvestError::RateLimited {
            retry_after: retry_after(response.headers()),
            url,
        },
        StatusCode::NOT_FOUND => HarvestError::NotFound { url },
        other => HarvestError::Status {
            url,
            status: other.as_u16(),
        },
    })
}

/// Longest back-off an upstream hint may impose
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Reads the upstream back-off hint
///
/// `Retry-After` (seconds) wins; Reddit's `x-ratelimit-reset` is the fallback.
/// Hints are capped at [`MAX_RETRY_AFTER`].
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let seconds = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(|s| {
                Duration::try_from_secs_f64(s)
                    .unwrap_or(MAX_RETRY_AFTER)
                    .min(MAX_RETRY_AFTER)
            })
    };

    seconds(RETRY_AFTER.as_str()).or_else(|| seconds("x-ratelimit-reset"))
}
