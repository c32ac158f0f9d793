//! Reddit OAuth2 client
//!
//! Holds the bearer token and issues single, unretried requests; retries,
//! pacing and circuit breaking are layered on top by the scraper.

use crate::config::RedditConfig;
use crate::platforms::http::send_json;
use crate::HarvestError;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Tokens are treated as expired this long before Reddit says so
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_valid(&self, now: Instant) -> bool {
        now + EXPIRY_MARGIN < self.expires_at
    }
}

/// Token endpoint response; failures may arrive with HTTP 200 and an `error`
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Debug)]
pub struct RedditClient {
    http: Client,
    config: RedditConfig,
    token: Mutex<Option<AccessToken>>,
}

impl RedditClient {
    pub fn new(http: Client, config: RedditConfig) -> Self {
        Self {
            http,
            config,
            token: Mutex::new(None),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.config.client_id.is_some() && self.config.client_secret.is_some()
    }

    /// Checks for an unexpired bearer token
    pub fn is_auth_valid(&self) -> bool {
        self.token()
            .as_ref()
            .is_some_and(|token| token.is_valid(Instant::now()))
    }

    /// Drops the current token so the next call re-authenticates
    pub fn invalidate(&self) {
        *self.token() = None;
    }

    /// Requests a new access token
    ///
    /// Uses the password grant when a username and password are configured,
    /// the client-credentials grant otherwise.
    pub async fn request_token(&self) -> Result<(), HarvestError> {
        let (client_id, client_secret) = match (&self.config.client_id, &self.config.client_secret) {
            (Some(id), Some(secret)) => (id, secret),
            _ => {
                return Err(auth_error("client-id and client-secret are required"));
            }
        };

        let mut form = vec![("grant_type", "client_credentials")];
        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            form = vec![
                ("grant_type", "password"),
                ("username", username.as_str()),
                ("password", password.as_str()),
            ];
        }

        let request = self
            .http
            .post(&self.config.auth_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&form);

        let response: TokenResponse = match send_json(&self.http, request).await {
            Ok(response) => response,
            Err(HarvestError::Status { status, .. }) if status == 401 || status == 403 => {
                return Err(auth_error("credentials rejected by token endpoint"));
            }
            Err(e) => return Err(e),
        };

        if let Some(error) = response.error {
            return Err(auth_error(&format!("token endpoint returned '{}'", error)));
        }
        let value = response
            .access_token
            .ok_or_else(|| auth_error("token endpoint returned no access_token"))?;
        let lifetime = Duration::from_secs(response.expires_in.unwrap_or(3600));

        *self.token() = Some(AccessToken {
            value,
            expires_at: Instant::now() + lifetime,
        });
        tracing::info!(expires_in = lifetime.as_secs(), "Authenticated with Reddit");
        Ok(())
    }

    /// Issues an authenticated GET against the API root
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, HarvestError> {
        let bearer = self
            .token()
            .as_ref()
            .map(|token| token.value.clone())
            .ok_or_else(|| auth_error("not authenticated"))?;

        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let request = self
            .http
            .get(url)
            .bearer_auth(bearer)
            .query(&[("raw_json", "1")])
            .query(query);

        send_json(&self.http, request).await
    }

    fn token(&self) -> MutexGuard<'_, Option<AccessToken>> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn auth_error(message: &str) -> HarvestError {
    HarvestError::Auth {
        platform: "reddit".to_string(),
        message: message.to_string(),
    }
}
