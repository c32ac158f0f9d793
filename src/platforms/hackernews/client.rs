use crate::config::HackerNewsConfig;
use crate::platforms::http::send_json;
use crate::HarvestError;
use reqwest::Client;
use serde::de::DeserializeOwned;

/// Unauthenticated client for the Firebase and Algolia APIs
#[derive(Debug, Clone)]
pub struct HackerNewsClient {
    http: Client,
    base_url: String,
    search_url: String,
}

impl HackerNewsClient {
    pub fn new(http: Client, config: &HackerNewsConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            search_url: config.search_url.trim_end_matches('/').to_string(),
        }
    }

    /// GET `{base}/{path}.json`
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, HarvestError> {
        let url = format!("{}/{}.json", self.base_url, path);
        send_json(&self.http, self.http.get(url)).await
    }

    /// GET `{search}/{endpoint}` with query parameters
    pub async fn search_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, HarvestError> {
        let url = format!("{}/{}", self.search_url, endpoint);
        send_json(&self.http, self.http.get(url).query(query)).await
    }
}
