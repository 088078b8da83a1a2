//! ============================================================================
//! Mastodon REST client
//! ============================================================================
//! Bearer-token access to the handful of endpoints the pipeline needs:
//! - fetch / delete a status
//! - boost (with visibility) and unboost
//! - resolve a status from its URL via search
//! - list the account's favourites
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, info};

use super::types::{SearchResults, Status, Visibility};

/// Outbound platform operations. Everything the pipeline does to the
/// platform goes through here so tests can substitute a fake.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn fetch_status(&self, id: &str) -> Result<Status>;

    async fn delete_status(&self, id: &str) -> Result<()>;

    async fn boost(&self, id: &str, visibility: Visibility) -> Result<()>;

    async fn unboost(&self, id: &str) -> Result<()>;

    /// Resolve a status by its public URL
    async fn search_status(&self, url: &str) -> Result<Option<Status>>;

    async fn favourites(&self, limit: u32) -> Result<Vec<Status>>;
}

/// Client for a single Mastodon instance
pub struct MastodonClient {
    client: Client,
    base_url: String,
    access_token: String,
}

impl MastodonClient {
    pub fn new(base_url: &str, access_token: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: Response, action: &str) -> Result<Response> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Mastodon API error while trying to {} ({}): {}", action, status, body));
        }
        Ok(response)
    }
}

#[async_trait]
impl PlatformClient for MastodonClient {
    async fn fetch_status(&self, id: &str) -> Result<Status> {
        debug!("Fetching status {}", id);

        let response = self
            .client
            .get(self.endpoint(&format!("/api/v1/statuses/{}", id)))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to fetch status {}: {}", id, e))?;

        Self::check(response, "fetch status")
            .await?
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse status {}: {}", id, e))
    }

    async fn delete_status(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(&format!("/api/v1/statuses/{}", id)))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to delete status {}: {}", id, e))?;

        Self::check(response, "delete status").await?;
        info!("Deleted status {}", id);
        Ok(())
    }

    async fn boost(&self, id: &str, visibility: Visibility) -> Result<()> {
        let body = serde_json::json!({ "visibility": visibility.as_str() });

        let response = self
            .client
            .post(self.endpoint(&format!("/api/v1/statuses/{}/reblog", id)))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to boost status {}: {}", id, e))?;

        Self::check(response, "boost").await?;
        info!("Boosted status {} ({})", id, visibility.as_str());
        Ok(())
    }

    async fn unboost(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint(&format!("/api/v1/statuses/{}/unreblog", id)))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to unboost status {}: {}", id, e))?;

        Self::check(response, "unboost").await?;
        info!("Unboosted status {}", id);
        Ok(())
    }

    async fn search_status(&self, url: &str) -> Result<Option<Status>> {
        let response = self
            .client
            .get(self.endpoint("/api/v2/search"))
            .bearer_auth(&self.access_token)
            .query(&[("q", url), ("type", "statuses"), ("resolve", "true"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| anyhow!("Failed to search for {}: {}", url, e))?;

        let results: SearchResults = Self::check(response, "search")
            .await?
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse search results: {}", e))?;

        Ok(results.statuses.into_iter().next())
    }

    async fn favourites(&self, limit: u32) -> Result<Vec<Status>> {
        let response = self
            .client
            .get(self.endpoint("/api/v1/favourites"))
            .bearer_auth(&self.access_token)
            .query(&[("limit", limit)])
            .send()
            .await
            .map_err(|e| anyhow!("Failed to list favourites: {}", e))?;

        Self::check(response, "list favourites")
            .await?
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse favourites: {}", e))
    }
}
