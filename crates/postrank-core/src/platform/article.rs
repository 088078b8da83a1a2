//! Fetches linked articles and reduces them to body text.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use super::html::{article_request, extract_article};

/// Source of article text for a link attached to a post
#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn article_text(&self, link: &str) -> Result<Option<String>>;
}

/// Fetches over HTTP and applies the per-site selector
pub struct HttpArticleSource {
    client: Client,
}

impl HttpArticleSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("postrank/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArticleSource for HttpArticleSource {
    async fn article_text(&self, link: &str) -> Result<Option<String>> {
        let Some(request) = article_request(link) else {
            debug!("Not an article link: {}", link);
            return Ok(None);
        };

        let response = self
            .client
            .get(request.url.clone())
            .send()
            .await
            .map_err(|e| anyhow!("Failed to fetch article {}: {}", request.url, e))?;

        if !response.status().is_success() {
            warn!("Article fetch returned {} for {}", response.status(), request.url);
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read article body: {}", e))?;

        Ok(extract_article(&body, request.selector))
    }
}

/// Never returns article text
pub struct NoArticles;

#[async_trait]
impl ArticleSource for NoArticles {
    async fn article_text(&self, _link: &str) -> Result<Option<String>> {
        Ok(None)
    }
}
