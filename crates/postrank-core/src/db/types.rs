//! ============================================================================
//! Database Types - Serializable records for redb storage
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::VectorError;
use crate::vector;

/// A post accepted from the public stream (or pulled in by feedback/favourites).
/// Keyed by the platform's post id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub platform_id: String,
    pub url: Option<String>,
    /// Author `acct` (user or user@instance)
    pub account: String,
    /// Plain text extracted from the post HTML
    pub text: String,
    /// Text of the linked article, when one could be extracted
    pub article_text: Option<String>,
    /// Embedding in comma-separated form (see `vector::codec`)
    pub embedding: Option<String>,
    pub embedding_model: Option<String>,
    pub score: Option<f64>,
    /// Magnitude of operator negative feedback
    pub negative_weight: Option<f64>,
    /// Operator asked to ignore the linked article
    pub no_url: bool,
    /// Operator favourite; positive profile example
    pub liked: bool,
    pub acted_upon: bool,
    pub acted_at: Option<i64>,
    /// Platform creation time (ms since epoch)
    pub created_at: i64,
    /// Local ingestion time (ms since epoch)
    pub ingested_at: i64,
}

impl Post {
    pub fn new(platform_id: impl Into<String>, account: impl Into<String>, text: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            platform_id: platform_id.into(),
            url: None,
            account: account.into(),
            text: text.into(),
            article_text: None,
            embedding: None,
            embedding_model: None,
            score: None,
            negative_weight: None,
            no_url: false,
            liked: false,
            acted_upon: false,
            acted_at: None,
            created_at: now,
            ingested_at: now,
        }
    }

    /// Text sent to the embedding provider
    pub fn embedding_text(&self) -> String {
        let mut text = self.text.trim().to_string();
        if !self.no_url {
            if let Some(article) = self.article_text.as_deref().map(str::trim) {
                if !article.is_empty() {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(article);
                }
            }
        }
        text
    }

    pub fn has_embeddable_text(&self) -> bool {
        !self.embedding_text().is_empty()
    }

    pub fn vector(&self) -> Result<Option<Vec<f32>>, VectorError> {
        vector::decode_opt(self.embedding.as_deref())
    }

    pub fn set_vector(&mut self, v: &[f32], model: &str) {
        self.embedding = Some(vector::encode(v));
        self.embedding_model = Some(model.to_string());
    }

    /// Drop the vector; a score without a vector is meaningless so it goes too.
    pub fn clear_vector(&mut self) {
        self.embedding = None;
        self.embedding_model = None;
        self.score = None;
    }

    /// Eligible for selection: scored with a finite value, untouched, not a
    /// feedback example.
    pub fn is_candidate(&self) -> bool {
        !self.acted_upon
            && !self.liked
            && self.negative_weight.is_none()
            && self.score.map(f64::is_finite).unwrap_or(false)
    }

    /// Contributes to the interest profile
    pub fn is_weighted(&self) -> bool {
        self.embedding.is_some() && (self.liked || self.negative_weight.is_some())
    }
}

/// One provider invocation, kept for the rolling quota
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingCall {
    pub id: String,
    pub model: String,
    /// ms since epoch
    pub requested_at: i64,
    pub input: String,
}

impl EmbeddingCall {
    pub fn new(model: &str, requested_at: i64, input: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            model: model.to_string(),
            requested_at,
            input,
        }
    }
}

/// Result of an insert that must not duplicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Database statistics summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_posts: usize,
    pub embedded: usize,
    pub scored: usize,
    pub acted_upon: usize,
    pub liked: usize,
    pub negative: usize,
    pub embedding_calls: usize,
    pub calls_by_model: HashMap<String, usize>,
}
