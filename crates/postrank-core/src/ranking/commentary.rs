//! Seam for whatever reacts to a selected post.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait CommentaryGenerator: Send + Sync {
    /// Produce output for the given topic text
    async fn generate(&self, topic: &str) -> Result<String>;
}

/// Logs the topic and echoes it back
pub struct LoggingGenerator;

#[async_trait]
impl CommentaryGenerator for LoggingGenerator {
    async fn generate(&self, topic: &str) -> Result<String> {
        info!("Selected topic: {}", topic);
        Ok(topic.to_string())
    }
}
