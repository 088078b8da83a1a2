//! ============================================================================
//! POSTRANK-CORE
//! ============================================================================
//! Ingests the Mastodon public timeline, embeds and ranks posts against an
//! interest profile, and reshapes that profile from operator feedback:
//! - resilient streaming subscriptions with backoff
//! - deduplicated redb post store
//! - rate-limited embedding batches
//! - cosine scoring, daily best-candidate selection
//! ============================================================================

pub mod config;
pub mod db;
pub mod embedding;
pub mod favourites;
pub mod feedback;
pub mod jobs;
pub mod pipeline;
pub mod platform;
pub mod ranking;
pub mod runtime;
pub mod types;
pub mod vector;

// Re-export main types for convenience
pub use config::Config;
pub use db::{EmbeddingCall, InsertOutcome, Post, PostDb, PostStore, StoreStats};
pub use feedback::{parse_feedback, Feedback, FeedbackOutcome, FeedbackProcessor};
pub use runtime::Pipeline;
pub use types::*;
