//! ============================================================================
//! Core Types for postrank
//! ============================================================================
//! Shared enums and domain error types used across the pipeline.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which streaming subscription an event arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Public timeline: new posts and deletes
    Public,
    /// Direct messages: operator feedback
    Direct,
}

impl StreamKind {
    /// Query value for the streaming endpoint
    pub fn as_query(&self) -> &'static str {
        match self {
            StreamKind::Public => "public",
            StreamKind::Direct => "direct",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

/// Errors from vector encoding and similarity math
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VectorError {
    #[error("Vector dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("Invalid vector component '{0}'")]
    Decode(String),
}

/// Reasons an operator feedback message is rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedbackError {
    #[error("Feedback weight is missing or not a number: '{0}'")]
    InvalidWeight(String),

    #[error("Feedback message does not reply to a post")]
    MissingTarget,
}

/// Errors from the selection delay generator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    #[error("Skewed random requires max > 0 and skew > 0 (got max={max}, skew={skew})")]
    InvalidSkewParameters { max: i64, skew: f64 },
}
