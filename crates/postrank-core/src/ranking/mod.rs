//! ============================================================================
//! Ranking - relevance scoring and best-candidate selection
//! ============================================================================

pub mod commentary;
pub mod schedule;
pub mod scorer;
pub mod selection;

pub use commentary::{CommentaryGenerator, LoggingGenerator};
pub use schedule::{skewed_random, DelayStrategy};
pub use scorer::{current_profile, BoostPolicy, RelevanceScorer, ScoreOutcome};
pub use selection::{SelectionOutcome, SelectionScheduler};
