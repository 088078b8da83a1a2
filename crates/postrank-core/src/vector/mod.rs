//! ============================================================================
//! Vector math - persisted encoding, cosine similarity, interest profiles
//! ============================================================================

pub mod codec;
pub mod profile;
pub mod similarity;

pub use codec::{decode, decode_opt, encode};
pub use profile::{build_profile, build_profile_from_vectors, is_usable, WeightedVector};
pub use similarity::{cosine_similarity, magnitude};
