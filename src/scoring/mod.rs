pub mod catalog;
pub mod insight;
pub mod key;
pub mod mood;
pub mod similarity;

pub use catalog::AudioFeatures;
pub use key::{key_mode, KeyEstimate};
pub use mood::{composite_scores, CompositeScore};
pub use similarity::{rank, similarity, Candidate, FeatureMap, RankedCandidate, SimilarityResult};
