//! Transformation stage: raw records become deduplicated footprints
//! attributed to identity clusters.

pub mod dedup;
pub mod evidence;
pub mod resolve;
pub mod signals;
pub mod stats;
pub mod transformer;

pub use dedup::{MergeDecision, MergeReason};
pub use evidence::{
    cosine_similarity, FaceMatcher, NullFaceMatcher, NullTranscriber, StaticFaceMatcher,
    StaticTranscriber, Transcriber,
};
pub use resolve::RunContext;
pub use signals::SignalSet;
pub use stats::TransformStats;
pub use transformer::{TransformOutcome, Transformer};
