//! Typed errors for the scan pipeline.
//!
//! Per-unit failures (one source, one candidate's evidence) are caught and
//! recorded in the enclosing result's metadata; they never abort sibling
//! units. Only transaction-level failures at load abort a run's durable
//! effects.

use thiserror::Error;

use crate::types::Source;

/// Errors that can surface from a pipeline stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// One source extractor failed; recoverable, degrades to a partial run.
    /// thiserror reserves a field named `source` for the cause chain, hence
    /// `platform`.
    #[error("source unavailable: {platform}: {detail}")]
    SourceUnavailable { platform: Source, detail: String },

    /// Every configured source failed; there is nothing to transform.
    #[error("all {attempted} sources failed")]
    AllSourcesFailed { attempted: usize },

    /// A face-matcher or transcriber call failed; that candidate degrades
    /// to text/metadata-only evidence.
    #[error("evidence resolution failed for {media_url}: {detail}")]
    EvidenceFailure { media_url: String, detail: String },

    /// A write failed inside the load transaction. The transaction is
    /// rolled back; the failing entity is named for diagnosis.
    #[error("persistence conflict on {entity} {id}: {detail}")]
    PersistenceConflict {
        entity: &'static str,
        id: String,
        detail: String,
    },

    /// A stage exceeded its budget; outstanding work was cancelled.
    #[error("{stage} timed out")]
    Timeout { stage: &'static str },
}

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
