//! Duplicate detection across a run's footprints and against prior runs.
//!
//! Candidates are ordered by (discovered_at, content_hash, id) before
//! comparison, so the earliest sighting of a piece of evidence always
//! wins and reruns of the same input make identical decisions.

use std::collections::HashMap;

use serde::Serialize;
use strsim::jaro_winkler;
use uuid::Uuid;

use traceprint_common::{
    normalize, DigitalFootprint, ResolutionConfig, Source, VerificationStatus,
};

use crate::evidence::cosine_similarity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeReason {
    /// Same canonical content hash on the same platform.
    IdenticalContent,
    /// Distinct hashes but content similarity above the duplicate
    /// threshold on the same platform.
    NearDuplicate,
    /// Already verified and persisted by an earlier run.
    PriorRun,
}

/// One duplicate verdict. `kept` survives; `rejected` is demoted.
#[derive(Debug, Clone, Serialize)]
pub struct MergeDecision {
    pub kept: Uuid,
    pub rejected: Uuid,
    pub similarity: f32,
    pub reason: MergeReason,
}

/// Demote duplicates in place and report every decision. `embeddings`
/// holds face embeddings by footprint id for media near-dup checks;
/// `prior` maps already-persisted verified evidence, keyed by
/// (source, content_hash).
pub fn dedup(
    cfg: &ResolutionConfig,
    footprints: &mut [DigitalFootprint],
    embeddings: &HashMap<Uuid, Vec<f32>>,
    prior: &HashMap<(Source, String), Uuid>,
) -> Vec<MergeDecision> {
    footprints.sort_by(|a, b| {
        a.discovered_at
            .cmp(&b.discovered_at)
            .then_with(|| a.content_hash.cmp(&b.content_hash))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut decisions = Vec::new();
    // (source, canonical content, hash, id) of survivors seen so far.
    let mut kept: Vec<(Source, String, String, Uuid)> = Vec::new();

    for footprint in footprints.iter_mut() {
        if let Some(prior_id) = prior.get(&(footprint.source, footprint.content_hash.clone())) {
            footprint.status = VerificationStatus::Rejected;
            decisions.push(MergeDecision {
                kept: *prior_id,
                rejected: footprint.id,
                similarity: 1.0,
                reason: MergeReason::PriorRun,
            });
            continue;
        }

        let canonical = normalize::canonical_content(&footprint.content);
        let duplicate_of = kept
            .iter()
            .filter(|(source, _, _, _)| *source == footprint.source)
            .find_map(|(_, kept_canonical, kept_hash, kept_id)| {
                if *kept_hash == footprint.content_hash {
                    return Some((*kept_id, 1.0, MergeReason::IdenticalContent));
                }
                let mut similarity = jaro_winkler(kept_canonical, &canonical) as f32;
                if let (Some(a), Some(b)) =
                    (embeddings.get(kept_id), embeddings.get(&footprint.id))
                {
                    similarity = similarity.max(cosine_similarity(a, b));
                }
                if similarity >= cfg.duplicate_threshold {
                    return Some((*kept_id, similarity, MergeReason::NearDuplicate));
                }
                None
            });

        match duplicate_of {
            Some((kept_id, similarity, reason)) => {
                footprint.status = VerificationStatus::Rejected;
                decisions.push(MergeDecision {
                    kept: kept_id,
                    rejected: footprint.id,
                    similarity,
                    reason,
                });
            }
            None => {
                kept.push((
                    footprint.source,
                    canonical,
                    footprint.content_hash.clone(),
                    footprint.id,
                ));
            }
        }
    }

    decisions
}
