//! The unified transformer: records in, attributed deduplicated
//! footprints out.
//!
//! Stage order is evidence enrichment, identity resolution, then dedup.
//! Candidates are processed in sorted (discovered_at, content_hash, id)
//! order throughout, so reruns of the same input decide identically.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use traceprint_common::{
    normalize, ActivityLog, DigitalFootprint, ExtractionResult, FileConfig, MediaKind, MediaRef,
    PersonalIdentity, RawRecord, ResolutionConfig, Source, User, VerificationStatus,
};

use crate::dedup::{dedup, MergeDecision, MergeReason};
use crate::evidence::{FaceMatcher, Transcriber};
use crate::resolve::RunContext;
use crate::signals::SignalSet;
use crate::stats::TransformStats;

/// Everything the transformer decided for one run. The loader persists
/// this atomically.
#[derive(Debug, Clone, Serialize)]
pub struct TransformOutcome {
    pub run_id: String,
    /// Surviving footprints, duplicates excluded.
    pub footprints: Vec<DigitalFootprint>,
    /// Full cluster set for the user, existing clusters included.
    pub identities: Vec<PersonalIdentity>,
    pub logs: Vec<ActivityLog>,
    pub merges: Vec<MergeDecision>,
    pub stats: TransformStats,
}

struct Candidate {
    footprint: DigitalFootprint,
    signals: SignalSet,
    media: Vec<MediaRef>,
}

#[derive(Default)]
struct EvidenceCounts {
    faces: usize,
    transcripts: usize,
    failures: usize,
}

pub struct Transformer<F: FaceMatcher, T: Transcriber> {
    face: F,
    transcriber: T,
    resolution: ResolutionConfig,
    evidence_concurrency: usize,
    evidence_timeout: Duration,
}

impl<F: FaceMatcher, T: Transcriber> Transformer<F, T> {
    pub fn new(face: F, transcriber: T, config: &FileConfig) -> Self {
        Self {
            face,
            transcriber,
            resolution: config.resolution.clone(),
            evidence_concurrency: config.pipeline.evidence_concurrency,
            evidence_timeout: Duration::from_secs(config.pipeline.evidence_timeout_secs),
        }
    }

    /// Transform one extraction run. `existing` is the user's persisted
    /// cluster set; `prior` maps verified evidence from earlier runs by
    /// (source, content_hash).
    pub async fn transform(
        &self,
        user: &User,
        extraction: &ExtractionResult,
        existing: Vec<PersonalIdentity>,
        prior: &HashMap<(Source, String), Uuid>,
    ) -> TransformOutcome {
        let run_id = extraction.run_id.clone();
        let mut stats = TransformStats::default();

        let candidates: Vec<Candidate> = extraction
            .records
            .iter()
            .map(|record| self.candidate(user, record))
            .collect();

        // Evidence enrichment fans out across candidates; provider
        // failures degrade that record to text and metadata signals.
        let enriched: Vec<(Candidate, EvidenceCounts)> = stream::iter(candidates)
            .map(|candidate| self.enrich(user, candidate))
            .buffer_unordered(self.evidence_concurrency.max(1))
            .collect()
            .await;

        let mut candidates = Vec::with_capacity(enriched.len());
        for (candidate, counts) in enriched {
            stats.face_embeddings += counts.faces;
            stats.transcripts += counts.transcripts;
            stats.evidence_failures += counts.failures;
            candidates.push(candidate);
        }

        // Same ordering as dedup uses internally, so the demoted statuses
        // land back on the right candidates below.
        candidates.sort_by(|a, b| {
            a.footprint
                .discovered_at
                .cmp(&b.footprint.discovered_at)
                .then_with(|| a.footprint.content_hash.cmp(&b.footprint.content_hash))
                .then_with(|| a.footprint.id.cmp(&b.footprint.id))
        });

        let mut ctx = RunContext::new(existing);
        if ctx.clusters().is_empty() {
            let seed = self.seed_cluster(user).await;
            stats.identities_founded += 1;
            ctx = RunContext::new(vec![seed]);
        }

        for candidate in candidates.iter_mut() {
            if candidate.signals.is_empty() {
                // Orphan: kept as evidence, attributed to no one.
                continue;
            }
            let attribution = ctx.resolve(
                &self.resolution,
                user.id,
                &candidate.signals,
                candidate.footprint.discovered_at,
            );
            candidate.footprint.identity_id = Some(attribution.identity_id);
            candidate.footprint.status = VerificationStatus::Verified;
            if attribution.founded {
                stats.identities_founded += 1;
                candidate.footprint.confidence = 0.5;
            } else {
                stats.identities_matched += 1;
                candidate.footprint.confidence = attribution.score;
            }
        }

        let embeddings: HashMap<Uuid, Vec<f32>> = candidates
            .iter()
            .filter_map(|c| {
                c.signals
                    .embedding
                    .as_ref()
                    .map(|e| (c.footprint.id, e.clone()))
            })
            .collect();
        let mut footprints: Vec<DigitalFootprint> =
            candidates.iter().map(|c| c.footprint.clone()).collect();
        let merges = dedup(&self.resolution, &mut footprints, &embeddings, prior);
        stats.duplicates_rejected = merges.len();
        for (candidate, footprint) in candidates.iter_mut().zip(footprints) {
            candidate.footprint = footprint;
        }

        let mut kept = Vec::new();
        let mut logs = Vec::new();
        let now = Utc::now();
        for candidate in candidates {
            if candidate.footprint.status == VerificationStatus::Rejected {
                continue;
            }
            if candidate.footprint.identity_id.is_none() {
                stats.orphans += 1;
            }
            logs.push(ActivityLog::discovered(
                &run_id,
                candidate.footprint.id,
                now,
            ));
            kept.push(candidate.footprint);
        }
        stats.footprints_created = kept.len();

        for merge in &merges {
            let log = match merge.reason {
                MergeReason::PriorRun => ActivityLog::rejected(
                    &run_id,
                    merge.kept,
                    merge.rejected,
                    merge.similarity,
                    now,
                ),
                _ => ActivityLog::merged(
                    &run_id,
                    merge.kept,
                    merge.rejected,
                    merge.similarity,
                    now,
                ),
            };
            logs.push(log);
        }

        info!(run_id = %run_id, user_id = %user.id, %stats, "Transformation finished");

        TransformOutcome {
            run_id,
            footprints: kept,
            identities: ctx.into_clusters(),
            logs,
            merges,
            stats,
        }
    }

    fn candidate(&self, user: &User, record: &RawRecord) -> Candidate {
        Candidate {
            footprint: DigitalFootprint::from_record(user.id, record),
            signals: SignalSet::harvest(record, user),
            media: record.media.clone(),
        }
    }

    async fn enrich(&self, user: &User, mut candidate: Candidate) -> (Candidate, EvidenceCounts) {
        let mut counts = EvidenceCounts::default();

        for media in &candidate.media {
            match media.kind {
                MediaKind::Image => {
                    if candidate.signals.embedding.is_some() {
                        continue;
                    }
                    match self.embed(media).await {
                        Ok(Some(embedding)) => {
                            candidate.signals.embedding = Some(embedding);
                            counts.faces += 1;
                        }
                        Ok(None) => {}
                        Err(err) => {
                            warn!(url = %media.url, error = %err, "Face embedding failed");
                            counts.failures += 1;
                        }
                    }
                }
                MediaKind::Video | MediaKind::Audio => {
                    if candidate.signals.transcript.is_some() {
                        continue;
                    }
                    match self.transcribe(media).await {
                        Ok(Some(transcript)) => {
                            candidate.signals.scan_text(&transcript, user);
                            candidate.signals.transcript = Some(transcript);
                            counts.transcripts += 1;
                        }
                        Ok(None) => {}
                        Err(err) => {
                            warn!(url = %media.url, error = %err, "Transcription failed");
                            counts.failures += 1;
                        }
                    }
                }
            }
        }

        (candidate, counts)
    }

    async fn embed(&self, media: &MediaRef) -> anyhow::Result<Option<Vec<f32>>> {
        match tokio::time::timeout(self.evidence_timeout, self.face.embed(media)).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!("face embedding timed out for {}", media.url),
        }
    }

    async fn transcribe(&self, media: &MediaRef) -> anyhow::Result<Option<String>> {
        match tokio::time::timeout(self.evidence_timeout, self.transcriber.transcribe(media)).await
        {
            Ok(result) => result,
            Err(_) => anyhow::bail!("transcription timed out for {}", media.url),
        }
    }

    /// First scan for a user: their own profile seeds the first cluster,
    /// so records that mention them attach to it rather than founding a
    /// parallel identity.
    async fn seed_cluster(&self, user: &User) -> PersonalIdentity {
        let mut seed = PersonalIdentity::founded(user.id, Utc::now());
        let name = normalize::normalize_name(&user.full_name);
        if !name.is_empty() {
            seed.names.insert(name);
        }
        let email = normalize::canonical_email(&user.email);
        if !email.is_empty() {
            seed.emails.insert(email);
        }
        if let Some(phone) = user.phone.as_deref().and_then(normalize::e164_phone) {
            seed.phones.insert(phone);
        }
        if let Some(photo) = &user.reference_photo {
            match self.embed(photo).await {
                Ok(Some(embedding)) => {
                    seed.centroid = Some(embedding);
                    seed.centroid_weight = 1;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(url = %photo.url, error = %err, "Reference photo embedding failed");
                }
            }
        }
        seed.confidence = 1.0;
        seed
    }
}
