//! Identity resolution: attribute a record's signals to exactly one
//! identity cluster, or found a new one.
//!
//! Scoring is a weighted mean over whichever similarity channels exist on
//! both sides. A channel absent from either side contributes nothing
//! rather than dragging the score down.

use chrono::{DateTime, Utc};
use strsim::jaro_winkler;
use uuid::Uuid;

use traceprint_common::{PersonalIdentity, ResolutionConfig};

use crate::evidence::cosine_similarity;
use crate::signals::SignalSet;

/// Confidence assigned to a freshly founded cluster. Founding is not a
/// match, so it sits below any attribution score that clears the
/// threshold.
const FOUNDED_CONFIDENCE: f32 = 0.5;

/// Outcome of resolving one record's signals.
#[derive(Debug, Clone, Copy)]
pub struct Attribution {
    pub identity_id: Uuid,
    pub score: f32,
    pub founded: bool,
}

/// Mutable cluster state for one transformation run. Starts from the
/// user's persisted clusters and grows as records resolve.
pub struct RunContext {
    clusters: Vec<PersonalIdentity>,
}

impl RunContext {
    pub fn new(existing: Vec<PersonalIdentity>) -> Self {
        Self { clusters: existing }
    }

    pub fn clusters(&self) -> &[PersonalIdentity] {
        &self.clusters
    }

    pub fn into_clusters(self) -> Vec<PersonalIdentity> {
        self.clusters
    }

    /// Attribute `signals` to the best-scoring cluster at or above the
    /// match threshold, founding a new cluster when none qualifies.
    /// Callers must not pass an empty signal set; those records are
    /// orphans and never reach resolution.
    pub fn resolve(
        &mut self,
        cfg: &ResolutionConfig,
        user_id: Uuid,
        signals: &SignalSet,
        at: DateTime<Utc>,
    ) -> Attribution {
        let mut candidates: Vec<(usize, f32)> = self
            .clusters
            .iter()
            .enumerate()
            .filter_map(|(idx, cluster)| {
                score(cfg, cluster, signals).map(|s| (idx, s))
            })
            .filter(|(_, s)| *s >= cfg.match_threshold)
            .collect();

        if let Some(best) = candidates
            .iter()
            .map(|(_, s)| *s)
            .fold(None::<f32>, |acc, s| Some(acc.map_or(s, |a| a.max(s))))
        {
            // Scores within tie_epsilon of the best are a tie; the most
            // established cluster wins. Never merges clusters.
            candidates.retain(|(_, s)| *s >= best - cfg.tie_epsilon);
            candidates.sort_by(|(a, _), (b, _)| {
                let a = &self.clusters[*a];
                let b = &self.clusters[*b];
                b.confidence
                    .total_cmp(&a.confidence)
                    .then_with(|| a.created_at.cmp(&b.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            });
            let (idx, matched_score) = candidates[0];
            let cluster = &mut self.clusters[idx];
            absorb(cluster, signals);
            cluster.confidence = cluster.confidence.max(matched_score);
            return Attribution {
                identity_id: cluster.id,
                score: matched_score,
                founded: false,
            };
        }

        let mut cluster = PersonalIdentity::founded(user_id, at);
        absorb(&mut cluster, signals);
        cluster.confidence = FOUNDED_CONFIDENCE;
        let id = cluster.id;
        self.clusters.push(cluster);
        Attribution {
            identity_id: id,
            score: 0.0,
            founded: true,
        }
    }

    /// Fold cluster `from` into cluster `into` and drop `from`. An
    /// explicit operator action; resolution never triggers it. Footprints
    /// pointing at `from` must be re-pointed by the caller.
    pub fn merge_clusters(&mut self, into: Uuid, from: Uuid) -> anyhow::Result<Uuid> {
        if into == from {
            anyhow::bail!("cannot merge a cluster into itself");
        }
        let from_idx = self
            .clusters
            .iter()
            .position(|c| c.id == from)
            .ok_or_else(|| anyhow::anyhow!("unknown cluster: {from}"))?;
        let absorbed = self.clusters.remove(from_idx);
        let target = self
            .clusters
            .iter_mut()
            .find(|c| c.id == into)
            .ok_or_else(|| anyhow::anyhow!("unknown cluster: {into}"))?;

        target.names.extend(absorbed.names);
        target.emails.extend(absorbed.emails);
        target.phones.extend(absorbed.phones);
        if let Some(other) = absorbed.centroid {
            merge_centroid(target, &other, absorbed.centroid_weight);
        }
        target.confidence = target.confidence.max(absorbed.confidence);
        target.created_at = target.created_at.min(absorbed.created_at);
        Ok(target.id)
    }
}

/// Weighted-mean similarity between a cluster and a signal set. `None`
/// when no channel exists on both sides.
pub fn score(
    cfg: &ResolutionConfig,
    cluster: &PersonalIdentity,
    signals: &SignalSet,
) -> Option<f32> {
    let mut weighted = 0.0f32;
    let mut weight = 0.0f32;

    if !cluster.names.is_empty() && !signals.names.is_empty() {
        let best = cluster
            .names
            .iter()
            .flat_map(|a| signals.names.iter().map(move |b| jaro_winkler(a, b) as f32))
            .fold(0.0f32, f32::max);
        weighted += cfg.name_weight * best;
        weight += cfg.name_weight;
    }

    if !cluster.emails.is_empty() && !signals.emails.is_empty() {
        let hit = cluster.emails.intersection(&signals.emails).next().is_some();
        weighted += cfg.email_weight * if hit { 1.0 } else { 0.0 };
        weight += cfg.email_weight;
    }

    if !cluster.phones.is_empty() && !signals.phones.is_empty() {
        let hit = cluster.phones.intersection(&signals.phones).next().is_some();
        weighted += cfg.phone_weight * if hit { 1.0 } else { 0.0 };
        weight += cfg.phone_weight;
    }

    if let (Some(centroid), Some(embedding)) = (&cluster.centroid, &signals.embedding) {
        weighted += cfg.face_weight * cosine_similarity(centroid, embedding);
        weight += cfg.face_weight;
    }

    if weight == 0.0 {
        return None;
    }
    Some(weighted / weight)
}

/// Grow a cluster with a record's signals. Signal sets only ever grow;
/// the centroid is a size-weighted running mean.
fn absorb(cluster: &mut PersonalIdentity, signals: &SignalSet) {
    cluster.names.extend(signals.names.iter().cloned());
    cluster.emails.extend(signals.emails.iter().cloned());
    cluster.phones.extend(signals.phones.iter().cloned());
    if let Some(embedding) = &signals.embedding {
        merge_centroid(cluster, embedding, 1);
    }
}

fn merge_centroid(cluster: &mut PersonalIdentity, embedding: &[f32], added_weight: u32) {
    match &mut cluster.centroid {
        Some(centroid) if centroid.len() == embedding.len() => {
            let w = cluster.centroid_weight as f32;
            let aw = added_weight as f32;
            for (c, e) in centroid.iter_mut().zip(embedding) {
                *c = (*c * w + *e * aw) / (w + aw);
            }
            cluster.centroid_weight += added_weight;
        }
        Some(_) => {
            // Dimension mismatch means a model change; keep the existing
            // centroid rather than mixing spaces.
            tracing::warn!(
                cluster = %cluster.id,
                "Embedding dimension mismatch, skipping centroid update"
            );
        }
        None => {
            cluster.centroid = Some(embedding.to_vec());
            cluster.centroid_weight = added_weight;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeSet;
    use traceprint_common::User;

    fn cfg() -> ResolutionConfig {
        ResolutionConfig::default()
    }

    fn named_cluster(user_id: Uuid, name: &str, confidence: f32) -> PersonalIdentity {
        let mut c = PersonalIdentity::founded(user_id, Utc::now());
        c.names.insert(name.to_string());
        c.confidence = confidence;
        c
    }

    fn name_signals(name: &str) -> SignalSet {
        let mut s = SignalSet::default();
        s.names.insert(name.to_string());
        s
    }

    #[test]
    fn exact_email_match_scores_full_on_that_channel() {
        let user_id = Uuid::new_v4();
        let mut cluster = PersonalIdentity::founded(user_id, Utc::now());
        cluster.emails = BTreeSet::from(["rocky@example.com".to_string()]);

        let mut signals = SignalSet::default();
        signals.emails.insert("rocky@example.com".to_string());

        assert_eq!(score(&cfg(), &cluster, &signals), Some(1.0));
    }

    #[test]
    fn channels_missing_on_either_side_do_not_dilute() {
        let user_id = Uuid::new_v4();
        let cluster = named_cluster(user_id, "rocky balboa", 0.9);
        // Name only on both sides; the score is pure name similarity, not
        // dragged down by absent email/phone/face channels.
        let s = score(&cfg(), &cluster, &name_signals("rocky balboa")).unwrap();
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn no_shared_channel_scores_none() {
        let user_id = Uuid::new_v4();
        let cluster = named_cluster(user_id, "rocky balboa", 0.9);
        let mut signals = SignalSet::default();
        signals.emails.insert("rocky@example.com".to_string());
        assert_eq!(score(&cfg(), &cluster, &signals), None);
    }

    #[test]
    fn below_threshold_founds_a_new_cluster() {
        let user_id = Uuid::new_v4();
        let mut ctx = RunContext::new(vec![named_cluster(user_id, "apollo creed", 0.9)]);

        let attribution = ctx.resolve(&cfg(), user_id, &name_signals("rocky balboa"), Utc::now());
        assert!(attribution.founded);
        assert_eq!(ctx.clusters().len(), 2);
    }

    #[test]
    fn ties_break_toward_higher_confidence() {
        let user_id = Uuid::new_v4();
        let strong = named_cluster(user_id, "rocky balboa", 0.95);
        let weak = named_cluster(user_id, "rocky balboa", 0.6);
        let strong_id = strong.id;
        let mut ctx = RunContext::new(vec![weak, strong]);

        let attribution = ctx.resolve(&cfg(), user_id, &name_signals("rocky balboa"), Utc::now());
        assert!(!attribution.founded);
        assert_eq!(attribution.identity_id, strong_id);
    }

    #[test]
    fn ties_at_equal_confidence_break_toward_the_older_cluster() {
        let user_id = Uuid::new_v4();
        let mut older = named_cluster(user_id, "rocky balboa", 0.8);
        older.created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut newer = named_cluster(user_id, "rocky balboa", 0.8);
        newer.created_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let older_id = older.id;
        let mut ctx = RunContext::new(vec![newer, older]);

        let attribution = ctx.resolve(&cfg(), user_id, &name_signals("rocky balboa"), Utc::now());
        assert_eq!(attribution.identity_id, older_id);
    }

    #[test]
    fn face_attribution_goes_to_the_highest_scoring_cluster() {
        let user_id = Uuid::new_v4();
        let mut c = PersonalIdentity::founded(user_id, Utc::now());
        c.centroid = Some(vec![1.0, 0.0]);
        c.centroid_weight = 1;
        let mut d = PersonalIdentity::founded(user_id, Utc::now());
        d.centroid = Some(vec![0.515, 0.857]);
        d.centroid_weight = 1;
        let c_id = c.id;
        let mut ctx = RunContext::new(vec![d, c]);

        // Scores ~0.92 against c and ~0.81 against d; both clear the 0.8
        // threshold, the higher one wins outright.
        let mut signals = SignalSet::default();
        signals.embedding = Some(vec![0.92, 0.3919]);
        let attribution = ctx.resolve(&cfg(), user_id, &signals, Utc::now());
        assert!(!attribution.founded);
        assert_eq!(attribution.identity_id, c_id);
        assert!((attribution.score - 0.92).abs() < 0.01);
    }

    #[test]
    fn centroid_is_a_running_mean() {
        let user_id = Uuid::new_v4();
        let mut cluster = PersonalIdentity::founded(user_id, Utc::now());

        let mut first = SignalSet::default();
        first.embedding = Some(vec![1.0, 0.0]);
        absorb(&mut cluster, &first);

        let mut second = SignalSet::default();
        second.embedding = Some(vec![0.0, 1.0]);
        absorb(&mut cluster, &second);

        assert_eq!(cluster.centroid, Some(vec![0.5, 0.5]));
        assert_eq!(cluster.centroid_weight, 2);
    }

    #[test]
    fn merge_clusters_unions_signals_and_drops_the_absorbed() {
        let user_id = Uuid::new_v4();
        let a = named_cluster(user_id, "rocky balboa", 0.9);
        let b = named_cluster(user_id, "r. balboa", 0.6);
        let (a_id, b_id) = (a.id, b.id);
        let mut ctx = RunContext::new(vec![a, b]);

        let survivor = ctx.merge_clusters(a_id, b_id).unwrap();
        assert_eq!(survivor, a_id);
        assert_eq!(ctx.clusters().len(), 1);
        assert!(ctx.clusters()[0].names.contains("r. balboa"));

        assert!(ctx.merge_clusters(a_id, b_id).is_err());
    }

    #[test]
    fn resolution_never_merges_near_tied_clusters() {
        let user_id = Uuid::new_v4();
        let a = named_cluster(user_id, "rocky balboa", 0.8);
        let b = named_cluster(user_id, "rocky balboa", 0.8);
        let mut ctx = RunContext::new(vec![a, b]);

        ctx.resolve(&cfg(), user_id, &name_signals("rocky balboa"), Utc::now());
        assert_eq!(ctx.clusters().len(), 2);
    }

    #[test]
    fn seed_cluster_from_user_profile() {
        // Covers the first-run path: a cluster carrying only the user's
        // seed identifiers attracts records that mention them.
        let user = User::new("Rocky Balboa", "rocky@example.com");
        let mut seed = PersonalIdentity::founded(user.id, Utc::now());
        seed.names.insert("rocky balboa".to_string());
        seed.emails.insert("rocky@example.com".to_string());
        seed.confidence = 1.0;
        let seed_id = seed.id;
        let mut ctx = RunContext::new(vec![seed]);

        let mut signals = name_signals("rocky balboa");
        signals.emails.insert("rocky@example.com".to_string());
        let attribution = ctx.resolve(&cfg(), user.id, &signals, Utc::now());
        assert_eq!(attribution.identity_id, seed_id);
        assert!(attribution.score > 0.99);
    }
}
