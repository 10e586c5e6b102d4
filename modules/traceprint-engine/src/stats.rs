use serde::Serialize;

/// Counters for one transformation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformStats {
    pub footprints_created: usize,
    pub duplicates_rejected: usize,
    pub identities_founded: usize,
    pub identities_matched: usize,
    pub orphans: usize,
    pub face_embeddings: usize,
    pub transcripts: usize,
    pub evidence_failures: usize,
}

impl std::fmt::Display for TransformStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} footprints ({} duplicates rejected, {} orphans), \
             {} identities founded, {} matched, \
             evidence: {} faces / {} transcripts / {} failures",
            self.footprints_created,
            self.duplicates_rejected,
            self.orphans,
            self.identities_founded,
            self.identities_matched,
            self.face_embeddings,
            self.transcripts,
            self.evidence_failures,
        )
    }
}
