//! Media evidence providers.
//!
//! Face embeddings and audio transcripts come from external models behind
//! these traits. A provider failure degrades that record to text and
//! metadata signals only; it never aborts the run.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};
use async_trait::async_trait;
use traceprint_common::MediaRef;

#[async_trait]
pub trait FaceMatcher: Send + Sync {
    /// Embed the face found in an image. `None` when no face is detected.
    async fn embed(&self, media: &MediaRef) -> Result<Option<Vec<f32>>>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe speech from an audio or video item. `None` when there is
    /// no speech to transcribe.
    async fn transcribe(&self, media: &MediaRef) -> Result<Option<String>>;
}

/// Cosine similarity clamped to [0, 1], so it composes with the other
/// similarity channels. Zero for mismatched or empty vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Null providers
// ---------------------------------------------------------------------------

/// Face matcher for deployments without a face model. Never embeds.
pub struct NullFaceMatcher;

#[async_trait]
impl FaceMatcher for NullFaceMatcher {
    async fn embed(&self, _media: &MediaRef) -> Result<Option<Vec<f32>>> {
        Ok(None)
    }
}

/// Transcriber for deployments without a speech model. Never transcribes.
pub struct NullTranscriber;

#[async_trait]
impl Transcriber for NullTranscriber {
    async fn transcribe(&self, _media: &MediaRef) -> Result<Option<String>> {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Canned providers for tests
// ---------------------------------------------------------------------------

/// Face matcher backed by a URL-to-embedding map.
#[derive(Default)]
pub struct StaticFaceMatcher {
    embeddings: HashMap<String, Vec<f32>>,
    failing: HashSet<String>,
}

impl StaticFaceMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, url: impl Into<String>, embedding: Vec<f32>) -> Self {
        self.embeddings.insert(url.into(), embedding);
        self
    }

    pub fn failing(mut self, url: impl Into<String>) -> Self {
        self.failing.insert(url.into());
        self
    }
}

#[async_trait]
impl FaceMatcher for StaticFaceMatcher {
    async fn embed(&self, media: &MediaRef) -> Result<Option<Vec<f32>>> {
        if self.failing.contains(&media.url) {
            bail!("face model unavailable for {}", media.url);
        }
        Ok(self.embeddings.get(&media.url).cloned())
    }
}

/// Transcriber backed by a URL-to-transcript map.
#[derive(Default)]
pub struct StaticTranscriber {
    transcripts: HashMap<String, String>,
    failing: HashSet<String>,
}

impl StaticTranscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, url: impl Into<String>, transcript: impl Into<String>) -> Self {
        self.transcripts.insert(url.into(), transcript.into());
        self
    }

    pub fn failing(mut self, url: impl Into<String>) -> Self {
        self.failing.insert(url.into());
        self
    }
}

#[async_trait]
impl Transcriber for StaticTranscriber {
    async fn transcribe(&self, media: &MediaRef) -> Result<Option<String>> {
        if self.failing.contains(&media.url) {
            bail!("transcription failed for {}", media.url);
        }
        Ok(self.transcripts.get(&media.url).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, 0.5, 0.1];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_clamps_negative_alignment_to_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
    }

    #[test]
    fn cosine_of_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
