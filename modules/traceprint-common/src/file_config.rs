use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// TOML-backed configuration loaded from disk. Secrets (DB URL) stay as
/// env vars. Every section falls back to documented defaults, so a config
/// file is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FileConfig {
    pub resolution: ResolutionConfig,
    pub cache: CacheTtlConfig,
    pub pipeline: PipelineConfig,
}

/// Identity-resolution and dedup tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ResolutionConfig {
    /// Minimum combined score for attributing a candidate to an existing
    /// identity cluster. Below it, the candidate founds a new cluster.
    pub match_threshold: f32,
    /// Two clusters scoring within this of each other are a tie, broken by
    /// confidence then creation time. Never triggers a cluster merge.
    pub tie_epsilon: f32,
    /// Similarity above which two footprints on the same platform are the
    /// same evidence. Stricter than match_threshold.
    pub duplicate_threshold: f32,
    pub name_weight: f32,
    pub email_weight: f32,
    pub phone_weight: f32,
    pub face_weight: f32,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.8,
            tie_epsilon: 0.05,
            duplicate_threshold: 0.9,
            name_weight: 0.3,
            email_weight: 0.3,
            phone_weight: 0.2,
            face_weight: 0.2,
        }
    }
}

/// Cache expirations, in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheTtlConfig {
    pub user_ttl_secs: u64,
    pub extraction_ttl_secs: u64,
    pub metadata_ttl_secs: u64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            user_ttl_secs: 3600,
            extraction_ttl_secs: 1800,
            metadata_ttl_secs: 7200,
        }
    }
}

/// Concurrency limits and time budgets.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineConfig {
    pub source_concurrency: usize,
    pub evidence_concurrency: usize,
    pub source_timeout_secs: u64,
    pub evidence_timeout_secs: u64,
    pub run_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_concurrency: 4,
            evidence_concurrency: 8,
            source_timeout_secs: 30,
            evidence_timeout_secs: 20,
            run_timeout_secs: 600,
        }
    }
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}
