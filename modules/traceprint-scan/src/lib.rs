//! End-to-end scan: extract, transform, load, report.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use traceprint_common::{
    normalize, CacheGateway, CacheKey, FileConfig, PipelineError, RunStatus, User,
};
use traceprint_engine::{FaceMatcher, Transcriber, TransformStats, Transformer};
use traceprint_extract::{ExtractionMetadata, Orchestrator, SourceFeed};
use traceprint_store::{LoadSummary, Loader, Store};

/// The full scan wired together. One call per user per run; nothing is
/// shared across runs except the database and cache.
pub struct Pipeline<F: SourceFeed, FM: FaceMatcher, T: Transcriber> {
    orchestrator: Orchestrator<F>,
    transformer: Transformer<FM, T>,
    loader: Loader,
    store: Store,
    cache: Arc<dyn CacheGateway>,
    run_timeout: Duration,
    user_ttl: Duration,
    metadata_ttl: Duration,
}

impl<F: SourceFeed, FM: FaceMatcher, T: Transcriber> Pipeline<F, FM, T> {
    pub fn new(
        orchestrator: Orchestrator<F>,
        transformer: Transformer<FM, T>,
        loader: Loader,
        store: Store,
        cache: Arc<dyn CacheGateway>,
        config: &FileConfig,
    ) -> Self {
        Self {
            orchestrator,
            transformer,
            loader,
            store,
            cache,
            run_timeout: Duration::from_secs(config.pipeline.run_timeout_secs),
            user_ttl: Duration::from_secs(config.cache.user_ttl_secs),
            metadata_ttl: Duration::from_secs(config.cache.metadata_ttl_secs),
        }
    }

    /// Run a scan for one user. Never panics and never returns Err: every
    /// failure mode lands in the report.
    pub async fn run(&self, user: &User) -> ScanReport {
        match tokio::time::timeout(self.run_timeout, self.run_inner(user)).await {
            Ok(Ok(report)) => report,
            Ok(Err(err)) => {
                error!(user_id = %user.id, error = %err, "Scan failed");
                ScanReport::failed(err.to_string())
            }
            Err(_) => {
                let err = PipelineError::Timeout { stage: "scan" };
                error!(user_id = %user.id, error = %err, "Scan timed out");
                ScanReport::timed_out(err.to_string())
            }
        }
    }

    async fn run_inner(&self, user: &User) -> anyhow::Result<ScanReport> {
        self.ensure_user_cached(user).await?;

        let extraction = self.orchestrator.extract(user).await?;
        let extraction_meta = ExtractionMetadata::from(&extraction);
        let meta_key = CacheKey::new("metadata", user.id, extraction.run_id.clone());
        self.cache
            .set(&meta_key, json!(extraction_meta), self.metadata_ttl)
            .await;

        let existing = self.store.identities_for_user(user.id).await?;
        let prior = self.store.verified_footprints(user.id).await?;

        let outcome = self
            .transformer
            .transform(user, &extraction, existing, &prior)
            .await;

        let load = self.loader.load(user, &outcome).await?;

        info!(
            user_id = %user.id,
            run_id = %outcome.run_id,
            status = %extraction.status,
            "Scan complete"
        );

        Ok(ScanReport {
            pipeline_success: true,
            status: extraction.status,
            error: None,
            extraction: Some(extraction_meta),
            transform: Some(outcome.stats),
            load: Some(load),
        })
    }

    /// Upsert the user row, skipping the write when an identical profile
    /// was stored within the user TTL. Keyed by the profile's hash, so any
    /// edit to the profile goes through to the database immediately.
    async fn ensure_user_cached(&self, user: &User) -> anyhow::Result<()> {
        let profile = serde_json::to_value(user)?;
        let key = CacheKey::new("user", user.id, normalize::sha256_hex(&profile.to_string()));
        if self.cache.get(&key).await.is_some() {
            return Ok(());
        }
        self.store.ensure_user(user).await?;
        self.cache.set(&key, profile, self.user_ttl).await;
        Ok(())
    }
}

/// Combined summary of one scan, one section per stage.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub pipeline_success: bool,
    pub status: RunStatus,
    pub error: Option<String>,
    pub extraction: Option<ExtractionMetadata>,
    pub transform: Option<TransformStats>,
    pub load: Option<LoadSummary>,
}

impl ScanReport {
    fn failed(error: String) -> Self {
        Self {
            pipeline_success: false,
            status: RunStatus::Failed,
            error: Some(error),
            extraction: None,
            transform: None,
            load: None,
        }
    }

    /// Timeout cancels outstanding work and reports what little is known
    /// as a partial run, not a hang and not a hard failure.
    fn timed_out(error: String) -> Self {
        Self {
            status: RunStatus::Partial,
            ..Self::failed(error)
        }
    }
}

impl std::fmt::Display for ScanReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "scan {} ({})", if self.pipeline_success { "ok" } else { "failed" }, self.status)?;
        if let Some(error) = &self.error {
            writeln!(f, "  error: {error}")?;
        }
        if let Some(extraction) = &self.extraction {
            writeln!(f, "  extract: {extraction}")?;
        }
        if let Some(transform) = &self.transform {
            writeln!(f, "  transform: {transform}")?;
        }
        if let Some(load) = &self.load {
            writeln!(f, "  load: {load}")?;
        }
        Ok(())
    }
}
