//! Concurrent fan-out across sources for one scanned user.
//!
//! Each source runs under its own timeout. One source failing never stops
//! the others; the run degrades to partial and names the failures. Only
//! when every source fails does extraction error out.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use traceprint_common::{
    normalize, CacheGateway, CacheKey, ExtractionResult, FileConfig, PipelineError,
    PipelineResult, RawRecord, RunStatus, Source, SourceOutcome, User,
};

use crate::feed::SourceFeed;
use crate::records::extract_records;

pub struct Orchestrator<F: SourceFeed> {
    feed: F,
    cache: Arc<dyn CacheGateway>,
    sources: Vec<Source>,
    concurrency: usize,
    source_timeout: Duration,
    extraction_ttl: Duration,
}

impl<F: SourceFeed> Orchestrator<F> {
    pub fn new(feed: F, cache: Arc<dyn CacheGateway>, config: &FileConfig) -> Self {
        Self {
            feed,
            cache,
            sources: Source::ALL.to_vec(),
            concurrency: config.pipeline.source_concurrency,
            source_timeout: Duration::from_secs(config.pipeline.source_timeout_secs),
            extraction_ttl: Duration::from_secs(config.cache.extraction_ttl_secs),
        }
    }

    /// Restrict the run to a subset of sources.
    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }

    /// Run extraction for `user` across every configured source.
    pub async fn extract(&self, user: &User) -> PipelineResult<ExtractionResult> {
        let run_id = Uuid::new_v4().to_string();
        info!(
            user_id = %user.id,
            run_id = %run_id,
            sources = self.sources.len(),
            "Starting extraction"
        );

        let mut per_source: Vec<(Source, SourceOutcome, Vec<RawRecord>)> =
            stream::iter(self.sources.iter().copied())
                .map(|source| self.extract_source(user, source))
                .buffer_unordered(self.concurrency.max(1))
                .collect()
                .await;

        // buffer_unordered yields in completion order; re-sort so downstream
        // stages see a deterministic record order.
        per_source.sort_by_key(|(source, _, _)| *source);

        let failed = per_source
            .iter()
            .filter(|(_, o, _)| o.status == RunStatus::Failed)
            .count();
        if failed == self.sources.len() && !self.sources.is_empty() {
            return Err(PipelineError::AllSourcesFailed {
                attempted: self.sources.len(),
            });
        }

        let status = if failed > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Complete
        };

        let mut records = Vec::new();
        let mut outcomes = BTreeMap::new();
        for (source, outcome, source_records) in per_source {
            records.extend(source_records);
            outcomes.insert(source, outcome);
        }

        info!(
            run_id = %run_id,
            records = records.len(),
            failed_sources = failed,
            %status,
            "Extraction finished"
        );

        Ok(ExtractionResult {
            user_id: user.id,
            run_id,
            records,
            outcomes,
            status,
        })
    }

    async fn extract_source(
        &self,
        user: &User,
        source: Source,
    ) -> (Source, SourceOutcome, Vec<RawRecord>) {
        let started = Instant::now();

        let captured = match tokio::time::timeout(
            self.source_timeout,
            self.feed.capture(source, user),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "timed out after {}s",
                self.source_timeout.as_secs()
            )),
        };
        let payload = match captured {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%source, error = %err, "Source extraction failed");
                return (source, Self::failed_outcome(started, err), Vec::new());
            }
        };

        // Record conversion is memoized by payload hash, so an unchanged
        // capture within the scan window skips re-extraction.
        let payload_hash = normalize::sha256_hex(&payload.to_string());
        let key = CacheKey::new("extraction", user.id, format!("{source}:{payload_hash}"));
        if let Some(cached) = self.cache.get(&key).await {
            if let Ok(records) = serde_json::from_value::<Vec<RawRecord>>(cached) {
                let outcome = SourceOutcome {
                    status: RunStatus::Complete,
                    records: records.len(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    from_cache: true,
                    error: None,
                };
                return (source, outcome, records);
            }
            // Unreadable entries are stale schema; drop and re-extract.
            self.cache.invalidate(&key).await;
        }

        match extract_records(source, &payload, user) {
            Ok(records) => {
                self.cache
                    .set(&key, json!(records), self.extraction_ttl)
                    .await;
                let outcome = SourceOutcome {
                    status: RunStatus::Complete,
                    records: records.len(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    from_cache: false,
                    error: None,
                };
                (source, outcome, records)
            }
            Err(err) => {
                warn!(%source, error = %err, "Source extraction failed");
                (source, Self::failed_outcome(started, err), Vec::new())
            }
        }
    }

    fn failed_outcome(started: Instant, err: anyhow::Error) -> SourceOutcome {
        SourceOutcome {
            status: RunStatus::Failed,
            records: 0,
            elapsed_ms: started.elapsed().as_millis() as u64,
            from_cache: false,
            error: Some(err.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Summary of one extraction run, suitable for caching and reports.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionMetadata {
    pub run_id: String,
    pub status: RunStatus,
    pub sources_attempted: usize,
    pub failed_sources: Vec<Source>,
    pub records: usize,
    pub cache_hits: usize,
}

impl From<&ExtractionResult> for ExtractionMetadata {
    fn from(result: &ExtractionResult) -> Self {
        Self {
            run_id: result.run_id.clone(),
            status: result.status,
            sources_attempted: result.outcomes.len(),
            failed_sources: result.failed_sources(),
            records: result.records.len(),
            cache_hits: result.outcomes.values().filter(|o| o.from_cache).count(),
        }
    }
}

impl std::fmt::Display for ExtractionMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} records from {} sources ({} failed, {} cached) [{}]",
            self.records,
            self.sources_attempted,
            self.failed_sources.len(),
            self.cache_hits,
            self.status
        )
    }
}
