//! Transactional load of one run's outcome.
//!
//! Everything a run decided lands in a single transaction. Any failure
//! rolls the whole run back, so a rerun after a crash starts from the
//! previous consistent state. Row ids are minted by the transformer, so
//! loading the same outcome twice inserts nothing new.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;

use traceprint_common::{PipelineError, PipelineResult, User};
use traceprint_engine::TransformOutcome;

/// What one load committed.
#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub run_id: String,
    pub identities_written: usize,
    pub footprints_inserted: usize,
    pub links_inserted: usize,
    pub logs_inserted: usize,
    pub committed_at: DateTime<Utc>,
}

impl LoadSummary {
    pub fn total_records_inserted(&self) -> usize {
        self.footprints_inserted + self.links_inserted + self.logs_inserted
    }
}

impl std::fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "run {}: {} identities, {} footprints, {} links, {} log entries",
            self.run_id,
            self.identities_written,
            self.footprints_inserted,
            self.links_inserted,
            self.logs_inserted,
        )
    }
}

pub struct Loader {
    pool: PgPool,
}

impl Loader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a transformation outcome atomically.
    pub async fn load(&self, user: &User, outcome: &TransformOutcome) -> PipelineResult<LoadSummary> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| persist_err("transaction", &outcome.run_id, e))?;

        let identities_written = self.write_identities(&mut tx, outcome).await?;
        let footprints_inserted = self.write_footprints(&mut tx, outcome).await?;
        let links_inserted = self.write_links(&mut tx, user, outcome).await?;
        let logs_inserted = self.write_logs(&mut tx, outcome).await?;

        tx.commit()
            .await
            .map_err(|e| persist_err("transaction", &outcome.run_id, e))?;

        let summary = LoadSummary {
            run_id: outcome.run_id.clone(),
            identities_written,
            footprints_inserted,
            links_inserted,
            logs_inserted,
            committed_at: Utc::now(),
        };
        info!(run_id = %outcome.run_id, %summary, "Load committed");
        Ok(summary)
    }

    /// Clusters are upserted: an existing cluster absorbed new signals
    /// this run, so its row is replaced wholesale.
    async fn write_identities(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        outcome: &TransformOutcome,
    ) -> PipelineResult<usize> {
        for identity in &outcome.identities {
            sqlx::query(
                r#"
                INSERT INTO personal_identities
                    (id, user_id, names, emails, phones, centroid, centroid_weight, confidence, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (id) DO UPDATE SET
                    names = EXCLUDED.names,
                    emails = EXCLUDED.emails,
                    phones = EXCLUDED.phones,
                    centroid = EXCLUDED.centroid,
                    centroid_weight = EXCLUDED.centroid_weight,
                    confidence = EXCLUDED.confidence
                "#,
            )
            .bind(identity.id)
            .bind(identity.user_id)
            .bind(identity.names.iter().cloned().collect::<Vec<String>>())
            .bind(identity.emails.iter().cloned().collect::<Vec<String>>())
            .bind(identity.phones.iter().cloned().collect::<Vec<String>>())
            .bind(&identity.centroid)
            .bind(identity.centroid_weight as i32)
            .bind(identity.confidence)
            .bind(identity.created_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| persist_err("personal_identity", &identity.id.to_string(), e))?;
        }
        Ok(outcome.identities.len())
    }

    async fn write_footprints(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        outcome: &TransformOutcome,
    ) -> PipelineResult<usize> {
        let mut inserted = 0usize;
        for footprint in &outcome.footprints {
            let result = sqlx::query(
                r#"
                INSERT INTO digital_footprints
                    (id, user_id, identity_id, source, kind, content, content_hash,
                     url, discovered_at, status, confidence)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(footprint.id)
            .bind(footprint.user_id)
            .bind(footprint.identity_id)
            .bind(footprint.source.as_str())
            .bind(footprint.kind.as_str())
            .bind(&footprint.content)
            .bind(&footprint.content_hash)
            .bind(&footprint.url)
            .bind(footprint.discovered_at)
            .bind(footprint.status.as_str())
            .bind(footprint.confidence)
            .execute(&mut **tx)
            .await
            .map_err(|e| persist_err("digital_footprint", &footprint.id.to_string(), e))?;
            inserted += result.rows_affected() as usize;
        }
        Ok(inserted)
    }

    async fn write_links(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: &User,
        outcome: &TransformOutcome,
    ) -> PipelineResult<usize> {
        let mut inserted = 0usize;
        for footprint in &outcome.footprints {
            let result = sqlx::query(
                r#"
                INSERT INTO user_footprints (user_id, footprint_id, confidence)
                VALUES ($1, $2, $3)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(user.id)
            .bind(footprint.id)
            .bind(footprint.confidence)
            .execute(&mut **tx)
            .await
            .map_err(|e| persist_err("user_footprint", &footprint.id.to_string(), e))?;
            inserted += result.rows_affected() as usize;
        }
        Ok(inserted)
    }

    async fn write_logs(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        outcome: &TransformOutcome,
    ) -> PipelineResult<usize> {
        let mut inserted = 0usize;
        for log in &outcome.logs {
            let result = sqlx::query(
                r#"
                INSERT INTO activity_log
                    (id, run_id, footprint_id, action, related_footprint, similarity, at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(log.id)
            .bind(&log.run_id)
            .bind(log.footprint_id)
            .bind(log.action.as_str())
            .bind(log.related_footprint)
            .bind(log.similarity)
            .bind(log.at)
            .execute(&mut **tx)
            .await
            .map_err(|e| persist_err("activity_log", &log.id.to_string(), e))?;
            inserted += result.rows_affected() as usize;
        }
        Ok(inserted)
    }
}

fn persist_err(entity: &'static str, id: &str, err: sqlx::Error) -> PipelineError {
    let detail = match err.as_database_error() {
        Some(db) if db.is_unique_violation() => {
            format!("unique constraint violated: {db}")
        }
        _ => err.to_string(),
    };
    PipelineError::PersistenceConflict {
        entity,
        id: id.to_string(),
        detail,
    }
}
