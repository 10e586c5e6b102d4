//! Schema setup. Statements are idempotent so migration runs on every
//! startup.

use anyhow::{Context, Result};
use sqlx::PgPool;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        full_name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT,
        reference_photo_url TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS personal_identities (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id),
        names TEXT[] NOT NULL DEFAULT '{}',
        emails TEXT[] NOT NULL DEFAULT '{}',
        phones TEXT[] NOT NULL DEFAULT '{}',
        centroid REAL[],
        centroid_weight INT NOT NULL DEFAULT 0,
        confidence REAL NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS digital_footprints (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id),
        identity_id UUID REFERENCES personal_identities(id),
        source TEXT NOT NULL,
        kind TEXT NOT NULL,
        content TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        url TEXT,
        discovered_at TIMESTAMPTZ NOT NULL,
        status TEXT NOT NULL,
        confidence REAL NOT NULL DEFAULT 0
    )
    "#,
    // One verified copy of a piece of evidence per user and platform.
    // Rejected and unverified rows stay out of the constraint.
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS uniq_verified_footprint
        ON digital_footprints (user_id, source, content_hash)
        WHERE status = 'verified'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_footprints (
        user_id UUID NOT NULL REFERENCES users(id),
        footprint_id UUID NOT NULL REFERENCES digital_footprints(id),
        confidence REAL NOT NULL DEFAULT 0,
        linked_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (user_id, footprint_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS activity_log (
        id UUID PRIMARY KEY,
        run_id TEXT NOT NULL,
        footprint_id UUID NOT NULL,
        action TEXT NOT NULL,
        related_footprint UUID,
        similarity REAL,
        at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_activity_log_run ON activity_log (run_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS scan_cache (
        key TEXT PRIMARY KEY,
        value JSONB NOT NULL,
        expires_at TIMESTAMPTZ,
        hit_count BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];

pub async fn migrate(pool: &PgPool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("Schema migration failed")?;
    }
    tracing::info!("Schema up to date");
    Ok(())
}
