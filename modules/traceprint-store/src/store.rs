//! Read-side queries and user upkeep.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

use traceprint_common::{PersonalIdentity, Source, User};

pub struct Store {
    pool: PgPool,
}

#[derive(FromRow)]
struct IdentityRow {
    id: Uuid,
    user_id: Uuid,
    names: Vec<String>,
    emails: Vec<String>,
    phones: Vec<String>,
    centroid: Option<Vec<f32>>,
    centroid_weight: i32,
    confidence: f32,
    created_at: DateTime<Utc>,
}

impl From<IdentityRow> for PersonalIdentity {
    fn from(row: IdentityRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            names: row.names.into_iter().collect::<BTreeSet<_>>(),
            emails: row.emails.into_iter().collect::<BTreeSet<_>>(),
            phones: row.phones.into_iter().collect::<BTreeSet<_>>(),
            centroid: row.centroid,
            centroid_weight: row.centroid_weight.max(0) as u32,
            confidence: row.confidence,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct VerifiedRow {
    id: Uuid,
    source: String,
    content_hash: String,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert the scanned user's profile row.
    pub async fn ensure_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, full_name, email, phone, reference_photo_url)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                full_name = EXCLUDED.full_name,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                reference_photo_url = EXCLUDED.reference_photo_url
            "#,
        )
        .bind(user.id)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.reference_photo.as_ref().map(|m| m.url.clone()))
        .execute(&self.pool)
        .await
        .context("Failed to upsert user")?;
        Ok(())
    }

    /// All identity clusters for a user, oldest first.
    pub async fn identities_for_user(&self, user_id: Uuid) -> Result<Vec<PersonalIdentity>> {
        let rows: Vec<IdentityRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, names, emails, phones,
                   centroid, centroid_weight, confidence, created_at
            FROM personal_identities
            WHERE user_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch identities")?;

        Ok(rows.into_iter().map(PersonalIdentity::from).collect())
    }

    /// Verified evidence already on record for a user, keyed the way the
    /// transformer's prior-run check expects.
    pub async fn verified_footprints(
        &self,
        user_id: Uuid,
    ) -> Result<HashMap<(Source, String), Uuid>> {
        let rows: Vec<VerifiedRow> = sqlx::query_as(
            r#"
            SELECT id, source, content_hash
            FROM digital_footprints
            WHERE user_id = $1 AND status = 'verified'
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch verified footprints")?;

        let mut prior = HashMap::with_capacity(rows.len());
        for row in rows {
            match Source::from_str(&row.source) {
                Ok(source) => {
                    prior.insert((source, row.content_hash), row.id);
                }
                Err(_) => {
                    warn!(footprint = %row.id, source = %row.source, "Skipping unknown source");
                }
            }
        }
        Ok(prior)
    }
}
