//! Postgres-backed tests. Skipped unless DATABASE_TEST_URL points at a
//! disposable database.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use traceprint_common::{
    normalize, CacheGateway, CacheKey, DigitalFootprint, PersonalIdentity, PipelineError,
    RawRecord, Source, User, VerificationStatus,
};
use traceprint_engine::{TransformOutcome, TransformStats};
use traceprint_store::{migrate, Loader, PgCache, Store};

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    migrate(&pool).await.ok()?;
    Some(pool)
}

fn outcome_for(user: &User, footprints: Vec<DigitalFootprint>) -> TransformOutcome {
    let mut identity = PersonalIdentity::founded(user.id, Utc::now());
    identity.names = BTreeSet::from(["rocky balboa".to_string()]);
    identity.confidence = 1.0;

    TransformOutcome {
        run_id: format!("test-{}", Uuid::new_v4()),
        footprints,
        identities: vec![identity],
        logs: Vec::new(),
        merges: Vec::new(),
        stats: TransformStats::default(),
    }
}

fn verified_footprint(user: &User, content: &str) -> DigitalFootprint {
    let record = RawRecord::new(Source::Facebook, content);
    let mut footprint = DigitalFootprint::from_record(user.id, &record);
    footprint.status = VerificationStatus::Verified;
    footprint
}

#[tokio::test]
async fn loading_the_same_outcome_twice_inserts_nothing_new() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = User::new("Rocky Balboa", "rocky@example.com");
    let store = Store::new(pool.clone());
    store.ensure_user(&user).await.unwrap();

    let outcome = outcome_for(&user, vec![verified_footprint(&user, "hello world")]);
    let loader = Loader::new(pool);

    let first = loader.load(&user, &outcome).await.unwrap();
    assert_eq!(first.footprints_inserted, 1);
    assert_eq!(first.links_inserted, 1);

    let second = loader.load(&user, &outcome).await.unwrap();
    assert_eq!(second.total_records_inserted(), 0);
}

#[tokio::test]
async fn two_verified_copies_of_the_same_evidence_conflict() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = User::new("Rocky Balboa", "rocky@example.com");
    let store = Store::new(pool.clone());
    store.ensure_user(&user).await.unwrap();
    let loader = Loader::new(pool);

    let first = outcome_for(&user, vec![verified_footprint(&user, "title defense")]);
    loader.load(&user, &first).await.unwrap();

    // Distinct row id, same (user, source, content_hash), both verified.
    let second = outcome_for(&user, vec![verified_footprint(&user, "title defense")]);
    let err = loader.load(&user, &second).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::PersistenceConflict { entity: "digital_footprint", .. }
    ));

    // The failed transaction rolled back; only the original evidence rows.
    let prior = store.verified_footprints(user.id).await.unwrap();
    let hash = normalize::content_hash("title defense");
    assert_eq!(prior.len(), 1);
    assert!(prior.contains_key(&(Source::Facebook, hash)));
}

#[tokio::test]
async fn identities_round_trip_through_the_store() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = User::new("Rocky Balboa", "rocky@example.com");
    let store = Store::new(pool.clone());
    store.ensure_user(&user).await.unwrap();

    let mut outcome = outcome_for(&user, Vec::new());
    outcome.identities[0].emails.insert("rocky@example.com".to_string());
    outcome.identities[0].centroid = Some(vec![0.25, 0.75]);
    outcome.identities[0].centroid_weight = 3;
    Loader::new(pool).load(&user, &outcome).await.unwrap();

    let fetched = store.identities_for_user(user.id).await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].id, outcome.identities[0].id);
    assert!(fetched[0].names.contains("rocky balboa"));
    assert!(fetched[0].emails.contains("rocky@example.com"));
    assert_eq!(fetched[0].centroid, Some(vec![0.25, 0.75]));
    assert_eq!(fetched[0].centroid_weight, 3);
}

#[tokio::test]
async fn pg_cache_round_trips_and_expires() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let cache = PgCache::new(pool);
    let key = CacheKey::new("extraction", Uuid::new_v4(), "facebook");

    cache
        .set(&key, json!({"records": 2}), Duration::from_secs(60))
        .await;
    assert_eq!(cache.get(&key).await, Some(json!({"records": 2})));

    cache.invalidate(&key).await;
    assert!(cache.get(&key).await.is_none());

    cache
        .set(&key, json!("stale"), Duration::from_secs(0))
        .await;
    assert!(cache.get(&key).await.is_none());
    assert!(cache.evict_expired().await.unwrap() >= 1);
}
