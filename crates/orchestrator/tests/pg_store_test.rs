//! `PgPhaseStore` against a live database.
//!
//! Run with `PG_USERNAME` (and friends) set:
//! `cargo test -p matchflow-orchestrator --test pg_store_test -- --ignored`

use matchflow_core::config::{load_dotenv, Config};
use matchflow_core::{AssetTypes, Phase};
use matchflow_orchestrator::db::init_pg_pool;
use matchflow_orchestrator::{PgPhaseStore, PhaseStore, ProcessedEvent, StoreError};
use sqlx::PgPool;

async fn pool() -> Option<PgPool> {
    load_dotenv();
    let config = Config::from_env();
    if !config.postgres.is_configured() {
        eprintln!("PG_USERNAME not set, skipping");
        return None;
    }
    Some(init_pg_pool(&config.postgres).await.unwrap())
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

async fn insert_job(pool: &PgPool, job_id: &str, phase: Phase, assets: Option<AssetTypes>) {
    sqlx::query(
        "INSERT INTO jobs (job_id, industry, phase, has_images, has_videos)
         VALUES ($1, 'fashion', $2, $3, $4)",
    )
    .bind(job_id)
    .bind(phase.as_str())
    .bind(assets.map(|a| a.has_images))
    .bind(assets.map(|a| a.has_videos))
    .execute(pool)
    .await
    .unwrap();
}

async fn cleanup(pool: &PgPool, job_id: &str) {
    sqlx::query("DELETE FROM phase_events WHERE job_id = $1")
        .bind(job_id)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("DELETE FROM jobs WHERE job_id = $1")
        .bind(job_id)
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn phase_update_is_compare_and_swap() {
    let Some(pool) = pool().await else { return };
    let job_id = unique("cas");
    insert_job(&pool, &job_id, Phase::FeatureExtraction, Some(AssetTypes::new(true, false))).await;
    let store = PgPhaseStore::new(pool.clone());

    assert!(store
        .update_job_phase(&job_id, Phase::FeatureExtraction, Phase::Matching)
        .await
        .unwrap());
    assert!(!store
        .update_job_phase(&job_id, Phase::FeatureExtraction, Phase::Matching)
        .await
        .unwrap());
    assert_eq!(store.get_job_phase(&job_id).await.unwrap(), Some(Phase::Matching));
    assert!(!store
        .update_job_phase("no-such-job", Phase::Collection, Phase::FeatureExtraction)
        .await
        .unwrap());

    cleanup(&pool, &job_id).await;
}

#[tokio::test]
#[ignore]
async fn ledger_insert_maps_constraint_violations() {
    let Some(pool) = pool().await else { return };
    let job_id = unique("ledger");
    insert_job(&pool, &job_id, Phase::Collection, None).await;
    let store = PgPhaseStore::new(pool.clone());

    let event = ProcessedEvent::new(unique("ev"), &job_id, "image.keypoints.completed");
    store.insert_phase_event(&event).await.unwrap();
    assert!(store
        .has_phase_event(&job_id, "image.keypoints.completed")
        .await
        .unwrap());

    let dup = store.insert_phase_event(&event).await.unwrap_err();
    assert!(matches!(dup, StoreError::UniqueViolation(ref id) if *id == event.event_id));

    let orphan = ProcessedEvent::new(unique("ev"), "no-such-job", "image.keypoints.completed");
    let missing = store.insert_phase_event(&orphan).await.unwrap_err();
    assert!(matches!(missing, StoreError::JobNotFound(ref id) if id == "no-such-job"));

    cleanup(&pool, &job_id).await;
}

#[tokio::test]
#[ignore]
async fn asset_types_are_derived_once_and_persisted() {
    let Some(pool) = pool().await else { return };
    let job_id = unique("assets");
    insert_job(&pool, &job_id, Phase::FeatureExtraction, None).await;
    let store = PgPhaseStore::new(pool.clone());

    let first = store.get_job_asset_types(&job_id).await.unwrap();
    let stored = sqlx::query_as::<_, (Option<bool>, Option<bool>)>(
        "SELECT has_images, has_videos FROM jobs WHERE job_id = $1",
    )
    .bind(&job_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(stored, (Some(first.has_images), Some(first.has_videos)));
    assert_eq!(store.get_job_asset_types(&job_id).await.unwrap(), first);
    assert_eq!(store.get_job_industry(&job_id).await.unwrap(), "fashion");

    cleanup(&pool, &job_id).await;
}
