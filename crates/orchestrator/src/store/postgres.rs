//! PostgreSQL implementation of [`PhaseStore`].

use async_trait::async_trait;
use matchflow_core::{AssetTypes, Phase};
use sqlx::PgPool;
use tracing::{debug, error, info};

use super::{PhaseStore, ProcessedEvent};
use crate::error::StoreError;

/// Collector-owned tables the asset flags are derived from.
const IMAGE_TABLE: &str = "product_images";
const VIDEO_TABLE: &str = "videos";

pub struct PgPhaseStore {
    pool: PgPool,
}

impl PgPhaseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT to_regclass($1) IS NOT NULL")
            .bind(table)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Whether `table` has at least one row for the job. A missing table counts as none.
    async fn job_has_rows(&self, table: &'static str, job_id: &str) -> Result<bool, StoreError> {
        if !self.table_exists(table).await? {
            return Ok(false);
        }
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE job_id = $1)");
        let found = sqlx::query_scalar::<_, bool>(&sql)
            .bind(job_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }

    /// Compute the asset flags from collected entities and persist them once.
    ///
    /// `COALESCE` keeps whatever a concurrent derivation stored first, and the
    /// returned row is what every later read sees.
    async fn derive_asset_types(&self, job_id: &str) -> Result<AssetTypes, StoreError> {
        let has_images = self.job_has_rows(IMAGE_TABLE, job_id).await?;
        let has_videos = self.job_has_rows(VIDEO_TABLE, job_id).await?;

        let row = sqlx::query_as::<_, (Option<bool>, Option<bool>)>(
            "UPDATE jobs
             SET has_images = COALESCE(has_images, $2),
                 has_videos = COALESCE(has_videos, $3)
             WHERE job_id = $1
             RETURNING has_images, has_videos",
        )
        .bind(job_id)
        .bind(has_images)
        .bind(has_videos)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;

        info!(job_id, has_images, has_videos, "derived job asset types");
        Ok(AssetTypes::new(row.0.unwrap_or(has_images), row.1.unwrap_or(has_videos)))
    }
}

#[async_trait]
impl PhaseStore for PgPhaseStore {
    async fn get_job_phase(&self, job_id: &str) -> Result<Option<Phase>, StoreError> {
        let phase = sqlx::query_scalar::<_, String>("SELECT phase FROM jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        phase
            .map(|p| {
                p.parse::<Phase>().map_err(|e| StoreError::Corrupt {
                    job_id: job_id.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    async fn update_job_phase(
        &self,
        job_id: &str,
        expected: Phase,
        new: Phase,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE jobs SET phase = $3, updated_at = NOW()
             WHERE job_id = $1 AND phase = $2",
        )
        .bind(job_id)
        .bind(expected.as_str())
        .bind(new.as_str())
        .execute(&self.pool)
        .await?;

        let swapped = result.rows_affected() == 1;
        debug!(job_id, %expected, %new, swapped, "phase compare-and-swap");
        Ok(swapped)
    }

    async fn get_job_asset_types(&self, job_id: &str) -> Result<AssetTypes, StoreError> {
        let row = sqlx::query_as::<_, (Option<bool>, Option<bool>)>(
            "SELECT has_images, has_videos FROM jobs WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;

        match row {
            (Some(has_images), Some(has_videos)) => Ok(AssetTypes::new(has_images, has_videos)),
            _ => self.derive_asset_types(job_id).await,
        }
    }

    async fn has_phase_event(&self, job_id: &str, event_type: &str) -> Result<bool, StoreError> {
        let found = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                 SELECT 1 FROM phase_events WHERE job_id = $1 AND event_type = $2
             )",
        )
        .bind(job_id)
        .bind(event_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }

    async fn get_job_industry(&self, job_id: &str) -> Result<String, StoreError> {
        sqlx::query_scalar::<_, String>("SELECT industry FROM jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))
    }

    async fn insert_phase_event(&self, event: &ProcessedEvent) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO phase_events (event_id, job_id, event_type, created_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&event.event_id)
        .bind(&event.job_id)
        .bind(&event.event_type)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, event))?;
        Ok(())
    }
}

/// Map ledger insert failures: 23505 is a duplicate event, 23503 an unknown job.
fn map_insert_error(e: sqlx::Error, event: &ProcessedEvent) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        match db_err.code().as_deref() {
            Some("23505") => return StoreError::UniqueViolation(event.event_id.clone()),
            Some("23503") => return StoreError::JobNotFound(event.job_id.clone()),
            _ => {}
        }
    }
    error!(event_id = %event.event_id, job_id = %event.job_id, "phase event insert failed: {}", e);
    StoreError::Database(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_pass_through() {
        let event = ProcessedEvent::new("e1", "J1", "image.keypoints.completed");
        let mapped = map_insert_error(sqlx::Error::RowNotFound, &event);
        assert!(matches!(mapped, StoreError::Database(sqlx::Error::RowNotFound)));
    }
}
