//! Job phase store: the collaborator contract the engine runs against.
//!
//! [`PgPhaseStore`] is the production implementation over the `jobs` and
//! `phase_events` tables; [`MemoryPhaseStore`] implements the same contract
//! in-process for tests and local runs.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use matchflow_core::{AssetTypes, Phase};

use crate::error::StoreError;

pub use memory::{MemoryPhaseStore, StoreOp};
pub use postgres::PgPhaseStore;

/// A row in `phase_events`: proof that an event was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEvent {
    pub event_id: String,
    pub job_id: String,
    pub event_type: String,
    pub created_at: DateTime<Utc>,
}

impl ProcessedEvent {
    pub fn new(
        event_id: impl Into<String>,
        job_id: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            job_id: job_id.into(),
            event_type: event_type.into(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait PhaseStore: Send + Sync {
    /// Current phase, or `None` when the job is unknown.
    async fn get_job_phase(&self, job_id: &str) -> Result<Option<Phase>, StoreError>;

    /// Compare-and-swap the phase. Returns `false` when the stored phase is no
    /// longer `expected` (another handler advanced it first).
    async fn update_job_phase(
        &self,
        job_id: &str,
        expected: Phase,
        new: Phase,
    ) -> Result<bool, StoreError>;

    async fn get_job_asset_types(&self, job_id: &str) -> Result<AssetTypes, StoreError>;

    async fn has_phase_event(&self, job_id: &str, event_type: &str) -> Result<bool, StoreError>;

    async fn get_job_industry(&self, job_id: &str) -> Result<String, StoreError>;

    /// Append to the ledger. A duplicate `event_id` fails with
    /// [`StoreError::UniqueViolation`].
    async fn insert_phase_event(&self, event: &ProcessedEvent) -> Result<(), StoreError>;
}
