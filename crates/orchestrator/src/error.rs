use matchflow_bus::BusError;
use matchflow_core::CoreError;
use thiserror::Error;

/// Errors from the job/ledger store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// The event id is already in the ledger (SQLSTATE 23505).
    #[error("event already recorded: {0}")]
    UniqueViolation(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("corrupt row for job {job_id}: {reason}")]
    Corrupt { job_id: String, reason: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while computing or applying a phase transition.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Phase(#[from] CoreError),

    #[error("failed to publish {topic} for job {job_id}: {source}")]
    Publish {
        topic: &'static str,
        job_id: String,
        #[source]
        source: BusError,
    },
}
