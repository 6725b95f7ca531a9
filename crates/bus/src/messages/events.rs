//! Event payloads.
//!
//! These are the inner payloads carried by [`Message`](crate::Message) envelopes.

use serde::{Deserialize, Serialize};

/// Payload shared by every worker completion event.
///
/// The event type itself travels as the envelope topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    /// Unique per emission; redeliveries of the same emission keep it.
    pub event_id: String,
    pub job_id: String,
    /// Set by video workers when some segments could not be processed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_partial_completion: Option<bool>,
}

impl CompletionEvent {
    pub fn new(event_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            job_id: job_id.into(),
            has_partial_completion: None,
        }
    }
}

/// Request for the matcher to process a job.
///
/// Product and video sets are 1:1 with the job, so both set ids equal `job_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub job_id: String,
    pub industry: String,
    pub product_set_id: String,
    pub video_set_id: String,
}

impl MatchRequest {
    pub fn for_job(job_id: impl Into<String>, industry: impl Into<String>) -> Self {
        let job_id = job_id.into();
        Self {
            product_set_id: job_id.clone(),
            video_set_id: job_id.clone(),
            industry: industry.into(),
            job_id,
        }
    }
}

/// Notification that a job reached `completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCompleted {
    pub job_id: String,
}

/// Worker health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerStatus {
    Healthy,
    Unhealthy,
}

/// Periodic heartbeat reporting worker liveness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub worker_id: String,
    pub status: WorkerStatus,
}
