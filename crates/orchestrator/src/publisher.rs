//! Outbound side effects of phase transitions.

use std::sync::Arc;

use matchflow_bus::events::{JobCompleted, MatchRequest};
use matchflow_bus::{topics, BusError, EventPublisher, Message};
use tracing::{error, info};

use crate::error::OrchestratorError;
use crate::store::PhaseStore;

pub struct SideEffectPublisher {
    store: Arc<dyn PhaseStore>,
    bus: Arc<dyn EventPublisher>,
}

impl SideEffectPublisher {
    pub fn new(store: Arc<dyn PhaseStore>, bus: Arc<dyn EventPublisher>) -> Self {
        Self { store, bus }
    }

    /// Ask the matcher to process the job. Failures are logged, never returned:
    /// the error log line is the only signal that the request was lost.
    pub async fn request_matching(&self, job_id: &str) {
        let industry = match self.store.get_job_industry(job_id).await {
            Ok(industry) => industry,
            Err(e) => {
                error!(job_id, error = %e, "match request not sent: industry lookup failed");
                return;
            }
        };

        let request = MatchRequest::for_job(job_id, industry);
        match self.send(topics::MATCH_REQUEST, job_id, &request).await {
            Ok(()) => info!(job_id, industry = %request.industry, "match request published"),
            Err(e) => error!(job_id, error = %e, "match request not sent: publish failed"),
        }
    }

    pub async fn announce_completion(&self, job_id: &str) -> Result<(), OrchestratorError> {
        let payload = JobCompleted {
            job_id: job_id.to_string(),
        };
        self.send(topics::JOB_COMPLETED, job_id, &payload)
            .await
            .map_err(|source| {
                error!(job_id, error = %source, "job completion notification failed");
                OrchestratorError::Publish {
                    topic: topics::JOB_COMPLETED,
                    job_id: job_id.to_string(),
                    source,
                }
            })?;
        info!(job_id, "job completion published");
        Ok(())
    }

    async fn send<T: serde::Serialize + Sync>(
        &self,
        topic: &str,
        job_id: &str,
        payload: &T,
    ) -> Result<(), BusError> {
        let message = Message::for_job(topic, job_id, payload)?;
        self.bus.publish(message).await
    }
}
