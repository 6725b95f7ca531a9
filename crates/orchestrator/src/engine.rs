//! Per-event pipeline: validate, dedup, transition.
//!
//! Each inbound event is handled independently and every failure is contained
//! in the returned [`EventOutcome`]; nothing here propagates an error to the
//! consumer loop.

use std::sync::Arc;

use matchflow_bus::events::CompletionEvent;
use matchflow_bus::{EventPublisher, Message};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{OrchestratorError, StoreError};
use crate::ledger::{DedupLedger, LedgerOutcome};
use crate::publisher::SideEffectPublisher;
use crate::schema::{SchemaError, SchemaRegistry};
use crate::store::PhaseStore;
use crate::transition::{TransitionManager, TransitionReport};

/// How one event was handled.
#[derive(Debug)]
pub enum EventOutcome {
    /// Failed validation; nothing was recorded, so a redelivery is judged again.
    Rejected(SchemaError),
    Duplicate,
    /// The ledger write failed; no side effects ran.
    StorageFailed(StoreError),
    UnknownJob,
    Applied(TransitionReport),
    /// Recorded, but computing or applying the transition failed.
    Failed(OrchestratorError),
}

pub struct Engine {
    registry: SchemaRegistry,
    store: Arc<dyn PhaseStore>,
    ledger: DedupLedger,
    transitions: TransitionManager,
}

impl Engine {
    pub fn new(
        registry: SchemaRegistry,
        store: Arc<dyn PhaseStore>,
        bus: Arc<dyn EventPublisher>,
        dedup_cache_capacity: usize,
    ) -> Self {
        let publisher = SideEffectPublisher::new(store.clone(), bus);
        Self {
            registry,
            ledger: DedupLedger::new(store.clone(), dedup_cache_capacity),
            transitions: TransitionManager::new(store.clone(), publisher),
            store,
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    /// Handle a bus message; the envelope topic is the event type.
    pub async fn handle_message(&self, message: &Message) -> EventOutcome {
        match message.decode_value() {
            Ok(payload) => self.handle_event(&message.topic, &payload).await,
            Err(e) => {
                let err = SchemaError::SchemaViolation {
                    event_type: message.topic.clone(),
                    field: "$".to_string(),
                    reason: format!("undecodable payload: {e}"),
                };
                warn!(event_type = %message.topic, error = %err, "dropping event");
                EventOutcome::Rejected(err)
            }
        }
    }

    pub async fn handle_event(&self, event_type: &str, payload: &Value) -> EventOutcome {
        if let Err(e) = self.registry.validate(event_type, payload) {
            warn!(event_type, error = %e, "dropping invalid event");
            return EventOutcome::Rejected(e);
        }
        let event: CompletionEvent = match serde_json::from_value(payload.clone()) {
            Ok(event) => event,
            Err(e) => {
                let err = SchemaError::SchemaViolation {
                    event_type: event_type.to_string(),
                    field: "$".to_string(),
                    reason: e.to_string(),
                };
                warn!(event_type, error = %err, "dropping invalid event");
                return EventOutcome::Rejected(err);
            }
        };
        let job_id = event.job_id.as_str();
        let event_id = event.event_id.as_str();

        if event.has_partial_completion == Some(true) {
            info!(job_id, event_id, event_type, "worker reported partial completion");
        }

        match self.ledger.record_if_new(event_id, job_id, event_type).await {
            LedgerOutcome::Recorded => {}
            LedgerOutcome::AlreadyProcessed => return EventOutcome::Duplicate,
            LedgerOutcome::StorageFailed(StoreError::JobNotFound(_)) => {
                warn!(job_id, event_id, event_type, "event for unknown job ignored");
                return EventOutcome::UnknownJob;
            }
            LedgerOutcome::StorageFailed(e) => return EventOutcome::StorageFailed(e),
        }

        let phase = match self.store.get_job_phase(job_id).await {
            Ok(Some(phase)) => phase,
            Ok(None) => {
                warn!(job_id, event_id, event_type, "event for unknown job ignored");
                return EventOutcome::UnknownJob;
            }
            Err(e) => {
                error!(job_id, event_id, event_type, error = %e, "failed to read job phase");
                return EventOutcome::Failed(e.into());
            }
        };

        match self.transitions.apply(job_id, event_type, phase).await {
            Ok(report) => {
                debug!(
                    job_id,
                    event_id,
                    event_type,
                    start = %report.start,
                    end = %report.end,
                    effects = report.effects.len(),
                    conflict = report.conflict,
                    "event applied"
                );
                EventOutcome::Applied(report)
            }
            Err(e) => {
                error!(job_id, event_id, event_type, %phase, error = %e, "transition failed");
                EventOutcome::Failed(e)
            }
        }
    }
}
