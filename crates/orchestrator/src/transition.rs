//! Phase transition manager.
//!
//! Decides, for a recorded event, whether the job's phase advances and which
//! side effects follow. Every write is a compare-and-swap against the phase
//! the decision was made on; a lost race means another handler already did
//! the work, so nothing is fired.

use std::sync::Arc;

use matchflow_bus::topics;
use matchflow_core::{AssetTypes, Phase};
use tracing::{debug, info, warn};

use crate::error::OrchestratorError;
use crate::publisher::SideEffectPublisher;
use crate::store::PhaseStore;

/// Upper bound on advances per handling; the pipeline only has four edges.
const MAX_CHAIN: usize = 5;

/// Completion events a job needs before leaving `feature_extraction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredEventSet {
    events: Vec<&'static str>,
}

impl RequiredEventSet {
    pub fn for_assets(assets: AssetTypes) -> Self {
        let mut events = Vec::with_capacity(4);
        if assets.has_images {
            events.push(topics::IMAGE_EMBEDDINGS_COMPLETED);
            events.push(topics::IMAGE_KEYPOINTS_COMPLETED);
        }
        if assets.has_videos {
            events.push(topics::VIDEO_EMBEDDINGS_COMPLETED);
            events.push(topics::VIDEO_KEYPOINTS_COMPLETED);
        }
        Self { events }
    }

    pub fn events(&self) -> &[&'static str] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// An outbound side effect fired by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    RequestMatching,
    AnnounceCompletion,
}

/// What one handling did to a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionReport {
    pub job_id: String,
    pub event_type: String,
    pub start: Phase,
    pub end: Phase,
    pub effects: Vec<Effect>,
    /// A phase write lost its compare-and-swap.
    pub conflict: bool,
}

impl TransitionReport {
    fn new(job_id: &str, event_type: &str, start: Phase) -> Self {
        Self {
            job_id: job_id.to_string(),
            event_type: event_type.to_string(),
            start,
            end: start,
            effects: Vec::new(),
            conflict: false,
        }
    }

    pub fn advanced(&self) -> bool {
        self.end != self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Advance { to: Phase, effect: Option<Effect> },
    Refire(Effect),
    Stay,
}

pub struct TransitionManager {
    store: Arc<dyn PhaseStore>,
    publisher: SideEffectPublisher,
}

impl TransitionManager {
    pub fn new(store: Arc<dyn PhaseStore>, publisher: SideEffectPublisher) -> Self {
        Self { store, publisher }
    }

    /// Apply an already-recorded event to a job currently in `start`.
    pub async fn apply(
        &self,
        job_id: &str,
        event_type: &str,
        start: Phase,
    ) -> Result<TransitionReport, OrchestratorError> {
        let mut report = TransitionReport::new(job_id, event_type, start);
        let mut current = start;

        for round in 0..MAX_CHAIN {
            match self.decide(job_id, current, event_type, round == 0).await? {
                Step::Stay => break,
                Step::Refire(effect) => {
                    debug!(job_id, event_type, phase = %current, ?effect, "re-firing side effect");
                    self.fire(job_id, effect).await?;
                    report.effects.push(effect);
                    break;
                }
                Step::Advance { to, effect } => {
                    current.ensure_forward(to)?;
                    if !self.store.update_job_phase(job_id, current, to).await? {
                        info!(job_id, event_type, expected = %current, to = %to, "phase already moved by another handler");
                        report.conflict = true;
                        break;
                    }
                    info!(job_id, event_type, from = %current, to = %to, "phase advanced");
                    current = to;
                    report.end = to;

                    if let Some(effect) = effect {
                        self.fire(job_id, effect).await?;
                        report.effects.push(effect);
                    }
                    if current.is_terminal() {
                        break;
                    }
                }
            }
        }
        Ok(report)
    }

    async fn decide(
        &self,
        job_id: &str,
        phase: Phase,
        event_type: &str,
        first_round: bool,
    ) -> Result<Step, OrchestratorError> {
        // Evidence can finish before this service saw matching finish.
        if event_type == topics::EVIDENCES_GENERATION_COMPLETED
            && !matches!(phase, Phase::Evidence | Phase::Completed)
            && self
                .event_seen(job_id, topics::MATCHINGS_PROCESS_COMPLETED)
                .await
        {
            warn!(job_id, %phase, "evidence completed out of order, forcing completion");
            return Ok(Step::Advance {
                to: Phase::Completed,
                effect: Some(Effect::AnnounceCompletion),
            });
        }

        let step = match phase {
            Phase::Collection => Step::Advance {
                to: Phase::FeatureExtraction,
                effect: None,
            },
            Phase::FeatureExtraction => {
                let assets = self.store.get_job_asset_types(job_id).await?;
                if self.requirements_met(job_id, assets).await {
                    Step::Advance {
                        to: Phase::Matching,
                        effect: Some(Effect::RequestMatching),
                    }
                } else {
                    Step::Stay
                }
            }
            Phase::Matching if event_type == topics::MATCHINGS_PROCESS_COMPLETED => Step::Advance {
                to: Phase::Evidence,
                effect: None,
            },
            Phase::Matching if first_round => Step::Refire(Effect::RequestMatching),
            Phase::Matching => Step::Stay,
            // Evidence may have been recorded while the job was still upstream.
            Phase::Evidence
                if event_type == topics::EVIDENCES_GENERATION_COMPLETED
                    || self
                        .event_seen(job_id, topics::EVIDENCES_GENERATION_COMPLETED)
                        .await =>
            {
                Step::Advance {
                    to: Phase::Completed,
                    effect: Some(Effect::AnnounceCompletion),
                }
            }
            Phase::Evidence | Phase::Completed => Step::Stay,
        };
        Ok(step)
    }

    async fn requirements_met(&self, job_id: &str, assets: AssetTypes) -> bool {
        let required = RequiredEventSet::for_assets(assets);
        if required.is_empty() {
            debug!(job_id, "job has no assets, skipping feature extraction");
            return true;
        }
        for event_type in required.events() {
            if !self.event_seen(job_id, event_type).await {
                debug!(job_id, missing = event_type, "feature extraction incomplete");
                return false;
            }
        }
        true
    }

    /// Ledger lookup that treats a failed read as "not seen".
    async fn event_seen(&self, job_id: &str, event_type: &str) -> bool {
        match self.store.has_phase_event(job_id, event_type).await {
            Ok(seen) => seen,
            Err(e) => {
                warn!(job_id, event_type, error = %e, "phase event lookup failed");
                false
            }
        }
    }

    async fn fire(&self, job_id: &str, effect: Effect) -> Result<(), OrchestratorError> {
        match effect {
            Effect::RequestMatching => {
                self.publisher.request_matching(job_id).await;
                Ok(())
            }
            Effect::AnnounceCompletion => self.publisher.announce_completion(job_id).await,
        }
    }
}
