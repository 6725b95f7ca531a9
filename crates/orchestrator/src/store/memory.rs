//! In-process [`PhaseStore`] with the same uniqueness and compare-and-swap
//! semantics as the PostgreSQL store, plus fault injection for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use matchflow_core::{AssetTypes, Job, Phase};

use super::{PhaseStore, ProcessedEvent};
use crate::error::StoreError;

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetPhase,
    UpdatePhase,
    AssetTypes,
    HasEvent,
    Industry,
    InsertEvent,
}

#[derive(Debug)]
struct JobRow {
    industry: String,
    phase: Phase,
    asset_types: AssetTypes,
    updated_at: DateTime<Utc>,
    /// Every phase value this row has held, in write order.
    history: Vec<Phase>,
}

#[derive(Debug, Default)]
struct State {
    jobs: HashMap<String, JobRow>,
    events: HashMap<String, ProcessedEvent>,
    /// `(op, job)` pairs that fail; `None` matches every job.
    faults: Vec<(StoreOp, Option<String>)>,
    /// One-shot phase writes applied just before the next CAS on a job,
    /// simulating a concurrent handler winning the race.
    interleaved: HashMap<String, Phase>,
}

#[derive(Debug, Default)]
pub struct MemoryPhaseStore {
    state: Mutex<State>,
}

impl MemoryPhaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a job the way the collection stage would.
    pub fn insert_job(&self, job_id: &str, industry: &str, phase: Phase, asset_types: AssetTypes) {
        let mut state = self.lock();
        state.jobs.insert(
            job_id.to_string(),
            JobRow {
                industry: industry.to_string(),
                phase,
                asset_types,
                updated_at: Utc::now(),
                history: vec![phase],
            },
        );
    }

    pub fn job(&self, job_id: &str) -> Option<Job> {
        let state = self.lock();
        state.jobs.get(job_id).map(|row| Job {
            job_id: job_id.to_string(),
            industry: row.industry.clone(),
            phase: row.phase,
            asset_types: row.asset_types,
            updated_at: row.updated_at,
        })
    }

    pub fn phase_of(&self, job_id: &str) -> Option<Phase> {
        self.lock().jobs.get(job_id).map(|row| row.phase)
    }

    /// Phases the job has held, starting with its initial phase.
    pub fn phase_history(&self, job_id: &str) -> Vec<Phase> {
        self.lock()
            .jobs
            .get(job_id)
            .map(|row| row.history.clone())
            .unwrap_or_default()
    }

    pub fn processed_events(&self, job_id: &str) -> Vec<ProcessedEvent> {
        let mut events: Vec<ProcessedEvent> = self
            .lock()
            .events
            .values()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        events
    }

    /// Make `op` fail, for one job or (with `None`) for all jobs.
    pub fn fail(&self, op: StoreOp, job_id: Option<&str>) {
        self.lock().faults.push((op, job_id.map(str::to_string)));
    }

    /// Clear every injected fault.
    pub fn recover(&self) {
        self.lock().faults.clear();
    }

    /// Before the next CAS on `job_id`, overwrite its phase with `phase`.
    pub fn interleave_phase_write(&self, job_id: &str, phase: Phase) {
        self.lock().interleaved.insert(job_id.to_string(), phase);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_fault(state: &State, op: StoreOp, job_id: &str) -> Result<(), StoreError> {
        let hit = state
            .faults
            .iter()
            .any(|(o, j)| *o == op && j.as_deref().map_or(true, |j| j == job_id));
        if hit {
            Err(StoreError::Unavailable(format!("{op:?} failed for job {job_id}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PhaseStore for MemoryPhaseStore {
    async fn get_job_phase(&self, job_id: &str) -> Result<Option<Phase>, StoreError> {
        let state = self.lock();
        Self::check_fault(&state, StoreOp::GetPhase, job_id)?;
        Ok(state.jobs.get(job_id).map(|row| row.phase))
    }

    async fn update_job_phase(
        &self,
        job_id: &str,
        expected: Phase,
        new: Phase,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock();
        Self::check_fault(&state, StoreOp::UpdatePhase, job_id)?;

        let interleaved = state.interleaved.remove(job_id);
        let Some(row) = state.jobs.get_mut(job_id) else {
            return Ok(false);
        };
        if let Some(phase) = interleaved {
            row.phase = phase;
            row.history.push(phase);
        }
        if row.phase != expected {
            return Ok(false);
        }
        row.phase = new;
        row.updated_at = Utc::now();
        row.history.push(new);
        Ok(true)
    }

    async fn get_job_asset_types(&self, job_id: &str) -> Result<AssetTypes, StoreError> {
        let state = self.lock();
        Self::check_fault(&state, StoreOp::AssetTypes, job_id)?;
        state
            .jobs
            .get(job_id)
            .map(|row| row.asset_types)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))
    }

    async fn has_phase_event(&self, job_id: &str, event_type: &str) -> Result<bool, StoreError> {
        let state = self.lock();
        Self::check_fault(&state, StoreOp::HasEvent, job_id)?;
        Ok(state
            .events
            .values()
            .any(|e| e.job_id == job_id && e.event_type == event_type))
    }

    async fn get_job_industry(&self, job_id: &str) -> Result<String, StoreError> {
        let state = self.lock();
        Self::check_fault(&state, StoreOp::Industry, job_id)?;
        state
            .jobs
            .get(job_id)
            .map(|row| row.industry.clone())
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))
    }

    async fn insert_phase_event(&self, event: &ProcessedEvent) -> Result<(), StoreError> {
        let mut state = self.lock();
        Self::check_fault(&state, StoreOp::InsertEvent, &event.job_id)?;
        if !state.jobs.contains_key(&event.job_id) {
            return Err(StoreError::JobNotFound(event.job_id.clone()));
        }
        if state.events.contains_key(&event.event_id) {
            return Err(StoreError::UniqueViolation(event.event_id.clone()));
        }
        state.events.insert(event.event_id.clone(), event.clone());
        Ok(())
    }
}
