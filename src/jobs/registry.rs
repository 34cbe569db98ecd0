use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use super::model::{Job, JobId, JobState};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransitionError {
    #[error("job is no longer registered")]
    Missing,

    #[error("cannot move from {from} to {to}")]
    Rejected { from: JobState, to: JobState },

    #[error("update would leave the job inconsistent in state {0}")]
    Inconsistent(JobState),
}

/// In-memory table of live jobs.
///
/// Every mutation happens under the write lock on a copy of the record that
/// replaces the original only if it is valid, so readers never observe a
/// half-applied transition. The lock is never held across an await point.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `job` unless its id is taken; the job is handed back on conflict.
    pub fn insert(&self, job: Job) -> Result<(), Job> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        match jobs.entry(job.id) {
            Entry::Occupied(_) => Err(job),
            Entry::Vacant(slot) => {
                slot.insert(job);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(id).cloned()
    }

    pub fn remove(&self, id: &JobId) -> Option<Job> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.remove(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves a job to `next`, updating its message and applying `update` in one step.
    pub fn transition<F>(
        &self,
        id: &JobId,
        next: JobState,
        message: impl Into<String>,
        update: F,
    ) -> Result<Job, TransitionError>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let current = jobs.get_mut(id).ok_or(TransitionError::Missing)?;
        if !current.state.can_advance_to(next) {
            return Err(TransitionError::Rejected {
                from: current.state,
                to: next,
            });
        }

        let mut updated = current.clone();
        updated.state = next;
        updated.message = message.into();
        updated.updated_at = Utc::now();
        update(&mut updated);
        if !updated.is_consistent() {
            return Err(TransitionError::Inconsistent(next));
        }

        *current = updated.clone();
        Ok(updated)
    }

    /// Drops every job older than `ttl` at `now`; returns how many were removed.
    pub fn expire_stale(&self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let before = jobs.len();
        jobs.retain(|_, job| now.signed_duration_since(job.created_at) <= ttl);
        before - jobs.len()
    }
}
