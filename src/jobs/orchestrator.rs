use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_channel::{Sender, TrySendError};
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use super::model::{Job, JobId, JobRequest};
use super::registry::JobRegistry;
use super::{Pipeline, worker};
use crate::config::Settings;
use crate::error::OrchestratorError;
use crate::storage::Delivery;
use crate::styles::{self, StyleSummary};

const MAX_SAMPLES: u32 = 10;

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorOptions {
    pub task_ttl: Duration,
    pub queue_capacity: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            task_ttl: Duration::from_secs(3600),
            queue_capacity: 256,
        }
    }
}

impl From<&Settings> for OrchestratorOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            task_ttl: settings.task_ttl,
            queue_capacity: settings.queue_capacity,
        }
    }
}

struct Inner {
    registry: Arc<JobRegistry>,
    queue: Sender<JobId>,
    delivery: Delivery,
    options: OrchestratorOptions,
    cancel_token: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the job registry and the single background worker that drives jobs.
///
/// Cloning is cheap; all clones share the same registry and queue.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Spawns the worker on the current tokio runtime.
    pub fn start(pipeline: Pipeline, options: OrchestratorOptions) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let (queue, recv_from_queue) = async_channel::bounded(options.queue_capacity.max(1));
        let cancel_token = CancellationToken::new();
        let delivery = pipeline.delivery.clone();

        let handle = tokio::spawn(
            worker::run(
                cancel_token.clone(),
                recv_from_queue,
                registry.clone(),
                Arc::new(pipeline),
            )
            .instrument(info_span!("worker")),
        );

        Self {
            inner: Arc::new(Inner {
                registry,
                queue,
                delivery,
                options,
                cancel_token,
                worker: Mutex::new(Some(handle)),
            }),
        }
    }

    pub fn delivery(&self) -> &Delivery {
        &self.inner.delivery
    }

    /// Registers a job and queues it. Never waits on the network.
    pub fn submit(&self, request: JobRequest) -> Result<JobId, OrchestratorError> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(OrchestratorError::InvalidInput(
                "prompt must not be empty".to_string(),
            ));
        }
        if request.width == 0 || request.height == 0 {
            return Err(OrchestratorError::InvalidInput(
                "width and height must be positive".to_string(),
            ));
        }
        if !(1..=MAX_SAMPLES).contains(&request.samples) {
            return Err(OrchestratorError::InvalidInput(format!(
                "samples must be between 1 and {MAX_SAMPLES}"
            )));
        }

        let now = Utc::now();
        let expired = self.expire_stale(now, self.inner.options.task_ttl);
        if expired > 0 {
            debug!(expired, "expired stale jobs");
        }

        let mut job = Job::new(Uuid::new_v4(), prompt, &request, now);
        let job_id = loop {
            let id = job.id;
            match self.inner.registry.insert(job) {
                Ok(()) => break id,
                Err(taken) => {
                    job = taken;
                    job.id = Uuid::new_v4();
                }
            }
        };

        match self.inner.queue.try_send(job_id) {
            Ok(()) => {
                info!(job_id = %job_id, style = %request.style, improve = request.improve, "job submitted");
                Ok(job_id)
            }
            Err(TrySendError::Full(_)) => {
                self.inner.registry.remove(&job_id);
                warn!(job_id = %job_id, "job queue is full");
                Err(OrchestratorError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                self.inner.registry.remove(&job_id);
                Err(OrchestratorError::Closed)
            }
        }
    }

    pub fn get_status(&self, job_id: &JobId) -> Result<Job, OrchestratorError> {
        self.inner
            .registry
            .get(job_id)
            .ok_or(OrchestratorError::NotFound(*job_id))
    }

    pub fn list_styles(&self) -> Vec<StyleSummary> {
        styles::summaries()
    }

    pub fn expire_stale(&self, now: DateTime<Utc>, ttl: Duration) -> usize {
        self.inner.registry.expire_stale(now, ttl)
    }

    pub fn job_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Polls a job until it reaches a terminal state, calling `on_change`
    /// for the first snapshot and then whenever the state changes.
    pub async fn wait_for<F>(
        &self,
        job_id: &JobId,
        poll_interval: Duration,
        mut on_change: F,
    ) -> Result<Job, OrchestratorError>
    where
        F: FnMut(&Job),
    {
        let mut last_state = None;
        loop {
            let job = self.get_status(job_id)?;
            if last_state != Some(job.state) {
                on_change(&job);
                last_state = Some(job.state);
            }
            if job.state.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Periodically drops expired jobs until shutdown.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let orchestrator = self.clone();
        let cancel_token = self.inner.cancel_token.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = orchestrator.expire_stale(Utc::now(), orchestrator.inner.options.task_ttl);
                        if removed > 0 {
                            info!(removed, "swept expired jobs");
                        }
                    }
                }
            }
        })
    }

    /// Stops the worker once its current job finishes; queued jobs are dropped.
    pub async fn shutdown(&self) {
        self.inner.cancel_token.cancel();
        self.inner.queue.close();
        let handle = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "worker task ended abnormally");
            }
        }
    }
}
