//! Asynchronous job orchestration.
//!
//! A job moves `starting → improving_prompt → generating → saving →
//! completed`, or to `error` from any live state. Jobs are executed by a
//! single background worker in submission order; front ends only submit and
//! poll through [`Orchestrator`].

mod model;
mod orchestrator;
mod registry;
mod worker;

use std::sync::Arc;

pub use model::{Job, JobId, JobRequest, JobState};
pub use orchestrator::{Orchestrator, OrchestratorOptions};
pub use registry::{JobRegistry, TransitionError};

use crate::config::Settings;
use crate::error::ImproveError;
use crate::generator::{ImageGenerator, StabilityClient};
use crate::improver::{FallbackPolicy, GigaChatClient, PromptImprover};
use crate::storage::Delivery;

/// The collaborators a job is driven through.
pub struct Pipeline {
    pub improver: Arc<dyn PromptImprover>,
    pub generator: Arc<dyn ImageGenerator>,
    pub delivery: Delivery,
    pub fallback: FallbackPolicy,
}

impl Pipeline {
    pub fn new(
        improver: Arc<dyn PromptImprover>,
        generator: Arc<dyn ImageGenerator>,
        delivery: Delivery,
    ) -> Self {
        Self {
            improver,
            generator,
            delivery,
            fallback: FallbackPolicy::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    /// GigaChat improver and Stability generator configured from `settings`.
    pub fn from_settings(settings: &Settings, delivery: Delivery) -> Result<Self, ImproveError> {
        let improver = GigaChatClient::new(settings.gigachat.clone())?;
        let generator = StabilityClient::new(settings.stability.clone());
        Ok(Self::new(Arc::new(improver), Arc::new(generator), delivery)
            .with_fallback(settings.improve_fallback))
    }
}
