pub mod config;
pub mod error;
pub mod generator;
pub mod improver;
pub mod jobs;
pub mod storage;
pub mod styles;
pub mod telemetry;
pub mod web;

pub use config::{DeliveryMode, Settings};
pub use error::{GenerationError, ImproveError, OrchestratorError, PersistenceError};
pub use jobs::{Job, JobId, JobRequest, JobState, Orchestrator};
