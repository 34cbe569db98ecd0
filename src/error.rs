use thiserror::Error;
use uuid::Uuid;

/// Errors returned synchronously by the orchestrator's public operations.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job queue is full")]
    QueueFull,

    #[error("job queue is closed")]
    Closed,
}

/// Failures of the prompt-improvement API. Never fatal for a job.
#[derive(Error, Debug)]
pub enum ImproveError {
    #[error("credential acquisition failed: {0}")]
    Auth(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("API returned no usable text")]
    EmptyResponse,

    #[error("missing credentials: {0}")]
    MissingCredentials(&'static str),
}

/// Failures of the image-generation API. Fatal for a job.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generation failed (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("no images were returned by the API")]
    NoArtifacts,

    #[error("missing credentials: {0}")]
    MissingCredentials(&'static str),
}

/// Failures while turning artifacts into client references. Fatal for a job.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("artifact {index} is not valid base64: {source}")]
    Decode {
        index: usize,
        #[source]
        source: base64::DecodeError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("nothing to materialize")]
    Empty,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}
