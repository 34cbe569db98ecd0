pub mod stability;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

pub use stability::StabilityClient;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub width: u32,
    pub height: u32,
    pub samples: u32,
}

/// A raw image payload as returned by the generation API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub base64: String,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default, rename = "finishReason")]
    pub finish_reason: Option<String>,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<Artifact>, GenerationError>;
}
